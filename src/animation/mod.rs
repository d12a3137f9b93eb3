//! Animation resources and animatable property slots.
//!
//! The clock/timeline machinery lives outside this crate; what the scene
//! graph needs is the *resource* side: an [`Animator`] is a node realized on
//! channels like any other, and binding one to an [`AnimatedProperty`]
//! switches that property's serialized form from a literal value to the
//! animator's handle. Nodes carrying at least one bound animator are
//! registered with the composition engine for ongoing re-serialization
//! (see `CompositionEngine::flush_animated`).

use crate::scene::AnimatorKey;
use crate::scene::node::NodeCore;

/// Value kind an animator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnimatorTarget {
    Double = 0,
    Vector3 = 1,
    Quaternion = 2,
    Matrix = 3,
}

/// A time-varying value source, mirrored on the compositor as its own
/// resource. The compositor samples it; this side only tracks identity and
/// target kind.
#[derive(Debug, Clone)]
pub struct Animator {
    pub target: AnimatorTarget,
}

impl Animator {
    #[must_use]
    pub fn new(target: AnimatorTarget) -> Self {
        Self { target }
    }
}

/// Arena record for an animator node.
#[derive(Debug, Clone)]
pub struct AnimatorNode {
    pub core: NodeCore,
    pub data: Animator,
}

/// A property slot whose effective value may be overridden by a bound
/// animator. The literal value and the animator handle are mutually
/// exclusive per serialized record.
#[derive(Debug, Clone)]
pub struct AnimatedProperty<T> {
    value: T,
    animator: Option<AnimatorKey>,
}

impl<T> AnimatedProperty<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            value,
            animator: None,
        }
    }

    /// The literal (base) value of the slot.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub fn animator(&self) -> Option<AnimatorKey> {
        self.animator
    }

    #[must_use]
    pub fn is_animated(&self) -> bool {
        self.animator.is_some()
    }

    pub(crate) fn set_value(&mut self, value: T) {
        self.value = value;
    }

    pub(crate) fn set_animator(&mut self, animator: Option<AnimatorKey>) {
        self.animator = animator;
    }
}

impl<T: Default> Default for AnimatedProperty<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
