//! The visual layer.
//!
//! A [`Visual3D`] owns (at most) one model tree and composes with sibling
//! and child visuals under visual-level transforms. During hit-testing the
//! visual transforms accumulate on their own stack, separate from the
//! model-level stack. A visual may host interactive 2-D content; such hits
//! are routed through the caller's surface resolver before the ordinary
//! result callback.

use crate::scene::node::NodeCore;
use crate::scene::{ModelKey, TransformKey, VisualKey};

/// A node of the visual tree.
#[derive(Debug, Clone, Default)]
pub struct Visual3D {
    pub transform: Option<TransformKey>,
    pub content: Option<ModelKey>,
    pub children: Vec<VisualKey>,
    /// Hits on this visual's content are offered to the secondary 2-D
    /// hit-test pass during reporting.
    pub hosts_2d_content: bool,
}

impl Visual3D {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_content(content: ModelKey) -> Self {
        Self {
            content: Some(content),
            ..Self::default()
        }
    }
}

/// Arena record for a visual node.
#[derive(Debug, Clone)]
pub struct VisualNode {
    pub core: NodeCore,
    pub data: Visual3D,
}
