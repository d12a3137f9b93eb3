//! The composition engine.
//!
//! An owned subsystem object (injected where needed, never a process-wide
//! static) holding the channel registry, the animation-update registrations
//! and the single coarse lock that serializes all resource-channel
//! bookkeeping. The lock is scoped to a fan-out: acquired, the per-channel
//! work performed, released. It is never held across a callback into
//! application code, and hit-testing never takes it.

use log::debug;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::composition::channel::{Channel, Command};
use crate::composition::handle::ChannelId;
use crate::composition::sync;
use crate::scene::NodeRef;
use crate::scene::graph::SceneGraph;

/// Lock-protected engine state: one [`Channel`] per open connection plus
/// the set of (node, channel) pairs registered for animation-driven
/// re-serialization.
#[derive(Debug, Default)]
pub struct EngineState {
    channels: FxHashMap<ChannelId, Channel>,
    animated: FxHashSet<(NodeRef, ChannelId)>,
    next_channel_id: u32,
}

impl EngineState {
    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(&id)
    }

    pub(crate) fn register_animated(&mut self, node: NodeRef, channel: ChannelId) {
        self.animated.insert((node, channel));
    }

    pub(crate) fn unregister_animated(&mut self, node: NodeRef, channel: ChannelId) {
        self.animated.remove(&(node, channel));
    }
}

/// The composition subsystem: channels to the compositor and the lock
/// guarding them.
#[derive(Debug, Default)]
pub struct CompositionEngine {
    state: Mutex<EngineState>,
}

impl CompositionEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a fresh command channel and returns its identity.
    pub fn open_channel(&self) -> ChannelId {
        let mut state = self.state.lock();
        state.next_channel_id += 1;
        let id = ChannelId(state.next_channel_id);
        state.channels.insert(id, Channel::new(id));
        debug!("opened composition channel {id:?}");
        id
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }

    /// Runs `f` against one channel under the lock. Returns `None` for an
    /// unknown channel. Used by consumers draining commands and by tests
    /// inspecting the stream.
    pub fn with_channel<R>(&self, id: ChannelId, f: impl FnOnce(&mut Channel) -> R) -> Option<R> {
        let mut state = self.state.lock();
        state.channels.get_mut(&id).map(f)
    }

    /// Drains the commands queued on `id` since the last call.
    #[must_use]
    pub fn take_commands(&self, id: ChannelId) -> Vec<Command> {
        self.with_channel(id, Channel::take_commands)
            .unwrap_or_default()
    }

    /// Whether `node` is registered for animation-driven updates on
    /// `channel`.
    #[must_use]
    pub fn is_registered_for_animation(&self, node: NodeRef, channel: ChannelId) -> bool {
        self.state.lock().animated.contains(&(node, channel))
    }

    /// Re-serializes every node registered for animation updates, the
    /// periodic push that keeps animated records fresh on their channels.
    /// The clock/timeline driving *when* this runs lives outside the graph.
    pub fn flush_animated(&self, graph: &SceneGraph) {
        let mut state = self.state.lock();
        let registered: Vec<(NodeRef, ChannelId)> = state.animated.iter().copied().collect();
        for (node, channel) in registered {
            sync::update_resource(graph, &mut state, node, channel, false);
        }
    }
}
