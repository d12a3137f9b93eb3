//! Compositor mirroring.
//!
//! The change-tracking / resource-marshalling layer that pushes the scene
//! graph's state to an out-of-process (or cross-thread) compositor over
//! command channels: opaque per-channel handles with reference counting,
//! fixed-layout command records, and the engine object owning the channel
//! registry and its lock.

pub mod channel;
pub mod command;
pub mod engine;
pub mod handle;
pub(crate) mod sync;

pub use channel::{Channel, Command};
pub use command::CommandKind;
pub use engine::CompositionEngine;
pub use handle::{ChannelId, ChannelRef, ChannelTable, ResourceHandle};
