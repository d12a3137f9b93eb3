use bitflags::bitflags;

use crate::composition::handle::ChannelTable;

bitflags! {
    /// Per-node state flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        /// The node (and its subtree) has been made immutable.
        const FROZEN = 1 << 0;
    }
}

/// Version tracker - used to mark node changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeTracker {
    version: u64,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self { version: 0 }
    }

    /// Marks as modified, increments version by 1.
    pub fn changed(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Gets the current version number.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// Common header shared by every node kind.
///
/// Holds the data the resource protocol needs regardless of the variant:
/// the per-channel realization table, status flags and the mutation version.
#[derive(Debug, Clone, Default)]
pub struct NodeCore {
    pub(crate) flags: NodeFlags,
    pub(crate) channels: ChannelTable,
    pub(crate) version: ChangeTracker,
}

impl NodeCore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.flags.contains(NodeFlags::FROZEN)
    }

    /// The channel realization table (refcounts and handles).
    #[must_use]
    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.version()
    }
}
