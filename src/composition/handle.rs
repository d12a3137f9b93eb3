use smallvec::SmallVec;

/// Identity of one compositor connection. Nodes may be realized on several
/// channels at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) u32);

impl ChannelId {
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Opaque per-channel resource handle. Handle 0 is the null sentinel used in
/// command records for absent children and identity transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub(crate) u32);

impl ResourceHandle {
    /// The null handle written for absent child references.
    pub const NULL: Self = Self(0);

    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// One realized (channel, handle, refcount) entry of a node.
#[derive(Debug, Clone, Copy)]
pub struct ChannelRef {
    pub channel: ChannelId,
    pub handle: ResourceHandle,
    pub refcount: u32,
}

/// Per-node channel table.
///
/// Almost every node lives on zero or one channel, so the entries are kept
/// in a small inline array. Invariant: an entry exists iff `refcount > 0`.
#[derive(Debug, Clone, Default)]
pub struct ChannelTable {
    entries: SmallVec<[ChannelRef; 2]>,
}

impl ChannelTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_realized_on(&self, channel: ChannelId) -> bool {
        self.entries.iter().any(|e| e.channel == channel)
    }

    #[must_use]
    pub fn handle_on(&self, channel: ChannelId) -> Option<ResourceHandle> {
        self.entries
            .iter()
            .find(|e| e.channel == channel)
            .map(|e| e.handle)
    }

    #[must_use]
    pub fn refcount_on(&self, channel: ChannelId) -> u32 {
        self.entries
            .iter()
            .find(|e| e.channel == channel)
            .map_or(0, |e| e.refcount)
    }

    /// Channels this node is currently realized on, collected so callers can
    /// fan out without borrowing the table.
    #[must_use]
    pub fn channels(&self) -> SmallVec<[ChannelId; 2]> {
        self.entries.iter().map(|e| e.channel).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Increments the reference on `channel`, inserting a fresh entry with
    /// `handle` when this is the first reference. Returns the live handle and
    /// whether the entry was freshly created.
    pub(crate) fn add_ref(&mut self, channel: ChannelId, handle: ResourceHandle) -> (ResourceHandle, bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.channel == channel) {
            entry.refcount += 1;
            (entry.handle, false)
        } else {
            self.entries.push(ChannelRef {
                channel,
                handle,
                refcount: 1,
            });
            (handle, true)
        }
    }

    /// Decrements the reference on `channel`. Returns the handle and whether
    /// this was the last reference (the entry is removed at zero). `None`
    /// when the node was not realized on `channel` at all.
    pub(crate) fn release(&mut self, channel: ChannelId) -> Option<(ResourceHandle, bool)> {
        let idx = self.entries.iter().position(|e| e.channel == channel)?;
        let entry = &mut self.entries[idx];
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let handle = entry.handle;
            self.entries.swap_remove(idx);
            Some((handle, true))
        } else {
            Some((self.entries[idx].handle, false))
        }
    }
}
