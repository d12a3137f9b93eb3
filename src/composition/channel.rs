use crate::composition::command::CommandKind;
use crate::composition::handle::{ChannelId, ResourceHandle};

/// One fully serialized command record as transmitted to the compositor:
/// a discriminant, a destination handle, and the fixed-layout payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub target: ResourceHandle,
    pub payload: Vec<u8>,
}

/// A command channel to the compositor.
///
/// The channel owns handle allocation for its connection and queues encoded
/// commands for the (external) consumer. Fixed-size records go through
/// [`Channel::send_command`]; variable-length records (child handle arrays,
/// mesh data) are built with `begin_command` / `append_command_data` /
/// `end_command`.
#[derive(Debug)]
pub struct Channel {
    id: ChannelId,
    next_handle: u32,
    open: Option<Command>,
    queued: Vec<Command>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId) -> Self {
        Self {
            id,
            // Handle 0 is reserved as the null sentinel.
            next_handle: 1,
            open: None,
            queued: Vec::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Allocates a fresh handle on this connection.
    pub(crate) fn allocate_handle(&mut self) -> ResourceHandle {
        let handle = ResourceHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Starts a variable-length command record.
    ///
    /// An already-open record is dropped; the serialization layer never
    /// nests records.
    pub fn begin_command(&mut self, kind: CommandKind, target: ResourceHandle) {
        debug_assert!(self.open.is_none(), "nested begin_command");
        self.open = Some(Command {
            kind,
            target,
            payload: Vec::new(),
        });
    }

    /// Appends raw payload bytes to the open record.
    pub fn append_command_data(&mut self, bytes: &[u8]) {
        if let Some(cmd) = &mut self.open {
            cmd.payload.extend_from_slice(bytes);
        }
    }

    /// Completes and queues the open record.
    pub fn end_command(&mut self) {
        if let Some(cmd) = self.open.take() {
            self.queued.push(cmd);
        }
    }

    /// Queues a fixed-size record in one shot.
    pub fn send_command(&mut self, kind: CommandKind, target: ResourceHandle, payload: &[u8]) {
        self.queued.push(Command {
            kind,
            target,
            payload: payload.to_vec(),
        });
    }

    /// The commands queued since the last [`Channel::take_commands`].
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.queued
    }

    /// Drains the queued commands, handing them to the consumer.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.queued)
    }
}
