//! Inter-task messaging.
//!
//! Every registered task owns an inbox. Senders choose between ordered
//! delivery and immediate delivery, which either lands at the head of the
//! inbox or is dropped. Delivering a message always makes the destination
//! runnable; a waiting send also holds the sender until something releases it.

use bitflags::bitflags;

pub mod command;
pub use command::{action, Command, CommandRecord, Direction, TargetKind, REPLY};

mod queue;
pub use queue::{InsertError, Message, MessageQueue, Placement};

use crate::kernel::Tables;
use crate::scheduler::TaskId;
use crate::{log_debug, Error};

bitflags! {
    /// Delivery options for a send.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SendMode: u8 {
        /// Either become the head of the inbox or be dropped.
        const IMMEDIATE = 0b0000_0001;
        /// Hold the sender after a successful send.
        const WAIT = 0b0000_0010;
    }
}

impl SendMode {
    /// Ordered delivery, sender keeps running.
    pub const NORMAL: Self = Self::empty();
}

/// Inbox control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QueueControl {
    /// Count pending messages.
    Stat,
    /// Discard every pending message.
    Clear,
    /// Slot index linked after the head.
    Next,
    /// Sender of the head message.
    Source,
    /// Priority of the head message.
    Priority,
}

/// Answer to a [`QueueControl`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlReply {
    Count(usize),
    Cleared,
    Next(Option<usize>),
    Source(Option<TaskId>),
    Priority(Option<u8>),
}

impl<E, const TASKS: usize, const DEPTH: usize> Tables<E, TASKS, DEPTH> {
    fn inbox(&self, id: TaskId) -> Result<&MessageQueue<DEPTH>, Error> {
        self.inboxes.get(id.index()).ok_or(Error::InvalidTaskId(id))
    }

    fn inbox_mut(&mut self, id: TaskId) -> Result<&mut MessageQueue<DEPTH>, Error> {
        self.inboxes
            .get_mut(id.index())
            .ok_or(Error::InvalidTaskId(id))
    }

    pub(crate) fn send(
        &mut self,
        dest: TaskId,
        src: TaskId,
        priority: u8,
        mode: SendMode,
        body: CommandRecord,
    ) -> Result<(), Error> {
        // Validate everything before the inbox is touched
        self.registry.get(dest)?;
        if mode.contains(SendMode::WAIT) {
            self.registry.get(src)?;
        }

        let placement = if mode.contains(SendMode::IMMEDIATE) {
            Placement::Head
        } else {
            Placement::Ordered
        };
        let message = Message {
            source: src,
            priority,
            body,
        };
        self.inbox_mut(dest)?
            .insert(message, placement)
            .map_err(|e| match e {
                InsertError::Full => Error::QueueFull,
                InsertError::Rejected => Error::Rejected,
            })?;

        if mode.contains(SendMode::WAIT) {
            self.registry.get_mut(src)?.hold();
        }
        self.registry.get_mut(dest)?.make_runnable();

        log_debug!("message {} -> {} priority {}", src, dest, priority);
        Ok(())
    }

    pub(crate) fn receive(&mut self, id: TaskId) -> Result<Option<Message>, Error> {
        Ok(self.inbox_mut(id)?.pop())
    }

    pub(crate) fn control(
        &mut self,
        id: TaskId,
        command: QueueControl,
    ) -> Result<ControlReply, Error> {
        let reply = match command {
            QueueControl::Stat => ControlReply::Count(self.inbox(id)?.len()),
            QueueControl::Clear => {
                self.inbox_mut(id)?.clear();
                ControlReply::Cleared
            }
            QueueControl::Next => ControlReply::Next(self.inbox(id)?.next_index()),
            QueueControl::Source => {
                ControlReply::Source(self.inbox(id)?.peek().map(|m| m.source))
            }
            QueueControl::Priority => {
                ControlReply::Priority(self.inbox(id)?.peek().map(|m| m.priority))
            }
        };
        Ok(reply)
    }

    pub(crate) fn free_slots(&self, id: TaskId) -> Result<usize, Error> {
        Ok(self.inbox(id)?.free_len())
    }
}
