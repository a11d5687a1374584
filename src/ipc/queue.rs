//! Per-task message inbox.
//!
//! Messages live in a fixed array of `DEPTH` slots. Slots are threaded
//! onto one of two singly linked lists by index: the pending list, kept in
//! priority order, and the free list. Sending pops a free slot and receiving
//! pushes it back on the front of the free list.

use super::CommandRecord;
use crate::scheduler::TaskId;

/// A pending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message {
    pub source: TaskId,
    /// Lower values are received first.
    pub priority: u8,
    pub body: CommandRecord,
}

#[derive(Clone, Copy)]
struct Slot {
    message: Message,
    next: Option<usize>,
}

const BLANK: Message = Message {
    source: TaskId(0),
    priority: 0,
    body: CommandRecord::new(0, 0, 0, 0),
};

/// How an inbox insert is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Before the first message of strictly lower priority.
    Ordered,
    /// At the head only, and only if no pending message outranks it.
    Head,
}

/// Why an insert failed. Both cases drop the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    Full,
    Rejected,
}

/// Fixed-capacity priority inbox.
pub struct MessageQueue<const DEPTH: usize> {
    slots: [Slot; DEPTH],
    head: Option<usize>,
    free: Option<usize>,
}

impl<const DEPTH: usize> Default for MessageQueue<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const DEPTH: usize> MessageQueue<DEPTH> {
    pub fn new() -> Self {
        let mut queue = Self {
            slots: [Slot {
                message: BLANK,
                next: None,
            }; DEPTH],
            head: None,
            free: None,
        };
        queue.clear();
        queue
    }

    /// Drop every pending message and relink all slots into the free list.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            slot.message = BLANK;
            slot.next = if index + 1 < DEPTH {
                Some(index + 1)
            } else {
                None
            };
        }
        self.head = None;
        self.free = if DEPTH > 0 { Some(0) } else { None };
    }

    pub const fn capacity(&self) -> usize {
        DEPTH
    }

    /// Count of pending messages.
    pub fn len(&self) -> usize {
        self.chain(self.head).count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Count of slots available to senders.
    pub fn free_len(&self) -> usize {
        self.chain(self.free).count()
    }

    /// The next message to be received.
    pub fn peek(&self) -> Option<&Message> {
        self.head.map(|index| &self.slots[index].message)
    }

    /// Slot index linked after the head.
    pub fn next_index(&self) -> Option<usize> {
        self.head.and_then(|index| self.slots[index].next)
    }

    /// Pending messages in receive order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.chain(self.head).map(move |index| &self.slots[index].message)
    }

    pub fn insert(&mut self, message: Message, placement: Placement) -> Result<(), InsertError> {
        let index = self.free.ok_or(InsertError::Full)?;
        self.free = self.slots[index].next;
        self.slots[index].message = message;

        match placement {
            Placement::Head => {
                let wins = self
                    .peek()
                    .map_or(true, |head| head.priority >= message.priority);
                if !wins {
                    self.release(index);
                    return Err(InsertError::Rejected);
                }
                self.slots[index].next = self.head;
                self.head = Some(index);
            }
            Placement::Ordered => {
                // Find the last node that stays ahead of the new message
                let mut prev = None;
                let mut cursor = self.head;
                while let Some(current) = cursor {
                    if self.slots[current].message.priority > message.priority {
                        break;
                    }
                    prev = Some(current);
                    cursor = self.slots[current].next;
                }

                self.slots[index].next = cursor;
                match prev {
                    Some(prev) => self.slots[prev].next = Some(index),
                    None => self.head = Some(index),
                }
            }
        }
        Ok(())
    }

    /// Remove and return the head message.
    pub fn pop(&mut self) -> Option<Message> {
        let index = self.head?;
        let message = self.slots[index].message;
        self.head = self.slots[index].next;
        self.release(index);
        Some(message)
    }

    fn release(&mut self, index: usize) {
        self.slots[index].message = BLANK;
        self.slots[index].next = self.free;
        self.free = Some(index);
    }

    fn chain(&self, start: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        core::iter::successors(start, move |index| self.slots[*index].next)
    }
}
