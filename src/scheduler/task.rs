use core::fmt;

use embedded_time::duration::Milliseconds;

use crate::Error;

/// Identifier of a registered task, dense from 0 in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Create an id from a raw index.
    /// The id is only meaningful once a task has been registered under it.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scheduling status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Skipped until made runnable again.
    Held,
    /// Eligible for dispatch on ticks matching its priority.
    Runnable,
    /// Becomes runnable once its wake deadline has passed.
    Sleeping,
}

/// Priority class of a task.
///
/// The discriminant is the tick divisor: a task runs on every tick
/// whose counter is a multiple of its weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    High = 1,
    #[default]
    Normal = 2,
    Low = 4,
}

impl Priority {
    pub const fn weight(self) -> u8 {
        self as u8
    }

    /// Returns `true` if a task of this priority is due on `tick`.
    pub const fn is_due(self, tick: u8) -> bool {
        tick % self.weight() == 0
    }
}

impl TryFrom<u8> for Priority {
    type Error = Error;

    fn try_from(weight: u8) -> Result<Self, Self::Error> {
        match weight {
            1 => Ok(Priority::High),
            2 => Ok(Priority::Normal),
            4 => Ok(Priority::Low),
            other => Err(Error::InvalidPriority(other)),
        }
    }
}

/// A requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusRequest {
    Hold,
    Run,
    /// Sleep for this many milliseconds.
    Sleep(u32),
}

impl StatusRequest {
    /// Raw value meaning [`StatusRequest::Hold`].
    pub const HELD: i32 = 0;

    /// Raw value meaning [`StatusRequest::Run`].
    pub const RUNNABLE: i32 = 1;
}

impl TryFrom<i32> for StatusRequest {
    type Error = Error;

    /// Decode the raw convention: `0` holds, `1` runs and any other
    /// positive value is a delay in milliseconds.
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            Self::HELD => Ok(StatusRequest::Hold),
            Self::RUNNABLE => Ok(StatusRequest::Run),
            ms if ms > 1 => Ok(StatusRequest::Sleep(ms as u32)),
            other => Err(Error::InvalidStatus(other)),
        }
    }
}

/// What went wrong the last time a task was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// The task panicked.
    Panicked,
    /// The task returned an error.
    Errored,
}

/// A point-in-time copy of a task descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskInfo {
    pub id: TaskId,
    pub status: Status,
    pub priority: Priority,
    pub state: i32,
    pub fault: Option<Fault>,
}

/// An event passed to a task each time it is dispatched.
pub struct Event<'a, K> {
    /// The id of the running task.
    pub id: TaskId,

    /// The time the current pass started.
    pub now: Milliseconds<u32>,

    /// Handle to the kernel running this task.
    pub kernel: &'a K,
}

/// One cooperative unit of work.
///
/// `run` performs a single iteration and must return without blocking.
/// Work spanning several ticks keeps its position in `self` or in the
/// task's state slot.
pub trait Task<K> {
    fn run(&mut self, event: Event<'_, K>) -> Result<(), Error>;
}

/// Adapter running a closure as a [`Task`].
pub struct FnTask<F>(pub F);

impl<K, F> Task<K> for FnTask<F>
where
    F: FnMut(Event<'_, K>) -> Result<(), Error>,
{
    fn run(&mut self, event: Event<'_, K>) -> Result<(), Error> {
        (self.0)(event)
    }
}
