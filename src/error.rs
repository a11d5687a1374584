use core::fmt;

use embedded_time::{clock, ConversionError};

use crate::ipc::CommandRecord;
use crate::scheduler::TaskId;

/// Errors reported by the kernel and its collaborators.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// The task registry is full.
    CapacityExceeded,
    /// No task is registered under this id.
    InvalidTaskId(TaskId),
    /// The weight is not one of 1, 2 or 4.
    InvalidPriority(u8),
    /// A raw status value that is neither a sentinel nor a positive delay.
    InvalidStatus(i32),
    /// The destination inbox has no free slot. The message was dropped.
    QueueFull,
    /// An immediate send lost against the current head. The message was dropped.
    Rejected,
    /// The record does not decode to a known command.
    InvalidCommand(CommandRecord),
    /// A task panicked or returned an error and has been held.
    TaskFault(TaskId),
    /// The kernel already has a scheduler.
    SchedulerRunning,
    /// The scheduler thread could not be spawned.
    Spawn,
    Clock(clock::Error),
    Time(ConversionError),
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded => f.write_str("task registry is full"),
            Error::InvalidTaskId(id) => write!(f, "no task registered as {}", id),
            Error::InvalidPriority(weight) => write!(f, "invalid priority weight {}", weight),
            Error::InvalidStatus(value) => write!(f, "invalid status value {}", value),
            Error::QueueFull => f.write_str("message queue is full"),
            Error::Rejected => f.write_str("immediate message rejected"),
            Error::InvalidCommand(record) => {
                write!(f, "unknown command action {}", record.action)
            }
            Error::TaskFault(id) => write!(f, "task {} faulted", id),
            Error::SchedulerRunning => f.write_str("kernel already has a scheduler"),
            Error::Spawn => f.write_str("failed to spawn scheduler thread"),
            Error::Clock(e) => write!(f, "clock error: {:?}", e),
            Error::Time(e) => write!(f, "time conversion error: {:?}", e),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::CapacityExceeded => defmt::write!(f, "CapacityExceeded"),
            Error::InvalidTaskId(id) => defmt::write!(f, "InvalidTaskId({})", id),
            Error::InvalidPriority(weight) => defmt::write!(f, "InvalidPriority({})", weight),
            Error::InvalidStatus(value) => defmt::write!(f, "InvalidStatus({})", value),
            Error::QueueFull => defmt::write!(f, "QueueFull"),
            Error::Rejected => defmt::write!(f, "Rejected"),
            Error::InvalidCommand(record) => {
                defmt::write!(f, "InvalidCommand({})", record.action)
            }
            Error::TaskFault(id) => defmt::write!(f, "TaskFault({})", id),
            Error::SchedulerRunning => defmt::write!(f, "SchedulerRunning"),
            Error::Spawn => defmt::write!(f, "Spawn"),
            Error::Clock(_) => defmt::write!(f, "Clock"),
            Error::Time(_) => defmt::write!(f, "Time"),
        }
    }
}
