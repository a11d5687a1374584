//! Task registry
//!
//! Fixed-capacity table of task descriptors. Ids are indices into the
//! table, handed out densely in registration order. Tasks are never
//! removed, so an id stays valid for the life of the registry.
//!
//! Times are raw ticks of a free-running `u32` clock that wraps. A deadline
//! is reached once it lies at most [`MAX_SLEEP_TICKS`] behind the current
//! tick, so sleeps longer than that are shortened to it.

use heapless::Vec;

use super::task::{Fault, Priority, Status, StatusRequest, TaskId, TaskInfo};
use crate::Error;

/// Longest sleep, in clock ticks. Half the clock range, so a deadline is
/// never confused with one from the previous wrap.
pub const MAX_SLEEP_TICKS: u32 = i32::MAX as u32;

/// Returns `true` once `now` has reached `deadline` on the wrapping clock.
pub(crate) const fn deadline_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) <= MAX_SLEEP_TICKS
}

/// Bookkeeping for one registered task.
pub struct Descriptor<E> {
    /// `None` while the scheduler is running the task.
    pub(crate) entry: Option<E>,
    pub(crate) status: Status,
    /// Absolute wake tick, set only while sleeping.
    pub(crate) wake_deadline: Option<u32>,
    pub(crate) priority: Priority,
    pub(crate) state: i32,
    pub(crate) fault: Option<Fault>,
}

impl<E> Descriptor<E> {
    fn new(entry: E, priority: Priority, status: Status) -> Self {
        Self {
            entry: Some(entry),
            status,
            wake_deadline: None,
            priority,
            state: 0,
            fault: None,
        }
    }

    /// Returns `true` if this task should run on pass `tick` at clock tick `now`.
    /// A sleeping task whose deadline has passed is woken as a side effect.
    pub(crate) fn poll(&mut self, tick: u8, now: u32) -> bool {
        match self.status {
            Status::Runnable => self.priority.is_due(tick),
            Status::Sleeping => match self.wake_deadline {
                Some(deadline) if deadline_reached(now, deadline) => {
                    self.wake_deadline = None;
                    self.status = Status::Runnable;
                    true
                }
                Some(_) => false,
                None => {
                    self.status = Status::Runnable;
                    true
                }
            },
            Status::Held => false,
        }
    }

    pub(crate) fn make_runnable(&mut self) {
        self.status = Status::Runnable;
        self.wake_deadline = None;
    }

    pub(crate) fn hold(&mut self) {
        self.status = Status::Held;
        self.wake_deadline = None;
    }
}

/// Fixed-capacity table of `N` task descriptors.
pub struct Registry<E, const N: usize> {
    tasks: Vec<Descriptor<E>, N>,
}

impl<E, const N: usize> Default for Registry<E, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, const N: usize> Registry<E, N> {
    const FITS_TASK_ID: () = assert!(
        N <= u8::MAX as usize + 1,
        "task ids are u8, so a registry holds at most 256 tasks"
    );

    pub const fn new() -> Self {
        let () = Self::FITS_TASK_ID;
        Self { tasks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Add a task, returning its id.
    /// Fails with [`Error::CapacityExceeded`] without touching the table when full.
    pub fn register(
        &mut self,
        entry: E,
        priority: Priority,
        status: Status,
    ) -> Result<TaskId, Error> {
        let id = u8::try_from(self.tasks.len())
            .map(TaskId)
            .map_err(|_| Error::CapacityExceeded)?;
        self.tasks
            .push(Descriptor::new(entry, priority, status))
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Result<&Descriptor<E>, Error> {
        self.tasks.get(id.index()).ok_or(Error::InvalidTaskId(id))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut Descriptor<E>, Error> {
        self.tasks
            .get_mut(id.index())
            .ok_or(Error::InvalidTaskId(id))
    }

    /// Apply a status request. `now` anchors a sleep deadline and the
    /// delay of [`StatusRequest::Sleep`] is taken in clock ticks.
    pub fn set_status(
        &mut self,
        id: TaskId,
        request: StatusRequest,
        now: u32,
    ) -> Result<(), Error> {
        let task = self.get_mut(id)?;
        match request {
            StatusRequest::Hold => task.hold(),
            StatusRequest::Run => task.make_runnable(),
            StatusRequest::Sleep(delay) => {
                task.status = Status::Sleeping;
                task.wake_deadline = Some(now.wrapping_add(delay.min(MAX_SLEEP_TICKS)));
            }
        }
        Ok(())
    }

    pub fn set_priority(&mut self, id: TaskId, priority: Priority) -> Result<(), Error> {
        self.get_mut(id)?.priority = priority;
        Ok(())
    }

    pub fn set_state(&mut self, id: TaskId, state: i32) -> Result<(), Error> {
        self.get_mut(id)?.state = state;
        Ok(())
    }

    pub fn status(&self, id: TaskId) -> Result<Status, Error> {
        self.get(id).map(|task| task.status)
    }

    pub fn priority(&self, id: TaskId) -> Result<Priority, Error> {
        self.get(id).map(|task| task.priority)
    }

    pub fn state(&self, id: TaskId) -> Result<i32, Error> {
        self.get(id).map(|task| task.state)
    }

    /// Wake deadline of a sleeping task.
    pub fn wake_deadline(&self, id: TaskId) -> Result<Option<u32>, Error> {
        self.get(id).map(|task| task.wake_deadline)
    }

    pub fn info(&self, id: TaskId) -> Result<TaskInfo, Error> {
        self.get(id).map(|task| TaskInfo {
            id,
            status: task.status,
            priority: task.priority,
            state: task.state,
            fault: task.fault,
        })
    }

    /// Hold a task and record why.
    pub(crate) fn record_fault(&mut self, id: TaskId, fault: Fault) -> Result<(), Error> {
        let task = self.get_mut(id)?;
        task.hold();
        task.fault = Some(fault);
        Ok(())
    }
}
