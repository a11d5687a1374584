//! Cooperative scheduler loop.
//!
//! Each pass visits every registered task in ascending id order. Runnable
//! tasks run when the pass counter is a multiple of their priority weight,
//! so high priority tasks run every pass, normal every other pass and low
//! every fourth. Sleeping tasks run in the same pass their deadline is
//! reached. Held tasks are skipped.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use embedded_time::{duration::Milliseconds, Clock};

pub mod registry;

mod task;
pub use task::{Event, Fault, FnTask, Priority, Status, StatusRequest, Task, TaskId, TaskInfo};

use crate::config::FaultPolicy;
use crate::kernel::{Entry, Handle};
use crate::{log_error, log_info, Error};

/// Ticks in one full cycle of the pass counter, the LCM of the priority weights.
pub const TICK_CYCLE: u8 = 4;

enum Dispatch<E> {
    /// Past the last registered task.
    End,
    Skip,
    Run(E),
}

/// Drives the tasks of one kernel. Only one exists per kernel at a time.
pub struct Scheduler<C, const TASKS: usize = 8, const DEPTH: usize = 3> {
    kernel: Handle<C, TASKS, DEPTH>,
    tick_counter: u8,
    passes: u64,
}

impl<C, const TASKS: usize, const DEPTH: usize> Scheduler<C, TASKS, DEPTH>
where
    C: Clock<T = u32>,
{
    /// Fails with [`Error::SchedulerRunning`] if `kernel` already has a scheduler.
    pub fn new(kernel: Handle<C, TASKS, DEPTH>) -> Result<Self, Error> {
        kernel.claim_scheduler()?;
        Ok(Self {
            kernel,
            tick_counter: 1,
            passes: 0,
        })
    }

    pub fn handle(&self) -> &Handle<C, TASKS, DEPTH> {
        &self.kernel
    }

    /// The counter used by the next pass, in `1..=TICK_CYCLE`.
    pub fn tick_counter(&self) -> u8 {
        self.tick_counter
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Run passes until the kernel is shut down.
    pub fn run(&mut self) -> Result<(), Error> {
        log_info!("scheduler started with {} tasks", self.kernel.task_count());

        while !self.kernel.is_shutdown() {
            self.tick()?;

            let pause = self.kernel.config().pass_pause;
            if pause.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(pause);
            }
        }

        log_info!("scheduler stopped after {} passes", self.passes);
        Ok(())
    }

    /// Run a single pass over every registered task.
    pub fn tick(&mut self) -> Result<(), Error> {
        let (ticks, now) = self.kernel.read_clock()?;
        let tick = self.tick_counter;

        let mut result = Ok(());
        for index in 0..=u8::MAX {
            let id = TaskId(index);
            match self.poll(id, tick, ticks) {
                Dispatch::End => break,
                Dispatch::Skip => {}
                Dispatch::Run(entry) => {
                    if let Err(e) = self.dispatch(id, entry, now) {
                        result = Err(e);
                        break;
                    }
                }
            }
        }

        self.advance();
        result
    }

    fn poll(&self, id: TaskId, tick: u8, now: u32) -> Dispatch<Entry<C, TASKS, DEPTH>> {
        self.kernel.with_tables(|tables| {
            let Ok(task) = tables.registry.get_mut(id) else {
                return Dispatch::End;
            };
            if !task.poll(tick, now) {
                return Dispatch::Skip;
            }
            task.entry.take().map_or(Dispatch::Skip, Dispatch::Run)
        })
    }

    /// Run one task outside the lock and put it back afterwards.
    fn dispatch(
        &mut self,
        id: TaskId,
        mut entry: Entry<C, TASKS, DEPTH>,
        now: Milliseconds<u32>,
    ) -> Result<(), Error> {
        let event = Event {
            id,
            now,
            kernel: &self.kernel,
        };
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry.run(event)));

        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                log_error!("task {} failed: {}", id, e);
                Some(Fault::Errored)
            }
            Err(_) => {
                log_error!("task {} panicked", id);
                Some(Fault::Panicked)
            }
        };

        self.kernel.with_tables(|tables| -> Result<(), Error> {
            tables.registry.get_mut(id)?.entry = Some(entry);
            if let Some(fault) = fault {
                tables.registry.record_fault(id, fault)?;
            }
            Ok(())
        })?;

        match (fault, self.kernel.config().fault_policy) {
            (Some(_), FaultPolicy::Propagate) => Err(Error::TaskFault(id)),
            _ => Ok(()),
        }
    }

    fn advance(&mut self) {
        self.passes += 1;
        self.tick_counter += 1;
        if self.tick_counter > TICK_CYCLE {
            self.tick_counter = 1;
        }
    }
}

impl<C, const TASKS: usize, const DEPTH: usize> Drop for Scheduler<C, TASKS, DEPTH> {
    fn drop(&mut self) {
        self.kernel.release_scheduler();
    }
}
