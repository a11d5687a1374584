//! Shared kernel state and the task control surface.
//!
//! The registry and every inbox sit behind one lock inside a [`Handle`].
//! Handles are cheap to clone and may be used from any thread: from inside
//! a running task, from the setup code that registers tasks, or from an
//! observer waiting on a task's progress. The scheduler never holds the lock
//! while a task runs, so tasks may freely call back into their handle.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use core::time::Duration;

use embedded_time::duration::{Duration as _, Generic, Milliseconds};
use embedded_time::Clock;
use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::config::KernelConfig;
use crate::ipc::{CommandRecord, ControlReply, Message, MessageQueue, QueueControl, SendMode};
use crate::scheduler::{
    registry::Registry, Event, FnTask, Priority, Scheduler, Status, StatusRequest, Task, TaskId,
    TaskInfo,
};
use crate::{log_error, log_info, log_warn, Error};

/// Task registry plus one inbox per registered task.
pub struct Tables<E, const TASKS: usize, const DEPTH: usize> {
    pub(crate) registry: Registry<E, TASKS>,
    pub(crate) inboxes: heapless::Vec<MessageQueue<DEPTH>, TASKS>,
    /// Bumped on every locked update.
    generation: u64,
}

impl<E, const TASKS: usize, const DEPTH: usize> Tables<E, TASKS, DEPTH> {
    fn new() -> Self {
        Self {
            registry: Registry::new(),
            inboxes: heapless::Vec::new(),
            generation: 0,
        }
    }

    fn register(&mut self, entry: E, priority: Priority, status: Status) -> Result<TaskId, Error> {
        let id = self.registry.register(entry, priority, status)?;
        self.inboxes
            .push(MessageQueue::new())
            .map_err(|_| Error::CapacityExceeded)?;
        Ok(id)
    }
}

/// A boxed task as stored in the registry.
pub type Entry<C, const TASKS: usize, const DEPTH: usize> =
    Box<dyn Task<Handle<C, TASKS, DEPTH>> + Send>;

struct Shared<C, const TASKS: usize, const DEPTH: usize> {
    clock: C,
    config: KernelConfig,
    tables: Mutex<Tables<Entry<C, TASKS, DEPTH>, TASKS, DEPTH>>,
    // Broadcast on every change to the tables
    changed: Condvar,
    notify: Notify,
    shutdown: AtomicBool,
    // Set while a scheduler exists
    scheduler_claimed: AtomicBool,
}

/// Thread-safe reference to a kernel.
pub struct Handle<C, const TASKS: usize = 8, const DEPTH: usize = 3> {
    shared: Arc<Shared<C, TASKS, DEPTH>>,
}

impl<C, const TASKS: usize, const DEPTH: usize> Clone for Handle<C, TASKS, DEPTH> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C, const TASKS: usize, const DEPTH: usize> Handle<C, TASKS, DEPTH> {
    pub fn config(&self) -> &KernelConfig {
        &self.shared.config
    }

    /// Run `f` against the tables and wake every waiter afterwards.
    pub(crate) fn with_tables<R>(
        &self,
        f: impl FnOnce(&mut Tables<Entry<C, TASKS, DEPTH>, TASKS, DEPTH>) -> R,
    ) -> R {
        let mut tables = self.shared.tables.lock();
        let output = f(&mut tables);
        tables.generation = tables.generation.wrapping_add(1);
        drop(tables);
        self.shared.changed.notify_all();
        self.shared.notify.notify_waiters();
        output
    }

    fn read<R>(&self, f: impl FnOnce(&Tables<Entry<C, TASKS, DEPTH>, TASKS, DEPTH>) -> R) -> R {
        f(&self.shared.tables.lock())
    }

    /// Register a task with normal priority, runnable immediately.
    pub fn register<T>(&self, task: T) -> Result<TaskId, Error>
    where
        T: Task<Self> + Send + 'static,
    {
        self.register_with(task, Priority::Normal, Status::Runnable)
    }

    pub fn register_with<T>(
        &self,
        task: T,
        priority: Priority,
        status: Status,
    ) -> Result<TaskId, Error>
    where
        T: Task<Self> + Send + 'static,
    {
        let result = self.with_tables(|tables| tables.register(Box::new(task), priority, status));
        match &result {
            Ok(id) => log_info!("registered task {} with weight {}", id, priority.weight()),
            Err(e) => log_warn!("task registration failed: {}", e),
        }
        result
    }

    /// Register a closure with normal priority, runnable immediately.
    pub fn register_fn<F>(&self, f: F) -> Result<TaskId, Error>
    where
        F: FnMut(Event<'_, Self>) -> Result<(), Error> + Send + 'static,
    {
        self.register(FnTask(f))
    }

    pub fn register_fn_with<F>(
        &self,
        f: F,
        priority: Priority,
        status: Status,
    ) -> Result<TaskId, Error>
    where
        F: FnMut(Event<'_, Self>) -> Result<(), Error> + Send + 'static,
    {
        self.register_with(FnTask(f), priority, status)
    }

    pub fn task_count(&self) -> usize {
        self.read(|tables| tables.registry.len())
    }

    pub fn set_priority(&self, id: TaskId, priority: Priority) -> Result<(), Error> {
        self.with_tables(|tables| tables.registry.set_priority(id, priority))
    }

    /// Set the priority from its raw weight (1, 2 or 4).
    pub fn set_priority_weight(&self, id: TaskId, weight: u8) -> Result<(), Error> {
        self.set_priority(id, Priority::try_from(weight)?)
    }

    pub fn set_state(&self, id: TaskId, state: i32) -> Result<(), Error> {
        self.with_tables(|tables| tables.registry.set_state(id, state))
    }

    pub fn state(&self, id: TaskId) -> Result<i32, Error> {
        self.read(|tables| tables.registry.state(id))
    }

    pub fn status(&self, id: TaskId) -> Result<Status, Error> {
        self.read(|tables| tables.registry.status(id))
    }

    pub fn priority(&self, id: TaskId) -> Result<Priority, Error> {
        self.read(|tables| tables.registry.priority(id))
    }

    pub fn info(&self, id: TaskId) -> Result<TaskInfo, Error> {
        self.read(|tables| tables.registry.info(id))
    }

    /// Send `body` to the inbox of `dest`.
    ///
    /// On success the destination becomes runnable, and with
    /// [`SendMode::WAIT`] the sender `src` is held.
    pub fn send(
        &self,
        dest: TaskId,
        src: TaskId,
        priority: u8,
        mode: SendMode,
        body: impl Into<CommandRecord>,
    ) -> Result<(), Error> {
        let body = body.into();
        let result = self.with_tables(|tables| tables.send(dest, src, priority, mode, body));
        if let Err(e) = &result {
            log_warn!("message {} -> {} dropped: {}", src, dest, e);
        }
        result
    }

    /// Take the next message from the inbox of `id`, if any.
    pub fn receive(&self, id: TaskId) -> Result<Option<Message>, Error> {
        self.with_tables(|tables| tables.receive(id))
    }

    pub fn control(&self, id: TaskId, command: QueueControl) -> Result<ControlReply, Error> {
        self.with_tables(|tables| tables.control(id, command))
    }

    /// Count of free slots in the inbox of `id`.
    pub fn free_slots(&self, id: TaskId) -> Result<usize, Error> {
        self.read(|tables| tables.free_slots(id))
    }

    /// Block until `predicate` holds for task `id` or `timeout` elapses.
    ///
    /// The predicate runs without the kernel lock held, so it may call back
    /// into this handle. Returns the matching snapshot, or `None` on timeout.
    pub fn wait_until<F>(
        &self,
        id: TaskId,
        timeout: Duration,
        mut predicate: F,
    ) -> Result<Option<TaskInfo>, Error>
    where
        F: FnMut(&TaskInfo) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let (info, seen) = self.read(|tables| {
                tables.registry.info(id).map(|info| (info, tables.generation))
            })?;
            if predicate(&info) {
                return Ok(Some(info));
            }

            let mut tables = self.shared.tables.lock();
            // Only sleep if nothing changed while the predicate ran
            if tables.generation == seen
                && self.shared.changed.wait_until(&mut tables, deadline).timed_out()
            {
                drop(tables);
                let info = self.info(id)?;
                return Ok(predicate(&info).then_some(info));
            }
        }
    }

    /// Wait asynchronously until `predicate` holds for task `id`.
    pub async fn wait_until_async<F>(
        &self,
        id: TaskId,
        mut predicate: F,
    ) -> Result<TaskInfo, Error>
    where
        F: FnMut(&TaskInfo) -> bool,
    {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a change in between is not missed
            notified.as_mut().enable();

            let info = self.info(id)?;
            if predicate(&info) {
                return Ok(info);
            }
            notified.await;
        }
    }

    /// Ask the scheduler loop to stop after its current pass.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.changed.notify_all();
        self.shared.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Take the single scheduler slot of this kernel.
    pub(crate) fn claim_scheduler(&self) -> Result<(), Error> {
        self.shared
            .scheduler_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(drop)
            .map_err(|_| Error::SchedulerRunning)
    }

    pub(crate) fn release_scheduler(&self) {
        self.shared.scheduler_claimed.store(false, Ordering::Release);
    }
}

impl<C, const TASKS: usize, const DEPTH: usize> Handle<C, TASKS, DEPTH>
where
    C: Clock<T = u32>,
{
    /// Milliseconds since the clock's epoch.
    pub fn now(&self) -> Result<Milliseconds<u32>, Error> {
        Ok(self.read_clock()?.1)
    }

    /// Raw clock ticks, and the same instant in milliseconds since the epoch.
    pub(crate) fn read_clock(&self) -> Result<(u32, Milliseconds<u32>), Error> {
        let since_epoch = self.shared.clock.try_now()?.duration_since_epoch();
        Ok((since_epoch.integer(), Milliseconds::try_from(since_epoch)?))
    }

    /// Hold, run, or put task `id` to sleep.
    pub fn set_status(&self, id: TaskId, request: StatusRequest) -> Result<(), Error> {
        let (request, now) = match request {
            StatusRequest::Sleep(delay_ms) => {
                let ticks: Generic<u32> = Milliseconds(delay_ms).to_generic(C::SCALING_FACTOR)?;
                (StatusRequest::Sleep(ticks.integer()), self.read_clock()?.0)
            }
            other => (other, 0),
        };
        self.with_tables(|tables| tables.registry.set_status(id, request, now))
    }

    /// Set the status from a raw value: 0 holds, 1 runs, otherwise sleep that many ms.
    pub fn set_status_raw(&self, id: TaskId, value: i32) -> Result<(), Error> {
        self.set_status(id, StatusRequest::try_from(value)?)
    }

    /// Put the task to sleep for `delay`.
    pub fn sleep(&self, id: TaskId, delay: Milliseconds<u32>) -> Result<(), Error> {
        self.set_status(id, StatusRequest::Sleep(delay.0))
    }
}

/// Owner of the kernel tables and the clock.
pub struct Kernel<C, const TASKS: usize = 8, const DEPTH: usize = 3> {
    handle: Handle<C, TASKS, DEPTH>,
}

impl<C, const TASKS: usize, const DEPTH: usize> Kernel<C, TASKS, DEPTH>
where
    C: Clock<T = u32>,
{
    pub fn new(clock: C) -> Self {
        Self::with_config(clock, KernelConfig::default())
    }

    pub fn with_config(clock: C, config: KernelConfig) -> Self {
        Self {
            handle: Handle {
                shared: Arc::new(Shared {
                    clock,
                    config,
                    tables: Mutex::new(Tables::new()),
                    changed: Condvar::new(),
                    notify: Notify::new(),
                    shutdown: AtomicBool::new(false),
                    scheduler_claimed: AtomicBool::new(false),
                }),
            },
        }
    }

    pub fn handle(&self) -> Handle<C, TASKS, DEPTH> {
        self.handle.clone()
    }

    /// Create the scheduler driving this kernel.
    ///
    /// A kernel has at most one scheduler at a time. Fails with
    /// [`Error::SchedulerRunning`] until the previous one is dropped.
    pub fn scheduler(&self) -> Result<Scheduler<C, TASKS, DEPTH>, Error> {
        Scheduler::new(self.handle())
    }

    /// Run the scheduler loop on its own thread until [`Handle::shutdown`].
    pub fn start(&self) -> Result<JoinHandle<Result<(), Error>>, Error>
    where
        C: Send + Sync + 'static,
    {
        let mut scheduler = self.scheduler()?;
        thread::Builder::new()
            .name("mtos-scheduler".into())
            .spawn(move || scheduler.run())
            .map_err(|e: io::Error| {
                log_error!("failed to spawn scheduler thread: {}", e);
                Error::Spawn
            })
    }
}
