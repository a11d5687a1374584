use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use embedded_time::{clock, rate::Fraction, Clock};
use robot_mtos::ipc::{ControlReply, QueueControl};
use robot_mtos::{
    Command, Error, FaultPolicy, Handle, Kernel, KernelConfig, Priority, SendMode, Status,
    StatusRequest, TaskId,
};

#[derive(Default)]
struct StepClock(AtomicU32);

impl Clock for &'static StepClock {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<embedded_time::Instant<Self>, clock::Error> {
        Ok(embedded_time::Instant::new(self.0.load(Ordering::SeqCst)))
    }
}

fn clock() -> &'static StepClock {
    Box::leak(Box::default())
}

fn counter(handle: &Handle<&'static StepClock>, priority: Priority) -> Arc<AtomicU32> {
    let runs = Arc::new(AtomicU32::new(0));
    let count = runs.clone();
    handle
        .register_fn_with(
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            priority,
            Status::Runnable,
        )
        .unwrap();
    runs
}

#[test]
fn weighted_round_robin_over_eight_ticks() {
    let kernel: Kernel<_> = Kernel::new(clock());
    let handle = kernel.handle();
    let a = counter(&handle, Priority::High);
    let b = counter(&handle, Priority::Normal);
    let c = counter(&handle, Priority::Low);

    let mut scheduler = kernel.scheduler().unwrap();
    for _ in 0..8 {
        scheduler.tick().unwrap();
    }

    assert_eq!(a.load(Ordering::SeqCst), 8);
    assert_eq!(b.load(Ordering::SeqCst), 4);
    assert_eq!(c.load(Ordering::SeqCst), 2);
}

#[test]
fn sleeping_task_never_runs_early() {
    let clock = clock();
    let kernel: Kernel<_> = Kernel::new(clock);
    let handle = kernel.handle();
    let runs = counter(&handle, Priority::High);
    let id = TaskId::new(0);
    handle.set_status_raw(id, 30).unwrap();

    let mut scheduler = kernel.scheduler().unwrap();
    for now in [10, 20, 29] {
        clock.0.store(now, Ordering::SeqCst);
        scheduler.tick().unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    clock.0.store(30, Ordering::SeqCst);
    scheduler.tick().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn drained_inbox_returns_every_slot() {
    let kernel: Kernel<_> = Kernel::new(clock());
    let handle = kernel.handle();
    let src = handle.register_fn(|_| Ok(())).unwrap();
    let dest = handle.register_fn(|_| Ok(())).unwrap();

    for priority in [3, 3, 1] {
        handle
            .send(dest, src, priority, SendMode::NORMAL, Command::Ping)
            .unwrap();
    }
    assert_eq!(
        handle.send(dest, src, 0, SendMode::NORMAL, Command::Stop),
        Err(Error::QueueFull)
    );
    assert_eq!(
        handle.control(dest, QueueControl::Stat),
        Ok(ControlReply::Count(3))
    );

    while handle.receive(dest).unwrap().is_some() {}
    assert_eq!(handle.free_slots(dest), Ok(3));
}

#[test]
fn held_task_wakes_on_message() {
    let kernel: Kernel<_> = Kernel::new(clock());
    let handle = kernel.handle();
    let runs = Arc::new(AtomicU32::new(0));
    let count = runs.clone();
    let listener = handle
        .register_fn_with(
            move |event| {
                while event.kernel.receive(event.id)?.is_some() {
                    count.fetch_add(1, Ordering::SeqCst);
                }
                event.kernel.set_status(event.id, StatusRequest::Hold)
            },
            Priority::High,
            Status::Held,
        )
        .unwrap();

    let mut scheduler = kernel.scheduler().unwrap();
    scheduler.tick().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    handle
        .send(listener, TaskId::new(7), 1, SendMode::NORMAL, Command::Check)
        .unwrap();
    assert_eq!(handle.status(listener), Ok(Status::Runnable));
    scheduler.tick().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(handle.status(listener), Ok(Status::Held));
}

#[test]
fn threaded_kernel_isolates_faults_until_shutdown() {
    let config = KernelConfig::default()
        .with_pass_pause(Duration::from_micros(100))
        .with_fault_policy(FaultPolicy::Isolate);
    let kernel: Kernel<_> = Kernel::with_config(clock(), config);
    let handle = kernel.handle();

    let faulty = handle
        .register_fn_with(|_| Err(Error::Rejected), Priority::High, Status::Runnable)
        .unwrap();
    let healthy = counter(&handle, Priority::High);

    let scheduler = kernel.start().unwrap();
    let info = handle
        .wait_until(faulty, Duration::from_secs(5), |info| info.fault.is_some())
        .unwrap()
        .expect("fault recorded");
    assert_eq!(info.status, Status::Held);

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while healthy.load(Ordering::SeqCst) < 10 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(healthy.load(Ordering::SeqCst) >= 10);

    handle.shutdown();
    assert_eq!(scheduler.join().unwrap(), Ok(()));
}
