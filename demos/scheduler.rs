use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use embedded_time::{clock, rate::Fraction, Clock};
use robot_mtos::{Kernel, Priority, Status};

/// Milliseconds since the clock was created.
struct HostClock(Instant);

impl Clock for HostClock {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<embedded_time::Instant<Self>, clock::Error> {
        Ok(embedded_time::Instant::new(self.0.elapsed().as_millis() as u32))
    }
}

fn main() {
    let kernel: Kernel<_> = Kernel::new(HostClock(Instant::now()));
    let handle = kernel.handle();

    let mut counters = Vec::new();
    for (name, priority) in [("A", Priority::High), ("B", Priority::Normal), ("C", Priority::Low)] {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        handle
            .register_fn_with(
                move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                },
                priority,
                Status::Runnable,
            )
            .unwrap();
        counters.push((name, runs));
    }

    let scheduler = kernel.start().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    handle.shutdown();
    scheduler.join().unwrap().unwrap();

    for (name, runs) in counters {
        println!("{}: {} runs", name, runs.load(Ordering::Relaxed));
    }
}
