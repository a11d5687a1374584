use std::time::{Duration, Instant};

use embedded_time::{clock, rate::Fraction, Clock};
use robot_mtos::hal::{Compass, DriveServo, HeadServo, RangeFinder, WheelEncoders};
use robot_mtos::ipc::{Direction, TargetKind};
use robot_mtos::motor::MotorController;
use robot_mtos::sonar::SonarController;
use robot_mtos::{Command, Kernel, Priority, SendMode, Status, StatusRequest};

struct HostClock(Instant);

impl Clock for HostClock {
    type T = u32;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

    fn try_now(&self) -> Result<embedded_time::Instant<Self>, clock::Error> {
        Ok(embedded_time::Instant::new(self.0.elapsed().as_millis() as u32))
    }
}

struct ExampleWheel(&'static str);

impl DriveServo for ExampleWheel {
    fn set_speed(&mut self, percent: i32) {
        println!("{} wheel {}%", self.0, percent);
    }
}

struct ExampleEncoders;

impl WheelEncoders for ExampleEncoders {
    fn take_clicks(&mut self) -> (i32, i32) {
        (4, 4)
    }
}

struct ExampleCompass;

impl Compass for ExampleCompass {
    fn heading(&mut self) -> i32 {
        0
    }
}

struct ExampleHead;

impl HeadServo for ExampleHead {
    fn point(&mut self, angle: i32) {
        println!("head at {}", angle);
    }

    fn relax(&mut self) {}
}

struct ExampleSonar;

impl RangeFinder for ExampleSonar {
    fn ping_cm(&mut self) -> i32 {
        80
    }
}

fn main() {
    let kernel: Kernel<_> = Kernel::new(HostClock(Instant::now()));
    let handle = kernel.handle();

    let motor = MotorController::new(
        ExampleWheel("left"),
        ExampleWheel("right"),
        ExampleEncoders,
        ExampleCompass,
    );
    let motor = handle
        .register_with(motor, Priority::High, Status::Runnable)
        .unwrap();
    let sonar = SonarController::new(ExampleHead, ExampleSonar);
    let sonar = handle
        .register_with(sonar, Priority::Normal, Status::Runnable)
        .unwrap();

    // Scan, drive a foot, then report where the closest object was
    handle
        .register_fn_with(
            move |event| {
                let kernel = event.kernel;
                while let Some(message) = kernel.receive(event.id)? {
                    let reply = Command::try_from(message.body)?;
                    println!("reply from {}: {:?}", message.source, reply);
                }

                let step = kernel.state(event.id)?;
                let (dest, mode, command) = match step {
                    0 => (sonar, SendMode::NORMAL, Command::Scan { range: 45 }),
                    1 => (
                        motor,
                        SendMode::NORMAL,
                        Command::Move {
                            direction: Direction::Forward,
                            velocity: 50,
                            distance: 12,
                        },
                    ),
                    2 => (sonar, SendMode::WAIT, Command::Target(TargetKind::Closest)),
                    3 => (motor, SendMode::WAIT, Command::GetPosition),
                    _ => return kernel.set_status(event.id, StatusRequest::Hold),
                };
                kernel.send(dest, event.id, 2, mode, command)?;
                kernel.set_state(event.id, step + 1)?;
                if kernel.status(event.id)? != Status::Held {
                    kernel.set_status(event.id, StatusRequest::Sleep(500))?;
                }
                Ok(())
            },
            Priority::Low,
            Status::Runnable,
        )
        .unwrap();

    let scheduler = kernel.start().unwrap();
    std::thread::sleep(Duration::from_secs(3));
    handle.shutdown();
    scheduler.join().unwrap().unwrap();
}
