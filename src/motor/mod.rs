//! PID drive control with compass rotation and dead reckoning.
//!
//! [`MotorController`] runs as a kernel task. Each dispatch it drains its
//! inbox, performs one control iteration and puts itself to sleep until the
//! next one. A new message wakes it early.

use embedded_time::Clock;
use num_traits::clamp;

mod config;
pub use config::{Mode, MotorConfig};

mod pose;
pub use pose::Pose;

use crate::hal::{heading_diff, Compass, DriveServo, WheelEncoders};
use crate::ipc::{action, Command, CommandRecord, Direction, Message, SendMode};
use crate::kernel::Handle;
use crate::scheduler::{Event, Task};
use crate::{log_debug, log_warn, Error};

/// What the drive is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Function {
    #[default]
    Stop,
    Forward,
    Backward,
    Left,
    Right,
}

impl Function {
    /// Wire code: the direction code while moving, [`action::STOP`] otherwise.
    pub const fn code(self) -> i32 {
        match self {
            Function::Stop => action::STOP,
            Function::Forward => Direction::Forward.code(),
            Function::Backward => Direction::Backward.code(),
            Function::Left => Direction::Left.code(),
            Function::Right => Direction::Right.code(),
        }
    }
}

/// Drive controller for two continuous rotation wheel servos.
pub struct MotorController<W, E, C> {
    left: W,
    right: W,
    encoders: E,
    compass: C,
    config: MotorConfig,
    mode: Mode,
    function: Function,

    /// Wheel power in percent.
    power: [f32; 2],
    desired_clicks: f32,
    bias_clicks: f32,
    integral: f32,
    last_clicks: (i32, i32),

    /// Distance to cover in inches, 0 for unbounded.
    desired_distance: f32,
    traveled: f32,

    target_heading: i32,
    origin_heading: i32,
    pose: Pose,
}

impl<W, E, C> MotorController<W, E, C>
where
    W: DriveServo,
    E: WheelEncoders,
    C: Compass,
{
    pub fn new(left: W, right: W, encoders: E, compass: C) -> Self {
        Self::with_config(left, right, encoders, compass, MotorConfig::default())
    }

    pub fn with_config(
        left: W,
        right: W,
        encoders: E,
        mut compass: C,
        config: MotorConfig,
    ) -> Self {
        let heading = compass.heading();
        Self {
            left,
            right,
            encoders,
            compass,
            config,
            mode: Mode::default(),
            function: Function::Stop,
            power: [0.; 2],
            desired_clicks: 0.,
            bias_clicks: 0.,
            integral: 0.,
            last_clicks: (0, 0),
            desired_distance: 0.,
            traveled: 0.,
            target_heading: heading,
            origin_heading: heading,
            pose: Pose {
                heading,
                ..Pose::default()
            },
        }
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Compass heading when the origin was last set.
    pub fn origin_heading(&self) -> i32 {
        self.origin_heading
    }

    /// Apply a command, returning the reply owed to the sender if any.
    pub fn command(&mut self, command: Command) -> Option<CommandRecord> {
        match command {
            Command::Move {
                direction,
                velocity,
                distance,
            } => {
                self.function = match direction {
                    Direction::Forward => Function::Forward,
                    Direction::Backward => Function::Backward,
                    other => {
                        log_warn!("motor cannot move {:?}", other);
                        return None;
                    }
                };
                let speed = velocity.abs().min(self.config.max_speed);
                self.desired_clicks = self.config.clicks_per_percent * speed as f32;
                self.desired_distance = distance.max(0) as f32;
                self.traveled = 0.;
                self.bias_clicks = 0.;
                self.integral = 0.;
            }
            Command::Turn { direction, degrees } => {
                let current = self.compass.heading();
                self.target_heading = match direction {
                    Direction::Right => current + degrees,
                    Direction::Left => current - degrees,
                    Direction::Face => degrees,
                    other => {
                        log_warn!("motor cannot turn {:?}", other);
                        return None;
                    }
                }
                .rem_euclid(360);

                // Always take the shorter way round
                self.function = if heading_diff(current, self.target_heading) < 0 {
                    Function::Right
                } else {
                    Function::Left
                };
            }
            Command::Bias(bias) => self.bias_clicks = self.config.clicks_per_percent * bias as f32,
            Command::Mode(bits) => self.mode = Mode::from_bits_truncate(bits as u8),
            Command::SetPosition { x, y } => {
                let heading = self.compass.heading();
                self.pose.set_position(x as f32, y as f32, heading);
                if x == 0 && y == 0 {
                    self.origin_heading = heading;
                }
            }
            Command::GetPosition => {
                return Some(CommandRecord::reply(
                    self.function.code(),
                    self.pose.heading,
                    self.pose.position.x.round() as i32,
                    self.pose.position.y.round() as i32,
                ));
            }
            Command::GetFunction => {
                let code = self.function.code();
                return Some(CommandRecord::reply(code, code, 0, 0));
            }
            Command::Stop => self.function = Function::Stop,
            other => log_debug!("motor ignored {:?}", other),
        }
        None
    }

    /// Run one control iteration.
    pub fn step(&mut self) {
        let (left_clicks, right_clicks) = self.encoders.take_clicks();
        let heading = self.compass.heading();

        let mut distance =
            0.5 * (left_clicks + right_clicks) as f32 * self.config.inches_per_click;
        if self.function == Function::Backward {
            distance = -distance;
        }
        let heading_delta = (right_clicks - left_clicks) as f32 * self.config.degrees_per_click;
        self.pose.advance(distance, heading, heading_delta);

        if self.desired_distance > 0. {
            self.traveled += distance.abs();
            if self.traveled >= self.desired_distance {
                if matches!(self.function, Function::Forward | Function::Backward) {
                    self.function = Function::Stop;
                } else {
                    self.desired_distance = 0.;
                    self.traveled = 0.;
                }
            }
        }

        match self.function {
            Function::Forward | Function::Backward => self.drive(left_clicks, right_clicks),
            Function::Left | Function::Right => self.rotate(heading),
            Function::Stop => self.halt(),
        }
    }

    fn drive(&mut self, left_clicks: i32, right_clicks: i32) {
        let sign = if self.function == Function::Backward {
            -1
        } else {
            1
        };

        if self.mode == Mode::STRAIGHT {
            let speed = (self.desired_clicks / self.config.clicks_per_percent).round() as i32;
            self.output(sign * speed, sign * speed);
            return;
        }

        let left_delta = self.desired_clicks - left_clicks as f32;
        let right_delta = self.desired_clicks - right_clicks as f32;
        self.integral += (left_clicks - right_clicks) as f32 + self.bias_clicks;

        let mut left_error = 0.;
        let mut right_error = 0.;
        if self.mode.contains(Mode::PROPORTIONAL) {
            left_error += self.config.k_pro * left_delta;
            right_error += self.config.k_pro * right_delta;
        }
        if self.mode.contains(Mode::INTEGRAL) {
            // A positive integral means the left wheel is ahead
            let integral_error = self.config.k_int * self.integral;
            left_error -= integral_error;
            right_error += integral_error;
        }
        if self.mode.contains(Mode::DERIVATIVE) {
            let (left_last, right_last) = self.last_clicks;
            left_error -= self.config.k_drv * (left_clicks - left_last) as f32;
            right_error -= self.config.k_drv * (right_clicks - right_last) as f32;
        }
        self.last_clicks = (left_clicks, right_clicks);

        let limit = self.config.max_speed as f32;
        for (power, error) in self.power.iter_mut().zip([left_error, right_error]) {
            *power = clamp(*power + error / self.config.clicks_per_percent, -limit, limit);
        }

        let [left, right] = self.power.map(|power| power.round() as i32);
        self.output(sign * left, sign * right);
    }

    fn rotate(&mut self, heading: i32) {
        let diff = heading_diff(heading, self.target_heading);
        let turning = match self.function {
            Function::Left => diff > 0,
            Function::Right => diff < 0,
            _ => false,
        };
        if !turning {
            self.halt();
            return;
        }

        let speed = (diff.abs() / 2)
            .max(self.config.min_turn_speed)
            .min(self.config.max_speed);
        if self.function == Function::Left {
            self.output(-speed, speed);
        } else {
            self.output(speed, -speed);
        }
    }

    fn halt(&mut self) {
        self.function = Function::Stop;
        self.left.stop();
        self.right.stop();
        self.integral = 0.;
        self.power = [0.; 2];
        self.last_clicks = (0, 0);
        self.desired_distance = 0.;
        self.traveled = 0.;
    }

    fn output(&mut self, left: i32, right: i32) {
        self.left.set_speed(left);
        self.right.set_speed(right);
    }
}

impl<W, E, C, K, const TASKS: usize, const DEPTH: usize> Task<Handle<K, TASKS, DEPTH>>
    for MotorController<W, E, C>
where
    W: DriveServo,
    E: WheelEncoders,
    C: Compass,
    K: Clock<T = u32>,
{
    fn run(&mut self, event: Event<'_, Handle<K, TASKS, DEPTH>>) -> Result<(), Error> {
        let kernel = event.kernel;
        while let Some(message) = kernel.receive(event.id)? {
            let Message { source, body, .. } = message;
            match Command::try_from(body) {
                Ok(command) => {
                    if let Some(reply) = self.command(command) {
                        // A requester with a full inbox misses the reply; send logs it
                        let _ = kernel.send(
                            source,
                            event.id,
                            self.config.reply_priority,
                            SendMode::NORMAL,
                            Command::Reply(reply),
                        );
                    }
                }
                Err(e) => log_warn!("motor task {} skipped message: {}", event.id, e),
            }
        }

        self.step();

        let pause = match self.function {
            Function::Left | Function::Right => self.config.rotate_interval,
            _ => self.config.interval,
        };
        kernel.sleep(event.id, pause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimCompass, SimEncoders, SimWheel};
    use crate::kernel::tests::{leaked_clock, TestKernel};
    use crate::scheduler::{Priority, Status};

    struct Rig {
        left: SimWheel,
        right: SimWheel,
        encoders: SimEncoders,
        compass: SimCompass,
    }

    impl Rig {
        fn new(heading: i32) -> Self {
            let compass = SimCompass::default();
            compass.set(heading);
            Self {
                left: SimWheel::default(),
                right: SimWheel::default(),
                encoders: SimEncoders::default(),
                compass,
            }
        }

        fn controller(&self) -> MotorController<SimWheel, SimEncoders, SimCompass> {
            MotorController::new(
                self.left.clone(),
                self.right.clone(),
                self.encoders.clone(),
                self.compass.clone(),
            )
        }

        fn speeds(&self) -> (i32, i32) {
            (self.left.speed(), self.right.speed())
        }
    }

    fn forward(velocity: i32, distance: i32) -> Command {
        Command::Move {
            direction: Direction::Forward,
            velocity,
            distance,
        }
    }

    #[test]
    fn proportional_term_ramps_power_toward_target() {
        let rig = Rig::new(0);
        let mut motor = rig.controller();
        motor.command(forward(50, 0));
        assert_eq!(motor.function(), Function::Forward);

        rig.encoders.push(0, 0);
        motor.step();
        assert_eq!(rig.speeds(), (30, 30));
    }

    #[test]
    fn integral_term_slows_the_leading_wheel() {
        let rig = Rig::new(0);
        let mut motor = rig.controller();
        motor.command(Command::Mode(Mode::INTEGRAL.bits() as i32));
        motor.command(forward(50, 0));

        rig.encoders.push(6, 4);
        motor.step();
        let (left, right) = rig.speeds();
        assert!(left < 0, "left {}", left);
        assert!(right > 0, "right {}", right);
    }

    #[test]
    fn straight_mode_sets_speed_directly() {
        let rig = Rig::new(0);
        let mut motor = rig.controller();
        motor.command(Command::Mode(0));
        assert_eq!(motor.mode(), Mode::STRAIGHT);

        motor.command(Command::Move {
            direction: Direction::Backward,
            velocity: 150,
            distance: 0,
        });
        motor.step();
        assert_eq!(rig.speeds(), (-100, -100));
    }

    #[test]
    fn position_reply_reports_the_running_function() {
        let rig = Rig::new(0);
        let mut motor = rig.controller();
        let idle = motor.command(Command::GetPosition).unwrap();
        assert_eq!(idle.reply_function(), Some(Function::Stop.code()));

        motor.command(forward(50, 0));
        let moving = motor.command(Command::GetPosition).unwrap();
        assert_eq!(moving.reply_function(), Some(Function::Forward.code()));
        assert_eq!((moving.direction, moving.value1, moving.value2), (0, 0, 0));
    }

    #[test]
    fn move_stops_after_distance() {
        let rig = Rig::new(0);
        let mut motor = rig.controller();
        motor.command(forward(50, 2));

        // 1.3 inches per step
        rig.encoders.push(5, 5);
        rig.encoders.push(5, 5);
        motor.step();
        assert_eq!(motor.function(), Function::Forward);
        motor.step();
        assert_eq!(motor.function(), Function::Stop);
        assert_eq!(rig.speeds(), (0, 0));
        approx::assert_abs_diff_eq!(motor.pose().position.x, 2.6, epsilon = 1e-4);
    }

    #[test]
    fn rotation_steps_until_heading_is_passed() {
        let rig = Rig::new(90);
        let mut motor = rig.controller();
        motor.command(Command::Turn {
            direction: Direction::Right,
            degrees: 90,
        });
        assert_eq!(motor.function(), Function::Right);

        motor.step();
        assert_eq!(rig.speeds(), (45, -45));

        rig.compass.set(170);
        motor.step();
        assert_eq!(rig.speeds(), (10, -10));

        rig.compass.set(181);
        motor.step();
        assert_eq!(motor.function(), Function::Stop);
        assert_eq!(rig.speeds(), (0, 0));
    }

    #[test]
    fn turn_wraps_and_face_takes_the_short_way() {
        let rig = Rig::new(10);
        let mut motor = rig.controller();
        motor.command(Command::Turn {
            direction: Direction::Left,
            degrees: 30,
        });
        assert_eq!(motor.function(), Function::Left);
        assert_eq!(motor.target_heading, 340);

        motor.command(Command::Turn {
            direction: Direction::Face,
            degrees: 100,
        });
        assert_eq!(motor.function(), Function::Right);
        assert_eq!(motor.target_heading, 100);
    }

    #[test]
    fn position_requests_are_answered_through_the_kernel() {
        let rig = Rig::new(45);
        let kernel = TestKernel::new(leaked_clock());
        let handle = kernel.handle();
        let motor = handle
            .register_with(rig.controller(), Priority::High, Status::Runnable)
            .unwrap();
        let requester = handle
            .register_fn_with(|_| Ok(()), Priority::Low, Status::Held)
            .unwrap();

        handle
            .send(motor, requester, 2, SendMode::NORMAL, Command::SetPosition { x: 3, y: 4 })
            .unwrap();
        handle
            .send(motor, requester, 2, SendMode::WAIT, Command::GetPosition)
            .unwrap();
        assert_eq!(handle.status(requester), Ok(Status::Held));

        kernel.scheduler().unwrap().tick().unwrap();

        assert_eq!(handle.status(motor), Ok(Status::Sleeping));
        assert_eq!(handle.status(requester), Ok(Status::Runnable));
        let reply = handle.receive(requester).unwrap().unwrap();
        assert_eq!(reply.source, motor);
        assert_eq!(reply.priority, 1);
        assert_eq!(
            Command::try_from(reply.body),
            Ok(Command::Reply(CommandRecord::reply(Function::Stop.code(), 45, 3, 4)))
        );
    }
}
