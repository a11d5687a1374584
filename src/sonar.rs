//! Ultrasonic range finder on a panning head.
//!
//! Head angles run from 0 (far right) through 90 (straight ahead) to 180 (far left).

use embedded_time::{duration::Milliseconds, Clock};

use crate::hal::{HeadServo, RangeFinder};
use crate::ipc::{action, Command, CommandRecord, Message, SendMode, TargetKind};
use crate::kernel::Handle;
use crate::scheduler::{Event, Task};
use crate::{log_debug, log_warn, Error};

/// Sonar controller constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SonarConfig {
    /// Time between iterations while idle or pinging in place.
    pub interval: Milliseconds<u32>,

    /// Time between head steps while sweeping or checking.
    pub step_interval: Milliseconds<u32>,

    /// Degrees per sweep step.
    pub increment: i32,

    /// Widest sweep either side of centre.
    pub max_range: i32,

    /// Distance jump marking the edge of an object, in cm.
    pub edge_threshold: i32,

    /// A side closer than this is tracked between checks, in cm.
    pub clearance: i32,

    /// Distance from the head pivot to the robot's turning centre, in cm.
    pub head_offset: f32,

    pub reply_priority: u8,
}

impl Default for SonarConfig {
    fn default() -> Self {
        Self {
            interval: Milliseconds(250),
            step_interval: Milliseconds(25),
            increment: 5,
            max_range: 90,
            edge_threshold: 10,
            clearance: 15,
            head_offset: 6.5,
            reply_priority: 1,
        }
    }
}

/// A distance seen in a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    pub direction: i32,
    pub distance: i32,
}

/// Result of the last clearance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clearance {
    /// Change in right side distance since the previous check, 0 when clear.
    pub right: i32,
    /// Change in left side distance since the previous check, 0 when clear.
    pub left: i32,
    /// Distance straight ahead.
    pub center: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CheckPhase {
    Right,
    Left,
    Center,
}

/// What the sonar is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Function {
    #[default]
    Stop,
    /// Pan back and forth continuously.
    Sweep,
    /// Pan once, then stop.
    Scan,
    /// Ping in place.
    Ping,
    Check(CheckPhase),
    Point(i32),
}

impl Function {
    pub const fn code(self) -> i32 {
        match self {
            Function::Stop => action::STOP,
            Function::Sweep => action::SWEEP,
            Function::Scan => action::SCAN,
            Function::Ping => action::PING,
            Function::Check(_) => action::CHECK,
            Function::Point(_) => action::POINT,
        }
    }
}

pub struct SonarController<H, R> {
    head: H,
    ranger: R,
    config: SonarConfig,
    function: Function,
    increment: i32,
    pan: (i32, i32),
    /// Next sweep angle, `None` at the start of a pass.
    cursor: Option<i32>,
    current: Reading,
    closest: Reading,
    farthest: Reading,
    last_check: Clearance,
    clearance: Clearance,
}

impl<H, R> SonarController<H, R>
where
    H: HeadServo,
    R: RangeFinder,
{
    pub fn new(head: H, ranger: R) -> Self {
        Self::with_config(head, ranger, SonarConfig::default())
    }

    pub fn with_config(mut head: H, ranger: R, config: SonarConfig) -> Self {
        head.point(90);
        Self {
            head,
            ranger,
            config,
            function: Function::Stop,
            increment: config.increment,
            pan: (0, 180),
            cursor: None,
            current: Reading {
                direction: 90,
                distance: 0,
            },
            closest: Reading::default(),
            farthest: Reading::default(),
            last_check: Clearance::default(),
            clearance: Clearance::default(),
        }
    }

    pub fn function(&self) -> Function {
        self.function
    }

    pub fn clearance(&self) -> Clearance {
        self.clearance
    }

    pub fn target(&self, kind: TargetKind) -> Reading {
        match kind {
            TargetKind::Closest => self.closest,
            TargetKind::Farthest => self.farthest,
            TargetKind::Current => self.current,
        }
    }

    /// Apply a command, returning the reply owed to the sender if any.
    pub fn command(&mut self, command: Command) -> Option<CommandRecord> {
        match command {
            Command::Sweep { range } | Command::Scan { range } => {
                let range = range.clamp(0, self.config.max_range);
                self.pan = (90 - range, 90 + range);
                self.cursor = None;
                self.function = if matches!(command, Command::Scan { .. }) {
                    Function::Scan
                } else {
                    Function::Sweep
                };
            }
            Command::Ping => self.function = Function::Ping,
            Command::Check | Command::Avoid => self.function = Function::Check(CheckPhase::Right),
            Command::Point { angle } => self.function = Function::Point(angle.clamp(0, 180)),
            Command::SetIncrement(increment) => self.increment = increment.max(1),
            Command::Target(kind) => {
                let reading = self.target(kind);
                return Some(CommandRecord::reply(
                    self.function.code(),
                    reading.direction,
                    reading.distance,
                    0,
                ));
            }
            Command::GetFunction => {
                let code = self.function.code();
                return Some(CommandRecord::reply(code, code, 0, 0));
            }
            Command::Stop => {
                self.function = Function::Stop;
                self.head.relax();
            }
            other => log_debug!("sonar ignored {:?}", other),
        }
        None
    }

    /// Run one head step.
    pub fn step(&mut self) {
        match self.function {
            Function::Sweep | Function::Scan => self.sweep_step(),
            Function::Ping => {
                self.ping();
            }
            Function::Check(phase) => self.check_step(phase),
            Function::Point(angle) => {
                self.point_at(angle);
                self.function = Function::Stop;
            }
            Function::Stop => {}
        }
    }

    fn sweep_step(&mut self) {
        let angle = match self.cursor {
            Some(angle) => angle,
            None => {
                self.closest = Reading {
                    direction: self.closest.direction,
                    distance: 1000,
                };
                self.farthest = Reading {
                    direction: self.farthest.direction,
                    distance: 0,
                };
                self.pan.0
            }
        };

        let reading = self.point_at(angle);
        if reading.distance < self.closest.distance {
            self.closest = reading;
        }
        if reading.distance > self.farthest.distance {
            self.farthest = reading;
        }

        let next = angle + self.increment;
        if next > self.pan.1 {
            self.cursor = None;
            if self.function == Function::Scan {
                self.function = Function::Stop;
            }
        } else {
            self.cursor = Some(next);
        }
    }

    fn check_step(&mut self, phase: CheckPhase) {
        let clearance = self.config.clearance;
        let slope = |distance: i32, last: i32| {
            if distance < clearance {
                distance - last
            } else {
                0
            }
        };

        self.function = match phase {
            CheckPhase::Right => {
                let distance = self.point_at(0).distance;
                self.clearance.right = slope(distance, self.last_check.right);
                self.last_check.right = distance;
                Function::Check(CheckPhase::Left)
            }
            CheckPhase::Left => {
                let distance = self.point_at(180).distance;
                self.clearance.left = slope(distance, self.last_check.left);
                self.last_check.left = distance;
                Function::Check(CheckPhase::Center)
            }
            CheckPhase::Center => {
                self.clearance.center = self.point_at(90).distance;
                Function::Stop
            }
        };
    }

    fn ping(&mut self) -> Reading {
        self.current.distance = self.ranger.ping_cm();
        self.current
    }

    /// Turn the head to `angle` and ping.
    pub fn point_at(&mut self, angle: i32) -> Reading {
        if angle != self.current.direction {
            self.head.point(angle);
            self.current.direction = angle;
        }
        self.ping()
    }

    /// Scan left from a target one degree at a time until its edge.
    ///
    /// Returns 180 when no edge is found.
    pub fn find_left_edge(&mut self, kind: TargetKind) -> i32 {
        self.find_edge(kind, 1)
    }

    /// Scan right from a target one degree at a time until its edge.
    ///
    /// Returns 0 when no edge is found.
    pub fn find_right_edge(&mut self, kind: TargetKind) -> i32 {
        self.find_edge(kind, -1)
    }

    fn find_edge(&mut self, kind: TargetKind, step: i32) -> i32 {
        let target = self.target(kind);
        let threshold = self.config.edge_threshold;
        let limit = if step > 0 { 180 } else { 0 };
        let mut angle = target.direction;

        while (step > 0 && angle < limit) || (step < 0 && angle > limit) {
            angle += step;
            let distance = self.point_at(angle).distance;
            let edge = match kind {
                TargetKind::Farthest => distance <= target.distance - threshold,
                TargetKind::Closest | TargetKind::Current => {
                    distance >= target.distance + threshold
                }
            };
            if edge {
                return angle;
            }
        }
        angle
    }

    /// Find both edges of a target and return the robot turn towards its centre.
    ///
    /// Positive turns right, negative turns left.
    pub fn find_target(&mut self, kind: TargetKind) -> i32 {
        let left = self.find_left_edge(kind);
        let right = self.find_right_edge(kind);
        let center = (left + right) / 2;
        let distance = self.point_at(center).distance;
        log_debug!("target edges {} {} at {} cm", left, right, distance);
        target_bearing(center, distance, self.config.head_offset)
    }
}

/// Robot turn in degrees that faces an object seen at head `angle` and `distance` cm.
///
/// `head_offset` is the distance from the head pivot forward of the turning centre.
pub fn target_bearing(angle: i32, distance: i32, head_offset: f32) -> i32 {
    let (sin, cos) = (angle as f32).to_radians().sin_cos();
    let distance = distance as f32;
    let num = distance * sin + head_offset;
    let den = distance * cos;

    let bearing = (num / den).atan().to_degrees();
    let bearing = if bearing > 0. {
        90. - bearing
    } else if bearing < 0. {
        -(90. + bearing)
    } else {
        bearing
    };
    bearing as i32
}

impl<H, R, K, const TASKS: usize, const DEPTH: usize> Task<Handle<K, TASKS, DEPTH>>
    for SonarController<H, R>
where
    H: HeadServo,
    R: RangeFinder,
    K: Clock<T = u32>,
{
    fn run(&mut self, event: Event<'_, Handle<K, TASKS, DEPTH>>) -> Result<(), Error> {
        let kernel = event.kernel;
        while let Some(Message { source, body, .. }) = kernel.receive(event.id)? {
            let command = match Command::try_from(body) {
                Ok(command) => command,
                Err(e) => {
                    log_warn!("sonar task {} skipped message: {}", event.id, e);
                    continue;
                }
            };
            if let Some(reply) = self.command(command) {
                // Dropped replies are logged by send
                let _ = kernel.send(
                    source,
                    event.id,
                    self.config.reply_priority,
                    SendMode::NORMAL,
                    Command::Reply(reply),
                );
            }
        }

        self.step();

        let pause = match self.function {
            Function::Sweep | Function::Scan | Function::Check(_) => self.config.step_interval,
            _ => self.config.interval,
        };
        kernel.sleep(event.id, pause)
    }
}
