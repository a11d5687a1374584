//! Command records passed between robot subsystems.
//!
//! [`CommandRecord`] is the fixed four-integer wire shape carried by the
//! message queues. [`Command`] is its typed form, tagged by `action`.

use crate::Error;

/// Raw command as carried in a message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandRecord {
    /// Action verb: move, turn, sweep...
    pub action: i32,
    /// Direction: left, right, forward...
    pub direction: i32,
    /// Distance, degrees, speed or angle.
    pub value1: i32,
    /// Additional parameter, where needed.
    pub value2: i32,
}

impl CommandRecord {
    pub const fn new(action: i32, direction: i32, value1: i32, value2: i32) -> Self {
        Self {
            action,
            direction,
            value1,
            value2,
        }
    }

    /// A reply from a task currently running the function `function`.
    pub const fn reply(function: i32, direction: i32, value1: i32, value2: i32) -> Self {
        Self::new(REPLY + function, direction, value1, value2)
    }

    /// The function code of the responder, if this record is a reply.
    pub const fn reply_function(&self) -> Option<i32> {
        if self.action >= REPLY {
            Some(self.action - REPLY)
        } else {
            None
        }
    }
}

/// Action codes.
pub mod action {
    pub const STOP: i32 = 10;
    pub const GET_FUNC: i32 = 11;

    pub const MOVE: i32 = 20;
    pub const TURN: i32 = 21;
    pub const BIAS: i32 = 22;
    pub const MODE: i32 = 23;
    pub const SET_POS: i32 = 24;
    pub const GET_POS: i32 = 25;

    pub const SWEEP: i32 = 30;
    pub const SCAN: i32 = 31;
    pub const PING: i32 = 32;
    pub const CHECK: i32 = 33;
    pub const AVOID: i32 = 34;
    pub const POINT: i32 = 35;
    pub const TARGET: i32 = 36;
    pub const SET_INC: i32 = 37;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Left = 0,
    Right = 1,
    Up = 2,
    Down = 3,
    Forward = 4,
    Backward = 5,
    /// Face an absolute compass heading.
    Face = 6,
}

impl Direction {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Direction::Left,
            1 => Direction::Right,
            2 => Direction::Up,
            3 => Direction::Down,
            4 => Direction::Forward,
            5 => Direction::Backward,
            6 => Direction::Face,
            _ => return None,
        })
    }

    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Which sonar target a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TargetKind {
    Current = 1,
    Closest = 2,
    Farthest = 3,
}

impl TargetKind {
    /// Unknown codes select the current reading.
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => TargetKind::Closest,
            3 => TargetKind::Farthest,
            _ => TargetKind::Current,
        }
    }
}

/// Typed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Stop whatever the handler is doing.
    Stop,
    /// Ask a handler what it is currently doing.
    GetFunction,
    /// Drive forward or backward at `velocity` percent for `distance` inches (0 = unbounded).
    Move {
        direction: Direction,
        velocity: i32,
        distance: i32,
    },
    /// Rotate left or right by `degrees`, or face the heading `degrees`.
    Turn { direction: Direction, degrees: i32 },
    /// Left/right bias in percent, making the robot swerve.
    Bias(i32),
    /// Motor control mode bits.
    Mode(i32),
    SetPosition { x: i32, y: i32 },
    GetPosition,
    /// Continuous sweep of +/- `range` degrees around centre.
    Sweep { range: i32 },
    /// Single scan of +/- `range` degrees around centre.
    Scan { range: i32 },
    Ping,
    Check,
    Avoid,
    Point { angle: i32 },
    Target(TargetKind),
    SetIncrement(i32),
    /// A reply whose fields are interpreted by the requester.
    Reply(CommandRecord),
}

/// Lowest action code of a reply, above the request ranges.
/// A reply's action is `REPLY` plus the responder's function code.
pub const REPLY: i32 = 99;

impl TryFrom<CommandRecord> for Command {
    type Error = Error;

    fn try_from(record: CommandRecord) -> Result<Self, Self::Error> {
        let direction =
            || Direction::from_code(record.direction).ok_or(Error::InvalidCommand(record));

        let command = match record.action {
            action::STOP => Command::Stop,
            action::GET_FUNC => Command::GetFunction,
            action::MOVE => Command::Move {
                direction: direction()?,
                velocity: record.value1,
                distance: record.value2,
            },
            action::TURN => Command::Turn {
                direction: direction()?,
                degrees: record.value1,
            },
            action::BIAS => Command::Bias(record.value1),
            action::MODE => Command::Mode(record.value1),
            action::SET_POS => Command::SetPosition {
                x: record.value1,
                y: record.value2,
            },
            action::GET_POS => Command::GetPosition,
            action::SWEEP => Command::Sweep {
                range: record.value1,
            },
            action::SCAN => Command::Scan {
                range: record.value1,
            },
            action::PING => Command::Ping,
            action::CHECK => Command::Check,
            action::AVOID => Command::Avoid,
            action::POINT => Command::Point {
                angle: record.value1,
            },
            action::TARGET => Command::Target(TargetKind::from_code(record.value1)),
            action::SET_INC => Command::SetIncrement(record.value1),
            code if code >= REPLY => Command::Reply(record),
            _ => return Err(Error::InvalidCommand(record)),
        };
        Ok(command)
    }
}

impl From<Command> for CommandRecord {
    fn from(command: Command) -> Self {
        match command {
            Command::Stop => CommandRecord::new(action::STOP, 0, 0, 0),
            Command::GetFunction => CommandRecord::new(action::GET_FUNC, 0, 0, 0),
            Command::Move {
                direction,
                velocity,
                distance,
            } => CommandRecord::new(action::MOVE, direction.code(), velocity, distance),
            Command::Turn { direction, degrees } => {
                CommandRecord::new(action::TURN, direction.code(), degrees, 0)
            }
            Command::Bias(bias) => CommandRecord::new(action::BIAS, 0, bias, 0),
            Command::Mode(mode) => CommandRecord::new(action::MODE, 0, mode, 0),
            Command::SetPosition { x, y } => CommandRecord::new(action::SET_POS, 0, x, y),
            Command::GetPosition => CommandRecord::new(action::GET_POS, 0, 0, 0),
            Command::Sweep { range } => CommandRecord::new(action::SWEEP, 0, range, 0),
            Command::Scan { range } => CommandRecord::new(action::SCAN, 0, range, 0),
            Command::Ping => CommandRecord::new(action::PING, 0, 0, 0),
            Command::Check => CommandRecord::new(action::CHECK, 0, 0, 0),
            Command::Avoid => CommandRecord::new(action::AVOID, 0, 0, 0),
            Command::Point { angle } => CommandRecord::new(action::POINT, 0, angle, 0),
            Command::Target(kind) => CommandRecord::new(action::TARGET, 0, kind as i32, 0),
            Command::SetIncrement(inc) => CommandRecord::new(action::SET_INC, 0, inc, 0),
            Command::Reply(record) => CommandRecord {
                action: record.action.max(REPLY),
                ..record
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_forward_four() {
        let record = CommandRecord::new(action::MOVE, Direction::Forward.code(), 4, 0);
        assert_eq!(
            Command::try_from(record),
            Ok(Command::Move {
                direction: Direction::Forward,
                velocity: 4,
                distance: 0
            })
        );
    }

    #[test]
    fn turn_right_ninety() {
        let command = Command::Turn {
            direction: Direction::Right,
            degrees: 90,
        };
        let record = CommandRecord::from(command);
        assert_eq!(record, CommandRecord::new(21, 1, 90, 0));
        assert_eq!(Command::try_from(record), Ok(command));
    }

    #[test]
    fn every_action_survives_the_wire() {
        let commands = [
            Command::Stop,
            Command::GetFunction,
            Command::Bias(-3),
            Command::Mode(0x07),
            Command::SetPosition { x: 10, y: -4 },
            Command::GetPosition,
            Command::Sweep { range: 45 },
            Command::Scan { range: 90 },
            Command::Ping,
            Command::Check,
            Command::Avoid,
            Command::Point { angle: 120 },
            Command::Target(TargetKind::Farthest),
            Command::SetIncrement(2),
            Command::Reply(CommandRecord::new(REPLY, 1, 2, 3)),
            Command::Reply(CommandRecord::reply(action::STOP, 1, 2, 3)),
        ];
        for command in commands {
            assert_eq!(Command::try_from(CommandRecord::from(command)), Ok(command));
        }
    }

    #[test]
    fn unknown_action_and_direction_are_rejected() {
        let bad_action = CommandRecord::new(12, 0, 0, 0);
        assert_eq!(
            Command::try_from(bad_action),
            Err(Error::InvalidCommand(bad_action))
        );

        let bad_direction = CommandRecord::new(action::MOVE, 42, 50, 0);
        assert_eq!(
            Command::try_from(bad_direction),
            Err(Error::InvalidCommand(bad_direction))
        );
    }

    #[test]
    fn replies_carry_the_responder_function() {
        let reply = CommandRecord::reply(action::SWEEP, 90, 40, 0);
        assert_eq!(reply.action, REPLY + action::SWEEP);
        assert_eq!(reply.reply_function(), Some(action::SWEEP));
        assert_eq!(Command::try_from(reply), Ok(Command::Reply(reply)));
        assert_eq!(CommandRecord::from(Command::Ping).reply_function(), None);
    }
}
