//! # robot-mtos
//! A cooperative multitasking kernel with priority message queues for small robots.
//!
//! # Kernel
//! [`Kernel`] owns the task registry and one inbox per task.
//! [`Handle`] is the cloneable task control and messaging surface.
//!
//! [`scheduler`] contains the weighted round-robin loop that dispatches tasks.
//!
//! [`ipc`] contains the message queues and the [`Command`](ipc::Command) records they carry.
//!
//! # Robot components
//! [`hal`] contains the hardware abstraction layer.
//!
//! [`MotorController`](motor::MotorController) runs PID wheel control,
//! compass rotation and dead reckoning as a kernel task.
//!
//! [`SonarController`](sonar::SonarController) runs the ultrasonic sweep,
//! clearance check and target tracking as a kernel task.

pub mod config;
pub use config::{FaultPolicy, KernelConfig};

mod error;
pub use error::Error;

pub mod hal;

pub mod ipc;
pub use ipc::{Command, CommandRecord, Message, SendMode};

pub mod kernel;
pub use kernel::{Handle, Kernel};

mod logging;

pub mod motor;

pub mod scheduler;
pub use scheduler::{Event, Priority, Scheduler, Status, StatusRequest, Task, TaskId};

pub mod sonar;
