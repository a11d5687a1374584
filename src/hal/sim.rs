//! Simulated robot hardware shared between a task and its test.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Compass, DriveServo, HeadServo, RangeFinder, WheelEncoders};

#[derive(Clone, Default)]
pub struct SimWheel(pub Arc<AtomicI32>);

impl SimWheel {
    pub fn speed(&self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl DriveServo for SimWheel {
    fn set_speed(&mut self, percent: i32) {
        self.0.store(percent, Ordering::SeqCst);
    }
}

/// Encoders replaying queued `(left, right)` counts, then reading zero.
#[derive(Clone, Default)]
pub struct SimEncoders(pub Arc<Mutex<VecDeque<(i32, i32)>>>);

impl SimEncoders {
    pub fn push(&self, left: i32, right: i32) {
        self.0.lock().push_back((left, right));
    }
}

impl WheelEncoders for SimEncoders {
    fn take_clicks(&mut self) -> (i32, i32) {
        self.0.lock().pop_front().unwrap_or((0, 0))
    }
}

#[derive(Clone, Default)]
pub struct SimCompass(pub Arc<AtomicI32>);

impl SimCompass {
    pub fn set(&self, heading: i32) {
        self.0.store(heading, Ordering::SeqCst);
    }
}

impl Compass for SimCompass {
    fn heading(&mut self) -> i32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Head servo and range finder looking at a fixed scene.
#[derive(Clone)]
pub struct SimHead {
    angle: Arc<AtomicI32>,
    moves: Arc<AtomicI32>,
    scene: fn(i32) -> i32,
}

impl SimHead {
    /// `scene` maps a head angle to the distance seen there.
    pub fn new(scene: fn(i32) -> i32) -> Self {
        Self {
            angle: Arc::new(AtomicI32::new(90)),
            moves: Arc::default(),
            scene,
        }
    }

    pub fn angle(&self) -> i32 {
        self.angle.load(Ordering::SeqCst)
    }

    pub fn moves(&self) -> i32 {
        self.moves.load(Ordering::SeqCst)
    }
}

impl HeadServo for SimHead {
    fn point(&mut self, angle: i32) {
        self.angle.store(angle, Ordering::SeqCst);
        self.moves.fetch_add(1, Ordering::SeqCst);
    }

    fn relax(&mut self) {}
}

impl RangeFinder for SimHead {
    fn ping_cm(&mut self) -> i32 {
        (self.scene)(self.angle())
    }
}
