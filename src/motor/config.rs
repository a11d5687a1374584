use bitflags::bitflags;
use embedded_time::duration::Milliseconds;

bitflags! {
    /// Which terms of the wheel controller are active.
    ///
    /// With no bits set the wheels are driven open loop at the requested speed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: u8 {
        const PROPORTIONAL = 0x01;
        const INTEGRAL = 0x02;
        const DERIVATIVE = 0x04;
    }
}

impl Mode {
    /// Open loop.
    pub const STRAIGHT: Self = Self::empty();
    pub const PI: Self = Self::PROPORTIONAL.union(Self::INTEGRAL);
    pub const PD: Self = Self::PROPORTIONAL.union(Self::DERIVATIVE);
    pub const PID: Self = Self::all();
}

impl Default for Mode {
    fn default() -> Self {
        Self::PID
    }
}

/// Motor controller constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorConfig {
    /// Time between control iterations.
    pub interval: Milliseconds<u32>,

    /// Time between compass readings while rotating.
    pub rotate_interval: Milliseconds<u32>,

    pub k_pro: f32,
    pub k_int: f32,
    pub k_drv: f32,

    /// Encoder clicks per control interval for each percent of speed.
    pub clicks_per_percent: f32,

    /// Speed limit in percent.
    pub max_speed: i32,

    /// Slowest rotation speed in percent.
    pub min_turn_speed: i32,

    pub inches_per_click: f32,

    /// Heading change per click of wheel difference.
    pub degrees_per_click: f32,

    /// Priority of replies sent to requesters.
    pub reply_priority: u8,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            interval: Milliseconds(250),
            rotate_interval: Milliseconds(8),
            k_pro: 0.6,
            k_int: 0.3,
            k_drv: 0.1,
            clicks_per_percent: 0.09,
            max_speed: 100,
            min_turn_speed: 10,
            inches_per_click: 0.26,
            degrees_per_click: 3.438,
            reply_priority: 1,
        }
    }
}

impl MotorConfig {
    /// Builder method to set the gains and return `self`
    pub fn with_gains(mut self, k_pro: f32, k_int: f32, k_drv: f32) -> Self {
        self.k_pro = k_pro;
        self.k_int = k_int;
        self.k_drv = k_drv;
        self
    }

    /// Builder method to set `interval` and return `self`
    pub fn with_interval(mut self, interval: Milliseconds<u32>) -> Self {
        self.interval = interval;
        self
    }
}
