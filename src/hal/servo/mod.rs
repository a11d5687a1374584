mod builder;

pub use builder::Builder;
use embedded_hal::PwmPin;
use num_traits::{clamp, NumCast, ToPrimitive};

use super::{DriveServo, HeadServo};

/// A continuous rotation servo driven by a 50 Hz PWM pin.
///
/// Speed maps linearly onto `neutral +/- span`.
pub struct ContinuousServo<P: PwmPin> {
    neutral: P::Duty,
    span: P::Duty,
    reversed: bool,
    pin: P,
}

impl<P> ContinuousServo<P>
where
    P: PwmPin,
    P::Duty: NumCast + ToPrimitive + Copy,
{
    pub fn new(neutral: P::Duty, span: P::Duty, reversed: bool, pin: P) -> Self {
        let mut servo = Self {
            neutral,
            span,
            reversed,
            pin,
        };
        servo.set_speed(0);
        servo
    }

    pub fn builder() -> Builder<P::Duty> {
        Builder::default()
    }

    /// Release the pin.
    pub fn free(self) -> P {
        self.pin
    }

    fn duty(&self, percent: i32) -> Option<P::Duty> {
        let percent = clamp(percent, -100, 100) as f32;
        let percent = if self.reversed { -percent } else { percent };
        let duty = self.neutral.to_f32()? + self.span.to_f32()? * percent / 100.;
        NumCast::from(duty.max(0.))
    }
}

impl<P> DriveServo for ContinuousServo<P>
where
    P: PwmPin,
    P::Duty: NumCast + ToPrimitive + Copy,
{
    fn set_speed(&mut self, percent: i32) {
        if let Some(duty) = self.duty(percent) {
            self.pin.set_duty(duty);
        }
    }
}

/// A positional servo sweeping 0 to 180 degrees, used to pan the head.
pub struct PositionServo<P: PwmPin> {
    min: P::Duty,
    max: P::Duty,
    pin: P,
}

impl<P> PositionServo<P>
where
    P: PwmPin,
    P::Duty: NumCast + ToPrimitive + Copy,
{
    /// `min` is the duty at 0 degrees and `max` the duty at 180 degrees.
    pub fn new(min: P::Duty, max: P::Duty, pin: P) -> Self {
        Self { min, max, pin }
    }

    fn duty(&self, angle: i32) -> Option<P::Duty> {
        let min = self.min.to_f32()?;
        let max = self.max.to_f32()?;
        let angle = clamp(angle, 0, 180) as f32;
        NumCast::from(min + (max - min) * angle / 180.)
    }
}

impl<P> HeadServo for PositionServo<P>
where
    P: PwmPin,
    P::Duty: NumCast + ToPrimitive + Copy,
{
    fn point(&mut self, angle: i32) {
        if let Some(duty) = self.duty(angle) {
            self.pin.enable();
            self.pin.set_duty(duty);
        }
    }

    fn relax(&mut self) {
        self.pin.disable();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// PWM pin recording the last duty, with a 20 000 step period.
    #[derive(Default)]
    pub struct MockPin {
        pub duty: u16,
        pub enabled: bool,
    }

    impl PwmPin for MockPin {
        type Duty = u16;

        fn disable(&mut self) {
            self.enabled = false;
        }

        fn enable(&mut self) {
            self.enabled = true;
        }

        fn get_duty(&self) -> u16 {
            self.duty
        }

        fn get_max_duty(&self) -> u16 {
            20_000
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty = duty;
        }
    }

    #[test]
    fn continuous_servo_maps_percent_onto_span() {
        let mut servo = ContinuousServo::<MockPin>::builder().build(MockPin::default());
        assert_eq!(servo.pin.duty, 1_500);

        servo.set_speed(100);
        assert_eq!(servo.pin.duty, 1_700);
        servo.set_speed(-50);
        assert_eq!(servo.pin.duty, 1_400);
        servo.set_speed(250);
        assert_eq!(servo.pin.duty, 1_700);
        servo.stop();
        assert_eq!(servo.pin.duty, 1_500);
    }

    #[test]
    fn reversed_servo_mirrors_direction() {
        let mut servo = ContinuousServo::<MockPin>::builder()
            .reversed()
            .build(MockPin::default());
        servo.set_speed(100);
        assert_eq!(servo.pin.duty, 1_300);
    }

    #[test]
    fn position_servo_maps_angle() {
        let mut head = PositionServo::new(500, 2_500, MockPin::default());
        head.point(90);
        assert_eq!(head.pin.duty, 1_500);
        assert!(head.pin.enabled);
        head.point(200);
        assert_eq!(head.pin.duty, 2_500);
        head.relax();
        assert!(!head.pin.enabled);
    }
}
