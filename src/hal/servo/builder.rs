use embedded_hal::PwmPin;
use num_traits::{NumCast, ToPrimitive};

use super::ContinuousServo;

/// Builder for a [`ContinuousServo`].
///
/// Unset pulse widths are derived from the pin's 20 ms period:
/// 1.5 ms neutral and a 0.2 ms span.
pub struct Builder<T> {
    neutral: Option<T>,
    span: Option<T>,
    reversed: bool,
}

impl<T> Default for Builder<T> {
    fn default() -> Self {
        Self {
            neutral: None,
            span: None,
            reversed: false,
        }
    }
}

impl<T> Builder<T> {
    pub fn neutral(mut self, neutral: T) -> Self {
        self.neutral = Some(neutral);
        self
    }

    pub fn span(mut self, span: T) -> Self {
        self.span = Some(span);
        self
    }

    /// Invert the direction, for a servo mounted mirrored on the chassis.
    pub fn reversed(mut self) -> Self {
        self.reversed = true;
        self
    }

    pub fn build<P>(self, pin: P) -> ContinuousServo<P>
    where
        P: PwmPin<Duty = T>,
        T: NumCast + ToPrimitive + Copy,
    {
        let period = pin.get_max_duty();
        let neutral = self.neutral.unwrap_or_else(|| fraction(period, 3., 40.));
        let span = self.span.unwrap_or_else(|| fraction(period, 1., 100.));
        ContinuousServo::new(neutral, span, self.reversed, pin)
    }
}

fn fraction<T>(period: T, numerator: f32, denominator: f32) -> T
where
    T: NumCast + ToPrimitive + Copy,
{
    period
        .to_f32()
        .and_then(|period| NumCast::from(period * numerator / denominator))
        .unwrap_or(period)
}
