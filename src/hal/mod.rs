//! Hardware abstraction layer.
//!
//! The motor and sonar tasks only talk to hardware through these traits.

pub mod servo;
pub use servo::{Builder, ContinuousServo, PositionServo};

#[cfg(test)]
pub(crate) mod sim;

/// A continuous rotation drive servo.
pub trait DriveServo {
    /// Output a speed in percent, in `[-100, 100]`. Positive drives the robot forward.
    fn set_speed(&mut self, percent: i32);

    fn stop(&mut self) {
        self.set_speed(0)
    }
}

impl<T> DriveServo for &mut T
where
    T: DriveServo + ?Sized,
{
    fn set_speed(&mut self, percent: i32) {
        (**self).set_speed(percent)
    }
}

/// Quadrature-less wheel encoders counting edges.
pub trait WheelEncoders {
    /// Return the `(left, right)` edge counts since the last call and reset them.
    fn take_clicks(&mut self) -> (i32, i32);
}

impl<T> WheelEncoders for &mut T
where
    T: WheelEncoders + ?Sized,
{
    fn take_clicks(&mut self) -> (i32, i32) {
        (**self).take_clicks()
    }
}

pub trait Compass {
    /// Current heading in degrees, `0..360`.
    fn heading(&mut self) -> i32;
}

impl<T> Compass for &mut T
where
    T: Compass + ?Sized,
{
    fn heading(&mut self) -> i32 {
        (**self).heading()
    }
}

/// The servo panning the range finder.
pub trait HeadServo {
    /// Face `angle` degrees, where 0 is far right, 90 straight ahead and 180 far left.
    fn point(&mut self, angle: i32);

    /// Stop holding position.
    fn relax(&mut self);
}

impl<T> HeadServo for &mut T
where
    T: HeadServo + ?Sized,
{
    fn point(&mut self, angle: i32) {
        (**self).point(angle)
    }

    fn relax(&mut self) {
        (**self).relax()
    }
}

pub trait RangeFinder {
    /// Distance to the nearest echo in centimetres.
    fn ping_cm(&mut self) -> i32;
}

impl<T> RangeFinder for &mut T
where
    T: RangeFinder + ?Sized,
{
    fn ping_cm(&mut self) -> i32 {
        (**self).ping_cm()
    }
}

/// Signed shortest difference from compass heading `new` to `current`, in `[-180, 180]`.
///
/// Positive means `current` is clockwise of `new`, so turning left closes the gap.
pub fn heading_diff(current: i32, new: i32) -> i32 {
    let diff = current - new;
    if diff > 180 {
        diff - 360
    } else if diff < -180 {
        diff + 360
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::heading_diff;

    #[test]
    fn heading_diff_takes_the_short_way_round() {
        assert_eq!(heading_diff(90, 90), 0);
        assert_eq!(heading_diff(100, 80), 20);
        assert_eq!(heading_diff(80, 100), -20);
        assert_eq!(heading_diff(350, 10), -20);
        assert_eq!(heading_diff(10, 350), 20);
        assert_eq!(heading_diff(270, 90), 180);
        assert_eq!(heading_diff(90, 270), -180);
    }
}
