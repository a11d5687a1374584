use nalgebra::{Rotation2, Vector2};

use crate::hal::heading_diff;

/// Dead reckoning position of the robot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position in inches from the origin.
    pub position: Vector2<f32>,

    /// Heading relative to the origin, integrated from wheel clicks.
    pub relative_heading: f32,

    /// Last compass heading.
    pub heading: i32,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector2::zeros(),
            relative_heading: 0.,
            heading: 0,
        }
    }
}

impl Pose {
    /// Advance by `distance` inches along the heading change since the last update.
    pub fn advance(&mut self, distance: f32, heading: i32, heading_delta: f32) {
        let turn = heading_diff(heading, self.heading) as f32;
        let step = Rotation2::new(turn.to_radians()) * Vector2::new(distance, 0.);

        self.position += step;
        self.heading = heading;
        self.relative_heading += heading_delta;
    }

    /// Move to `(x, y)`. Moving to the origin also resets the relative heading.
    pub fn set_position(&mut self, x: f32, y: f32, heading: i32) {
        self.position = Vector2::new(x, y);
        self.heading = heading;
        if x == 0. && y == 0. {
            self.relative_heading = 0.;
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn straight_line_advances_along_x() {
        let mut pose = Pose::default();
        pose.advance(2.6, 0, 0.);
        pose.advance(2.6, 0, 0.);
        assert_abs_diff_eq!(pose.position.x, 5.2, epsilon = 1e-5);
        assert_abs_diff_eq!(pose.position.y, 0., epsilon = 1e-5);
    }

    #[test]
    fn heading_change_rotates_the_step() {
        let mut pose = Pose::default();
        pose.advance(1., 90, 13.752);
        assert_abs_diff_eq!(pose.position.x, 0., epsilon = 1e-5);
        assert_abs_diff_eq!(pose.position.y, 1., epsilon = 1e-5);
        assert_abs_diff_eq!(pose.relative_heading, 13.752, epsilon = 1e-5);
        assert_eq!(pose.heading, 90);
    }

    #[test]
    fn origin_resets_relative_heading() {
        let mut pose = Pose::default();
        pose.advance(1., 0, 40.);
        pose.set_position(3., 4., 10);
        assert_abs_diff_eq!(pose.relative_heading, 40.);
        pose.set_position(0., 0., 10);
        assert_abs_diff_eq!(pose.relative_heading, 0.);
    }
}
