//! Planar joint geometry.

use anyhow::{anyhow, Result};

/// A 2-D point in normalized image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Unsigned angle in degrees at vertex `b` between the rays `b→a` and `b→c`.
///
/// The result is always in `[0, 180]`. If either ray has zero length (`a == b`
/// or `c == b`) its direction is undefined and the angle is reported as 0°.
/// Non-finite coordinates are rejected instead of producing NaN, so a bad
/// landmark can never slip past a threshold comparison.
pub fn angle_at(a: Point, b: Point, c: Point) -> Result<f32> {
    if !(a.is_finite() && b.is_finite() && c.is_finite()) {
        return Err(anyhow!(
            "non-finite coordinate in angle ({:?}, {:?}, {:?})",
            a,
            b,
            c
        ));
    }
    if a == b || c == b {
        return Ok(0.0);
    }

    let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let mut angle = radians.to_degrees().abs();
    if angle > 180.0 {
        angle = 360.0 - angle;
    }
    Ok(angle)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    #[test]
    fn collinear_points_are_straight() -> Result<()> {
        let angle = angle_at(
            Point::new(0.1, 0.2),
            Point::new(0.3, 0.4),
            Point::new(0.5, 0.6),
        )?;
        assert!((angle - 180.0).abs() < EPS, "got {}", angle);

        let vertical = angle_at(
            Point::new(0.5, 0.1),
            Point::new(0.5, 0.5),
            Point::new(0.5, 0.9),
        )?;
        assert!((vertical - 180.0).abs() < EPS, "got {}", vertical);
        Ok(())
    }

    #[test]
    fn right_angle() -> Result<()> {
        let angle = angle_at(Point::new(0.0, 1.0), Point::new(0.0, 0.0), Point::new(1.0, 0.0))?;
        assert!((angle - 90.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn symmetric_under_endpoint_swap() -> Result<()> {
        let cases = [
            (Point::new(0.2, 0.9), Point::new(0.4, 0.4), Point::new(0.9, 0.3)),
            (Point::new(-1.0, 0.1), Point::new(0.0, 0.0), Point::new(-1.0, -0.1)),
            (Point::new(0.7, 0.2), Point::new(0.5, 0.5), Point::new(0.6, 0.9)),
        ];
        for (a, b, c) in cases {
            let forward = angle_at(a, b, c)?;
            let reverse = angle_at(c, b, a)?;
            assert!((forward - reverse).abs() < EPS);
            assert!((0.0..=180.0).contains(&forward));
        }
        Ok(())
    }

    #[test]
    fn reflex_angles_fold_back() -> Result<()> {
        // atan2 difference here is 270°, which must fold to 90°.
        let angle = angle_at(Point::new(0.0, -1.0), Point::new(0.0, 0.0), Point::new(-1.0, 0.0))?;
        assert!((angle - 90.0).abs() < EPS);
        Ok(())
    }

    #[test]
    fn coincident_points_are_zero() -> Result<()> {
        let b = Point::new(0.5, 0.5);
        assert_eq!(angle_at(b, b, Point::new(0.9, 0.1))?, 0.0);
        assert_eq!(angle_at(Point::new(0.9, 0.1), b, b)?, 0.0);
        Ok(())
    }

    #[test]
    fn non_finite_is_an_error() {
        let nan = Point::new(f32::NAN, 0.5);
        assert!(angle_at(nan, Point::new(0.0, 0.0), Point::new(1.0, 0.0)).is_err());
        let inf = Point::new(0.0, f32::INFINITY);
        assert!(angle_at(Point::new(1.0, 0.0), inf, Point::new(1.0, 0.0)).is_err());
    }
}
