//! XY-planar circle with three-point construction.

use serde::{Deserialize, Serialize};

use super::{is_zero, less_than, CIRCLE_GEOMETRY_EPSILON};
use super::Point;

/// A circle in the XY plane. The center's `z` is carried from the
/// defining points so witness points snapped onto the circle stay in
/// the toolpath's plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    /// Create a circle from a center and radius.
    #[inline]
    pub const fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Construct the circle through three points in the XY plane.
    ///
    /// Fails when the points are (near-)collinear: the determinant
    /// `a = x1(y2-y3) - y1(x2-x3) + x2*y3 - x3*y2` vanishes under the
    /// structural tolerance. The center's `z` is taken from `p1`.
    pub fn try_from_three_points(p1: &Point, p2: &Point, p3: &Point) -> Option<Circle> {
        let (x1, y1) = (p1.x, p1.y);
        let (x2, y2) = (p2.x, p2.y);
        let (x3, y3) = (p3.x, p3.y);

        let a = x1 * (y2 - y3) - y1 * (x2 - x3) + x2 * y3 - x3 * y2;
        if is_zero(a, CIRCLE_GEOMETRY_EPSILON) {
            return None;
        }

        let b = (x1 * x1 + y1 * y1) * (y3 - y2)
            + (x2 * x2 + y2 * y2) * (y1 - y3)
            + (x3 * x3 + y3 * y3) * (y2 - y1);

        let c = (x1 * x1 + y1 * y1) * (x2 - x3)
            + (x2 * x2 + y2 * y2) * (x3 - x1)
            + (x3 * x3 + y3 * y3) * (x1 - x2);

        let x = -b / (2.0 * a);
        let y = -c / (2.0 * a);
        let center = Point::new(x, y, p1.z, 0.0);
        let radius = center.distance_xy(p1);
        Some(Circle::new(center, radius))
    }

    /// Test whether `p` lies on the circle to within `tolerance_mm`.
    /// The comparison is a strict less-than: a point off-circle by
    /// exactly the tolerance is rejected.
    #[inline]
    pub fn contains(&self, p: &Point, tolerance_mm: f64) -> bool {
        let difference = (self.center.distance_xy(p) - self.radius).abs();
        less_than(difference, tolerance_mm, CIRCLE_GEOMETRY_EPSILON)
    }

    /// Short (non-reflex) angle in radians between two points on the
    /// circle, from the chord length by the law of cosines. The result
    /// is in `[0, π]`; disambiguating reflex angles is the caller's
    /// responsibility.
    pub fn radians_between(&self, p1: &Point, p2: &Point) -> f64 {
        let distance_sq = p1.distance_xy(p2).powi(2);
        let two_r_sq = 2.0 * self.radius * self.radius;
        // Clamp for chords a hair longer than the diameter
        (((two_r_sq - distance_sq) / two_r_sq).clamp(-1.0, 1.0)).acos()
    }

    /// Project `p` radially onto the circle. The `z` offset from the
    /// center scales proportionally along the outward direction, so a
    /// point in the circle's plane stays in it.
    pub fn closest_point(&self, p: &Point) -> Point {
        let v = *p - self.center;
        let magnitude = v.magnitude();
        Point::new(
            self.center.x + v.x / magnitude * self.radius,
            self.center.y + v.y / magnitude * self.radius,
            self.center.z + v.z / magnitude * self.radius,
            0.0,
        )
    }

}
