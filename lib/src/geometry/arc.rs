//! Directed circular arcs.
//!
//! An [`Arc`] is produced from a candidate circle and three witness
//! points (start, mid, end) by [`Arc::try_create`], which reconciles
//! the three chord angles against a full turn to recover the swept
//! angle, checks the result against the accumulated path length, and
//! classifies the direction from the sign of a cross product.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::{is_equal, Circle, Point, Vector, CIRCLE_GEOMETRY_EPSILON};

/// Swept angles below this threshold (radians) are rejected: the cross
/// product that decides direction cannot be trusted near zero.
pub const MIN_ARC_THETA: f64 = 1e-3;

/// Direction of an arc (clockwise or counter-clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    /// Clockwise arc (G2)
    Clockwise,
    /// Counter-clockwise arc (G3)
    CounterClockwise,
}

impl ArcDirection {
    /// Returns the G-code command word for this direction.
    #[inline]
    pub fn gcode_command(&self) -> &'static str {
        match self {
            ArcDirection::Clockwise => "G2",
            ArcDirection::CounterClockwise => "G3",
        }
    }
}

/// A planar circular arc with a signed swept angle.
///
/// `angle_radians` is negative for clockwise arcs and positive for
/// counter-clockwise arcs; `length` is always `|angle_radians| * radius`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub center: Point,
    pub radius: f64,
    pub start: Point,
    pub end: Point,
    pub length: f64,
    pub angle_radians: f64,
}

impl Arc {
    /// Direction implied by the sign of the swept angle.
    #[inline]
    pub fn direction(&self) -> ArcDirection {
        if self.angle_radians < 0.0 {
            ArcDirection::Clockwise
        } else {
            ArcDirection::CounterClockwise
        }
    }

    /// X offset of the center from the start point (G-code `I`).
    #[inline]
    pub fn i(&self) -> f64 {
        self.center.x - self.start.x
    }

    /// Y offset of the center from the start point (G-code `J`).
    #[inline]
    pub fn j(&self) -> f64 {
        self.center.y - self.start.y
    }

    /// Resolve an arc from a circle, three witness points and the
    /// length of the linear path it would replace.
    ///
    /// The witness points are first snapped onto the circle. Each pair
    /// of witnesses subtends either its short chord angle or the
    /// complementary reflex angle; exactly one assignment of the three
    /// makes them close to a full turn, and that assignment determines
    /// the swept angle between start and end. Fails when no assignment
    /// closes, when the arc length disagrees with `approximate_length`
    /// by `resolution` or more, or when the swept angle is too small
    /// for the direction sign to be meaningful.
    pub fn try_create(
        circle: &Circle,
        start: &Point,
        mid: &Point,
        end: &Point,
        approximate_length: f64,
        resolution: f64,
    ) -> Option<Arc> {
        let p1 = circle.closest_point(start);
        let p2 = circle.closest_point(mid);
        let p3 = circle.closest_point(end);

        let p1_p2_rad = circle.radians_between(&p1, &p2);
        let p2_p3_rad = circle.radians_between(&p2, &p3);
        let p3_p1_rad = circle.radians_between(&p3, &p1);

        let two_pi = 2.0 * PI;
        let closes = |sum: f64| is_equal(sum, two_pi, CIRCLE_GEOMETRY_EPSILON);

        let angle_radians = if closes(p1_p2_rad + p2_p3_rad + p3_p1_rad) {
            // mid lies between start and end on the short side
            p1_p2_rad + p2_p3_rad
        } else if closes(p1_p2_rad + p2_p3_rad + (two_pi - p3_p1_rad)) {
            // same span, reflex return chord
            p2_p3_rad + p1_p2_rad
        } else if closes((two_pi - p1_p2_rad) + p2_p3_rad + p3_p1_rad) {
            (two_pi - p1_p2_rad) + p2_p3_rad
        } else if closes(p1_p2_rad + (two_pi - p2_p3_rad) + p3_p1_rad) {
            p1_p2_rad + (two_pi - p2_p3_rad)
        } else {
            return None;
        };

        let length = angle_radians * circle.radius;
        if !is_equal(length, approximate_length, resolution) {
            return None;
        }

        // Very small angles can't be relied upon to calculate the sign
        if angle_radians < MIN_ARC_THETA {
            return None;
        }

        let v1 = p1 - p2;
        let v2 = p3 - p2;
        // Raw comparison to zero: sign discrimination near zero is the
        // decision being made, a tolerance compare would erase it
        let is_clockwise = Vector::cross_xy(&v1, &v2) > 0.0;

        Some(Arc {
            center: circle.center,
            radius: circle.radius,
            start: *start,
            end: *end,
            length,
            angle_radians: if is_clockwise {
                -angle_radians
            } else {
                angle_radians
            },
        })
    }
}
