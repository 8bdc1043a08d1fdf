//! The sliding-window arc accumulator.
//!
//! A [`SegmentedArc`] is fed one move endpoint at a time. While the
//! accumulated run of endpoints still admits a single circular arc
//! within the configured resolution, the window grows; the first point
//! that does not fit is rejected, and the caller decides whether to
//! emit the window as an arc, flush it as the original linear moves,
//! or shrink it and retry.
//!
//! Geometric failures (collinearity, off-circle points, length
//! mismatches, capacity) are the accumulator's normal signaling
//! channel and surface as `false`/`None`. Contract violations - asking
//! for G-code from an empty window - panic.

use std::fmt::Write;

use log::trace;

use crate::geometry::{
    greater_than, greater_than_or_equal, is_equal, is_zero, Arc, Circle, Point, Segment,
    POSITION_EPSILON,
};

use super::{PointBuffer, SegmentedShape};

/// Fewest endpoints an emitted arc may span.
pub const DEFAULT_MIN_SEGMENTS: usize = 3;

/// Most endpoints an emitted arc may span.
pub const DEFAULT_MAX_SEGMENTS: usize = 50;

/// Default maximum deviation between the original path and the fitted
/// arc, in millimeters.
pub const DEFAULT_RESOLUTION_MM: f64 = 0.05;

/// Streaming accumulator that coalesces runs of linear moves into arcs.
#[derive(Debug, Clone)]
pub struct SegmentedArc {
    points: PointBuffer,
    arc_circle: Option<Circle>,
    e_relative: f64,
    original_path_length: f64,
    is_shape: bool,
    min_segments: usize,
    // Half the user-supplied resolution: the fit tolerance is +/- half
    // of the requested resolution.
    resolution_mm: f64,
    gcode_buffer: String,
}

impl Default for SegmentedArc {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_SEGMENTS,
            DEFAULT_MAX_SEGMENTS,
            DEFAULT_RESOLUTION_MM,
        )
    }
}

impl SegmentedArc {
    /// Create an empty accumulator.
    ///
    /// # Panics
    ///
    /// Panics unless `min_segments >= 3`, `max_segments >= min_segments`
    /// and `resolution_mm > 0`.
    pub fn new(min_segments: usize, max_segments: usize, resolution_mm: f64) -> Self {
        assert!(min_segments >= 3, "an arc needs at least three endpoints");
        assert!(
            max_segments >= min_segments,
            "max_segments must not be below min_segments"
        );
        assert!(resolution_mm > 0.0, "resolution must be positive");
        Self {
            points: PointBuffer::new(max_segments),
            arc_circle: None,
            e_relative: 0.0,
            original_path_length: 0.0,
            is_shape: false,
            min_segments,
            resolution_mm: resolution_mm / 2.0,
            gcode_buffer: String::with_capacity(96),
        }
    }

    /// Number of endpoints currently in the window.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.points.len()
    }

    /// Configured lower bound on emitted window size.
    #[inline]
    pub fn min_segments(&self) -> usize {
        self.min_segments
    }

    /// Configured upper bound on window size.
    #[inline]
    pub fn max_segments(&self) -> usize {
        self.points.capacity()
    }

    /// The configured resolution in millimeters. The fit tolerance
    /// applied internally is half this value (deviations are +/- half
    /// of the requested resolution).
    #[inline]
    pub fn resolution_mm(&self) -> f64 {
        self.resolution_mm * 2.0
    }

    /// Sum of straight-line distances between consecutive window points.
    #[inline]
    pub fn shape_length(&self) -> f64 {
        self.original_path_length
    }

    /// Total extrusion consumed by the window. The first point is the
    /// arc's start and contributed no extrusion within the window.
    #[inline]
    pub fn shape_e_relative(&self) -> f64 {
        self.e_relative
    }

    /// True iff the window currently represents an emittable arc.
    pub fn is_shape(&self) -> bool {
        // The flag is maintained incrementally; confirm the window
        // still materializes before promising an arc to the caller.
        self.is_shape && self.try_get_arc().is_some()
    }

    /// Discard the window entirely.
    pub fn clear(&mut self) {
        self.points.clear();
        self.arc_circle = None;
        self.e_relative = 0.0;
        self.original_path_length = 0.0;
        self.is_shape = false;
    }

    /// Attempt to extend the window with `p`, whose extrusion delta is
    /// `e_relative`. Returns whether the window is still a valid
    /// (growing) candidate arc; on `false` the window is untouched.
    pub fn try_add_point(&mut self, p: Point, e_relative: f64) -> bool {
        debug_assert!(
            is_equal(p.e_relative, e_relative, POSITION_EPSILON),
            "extrusion delta disagrees with the point's own"
        );

        if self.points.is_full() {
            return false;
        }

        let mut distance = 0.0;
        if let Some(last) = self.points.back() {
            // Arcs are planar: z must hold across the window
            if !is_equal(last.z, p.z, POSITION_EPSILON) {
                return false;
            }
            distance = last.distance_xy(&p);
            // A zero-length segment cannot contribute to an arc
            if is_zero(distance, POSITION_EPSILON) {
                return false;
            }
        }

        let added = if self.points.len() < 2 {
            // Nothing to test yet
            true
        } else {
            self.try_add_point_internal(&p, distance)
        };

        if added {
            self.points.push_back(p);
            self.original_path_length += distance;
            if self.points.len() > 1 {
                // Only the second point onward consumes extrusion
                // within the window.
                self.e_relative += e_relative;
            }
            trace!(
                "window grew to {} points, length {:.5}",
                self.points.len(),
                self.original_path_length
            );
        }
        added
    }

    fn try_add_point_internal(&mut self, p: &Point, distance: f64) -> bool {
        let count = self.points.len();
        match self.arc_circle {
            Some(circle) => {
                if !circle.contains(p, self.resolution_mm) {
                    return false;
                }
                if !self.circle_fits_points(&circle, p, distance) {
                    return false;
                }
                self.is_shape = count + 1 >= self.min_segments;
                true
            }
            None => {
                // No committed circle yet: a fresh window, or a
                // collinear run still waiting for curvature.
                let mid_index = (count - 2) / 2 + 1;
                match Circle::try_from_three_points(&self.points[0], &self.points[mid_index], p) {
                    None => {
                        // Collinear buildup is not yet a failure; the
                        // arc may still form once a non-collinear
                        // point arrives.
                        self.is_shape = false;
                        true
                    }
                    Some(circle) => {
                        if self.circle_fits_points(&circle, p, distance) {
                            self.arc_circle = Some(circle);
                            self.is_shape = count + 1 >= self.min_segments;
                            true
                        } else if count == 2 {
                            // A two-point window always grows; the
                            // candidate circle simply isn't committed.
                            self.is_shape = false;
                            true
                        } else {
                            false
                        }
                    }
                }
            }
        }
    }

    /// Verify the candidate circle against the whole window plus the
    /// incoming point: every endpoint on the circle, no chord cutting
    /// inside the tolerance band, and the run still reconciling to a
    /// single arc of the accumulated length.
    fn circle_fits_points(&self, circle: &Circle, p: &Point, distance: f64) -> bool {
        let count = self.points.len();

        for point in self.points.iter() {
            if !circle.contains(point, self.resolution_mm) {
                return false;
            }
        }
        if !circle.contains(p, self.resolution_mm) {
            return false;
        }

        for index in 0..count - 1 {
            if !self.foot_within_tolerance(circle, &self.points[index], &self.points[index + 1]) {
                return false;
            }
        }
        if !self.foot_within_tolerance(circle, &self.points[count - 1], p) {
            return false;
        }

        self.try_get_arc_with(circle, p, distance).is_some()
    }

    /// Where the circle center projects perpendicularly onto a chord's
    /// interior, the foot must stay within tolerance of the radius.
    /// Chord interiors get the full configured resolution rather than
    /// the halved endpoint tolerance: the sagitta of a legitimate chord
    /// already dips half a band inside the circle.
    fn foot_within_tolerance(&self, circle: &Circle, a: &Point, b: &Point) -> bool {
        match Segment::perpendicular_foot_between(a, b, &circle.center) {
            Some(foot) => {
                let difference = (foot.distance_xy(&circle.center) - circle.radius).abs();
                !greater_than(difference, self.resolution_mm * 2.0, POSITION_EPSILON)
            }
            None => true,
        }
    }

    fn try_get_arc_with(&self, circle: &Circle, endpoint: &Point, additional: f64) -> Option<Arc> {
        let count = self.points.len();
        let mid_index = (count - 1) / 2 + 1;
        Arc::try_create(
            circle,
            &self.points[0],
            &self.points[mid_index],
            endpoint,
            self.original_path_length + additional,
            self.resolution_mm,
        )
    }

    /// Materialize the current window into an arc record. Fails
    /// without mutating state when the window is not a shape or the
    /// reconciliation does not close.
    pub fn try_get_arc(&self) -> Option<Arc> {
        let count = self.points.len();
        if count < self.min_segments {
            return None;
        }
        let circle = self.arc_circle?;
        let mid_index = (count - 2) / 2 + 1;
        Arc::try_create(
            &circle,
            &self.points[0],
            &self.points[mid_index],
            &self.points[count - 1],
            self.original_path_length,
            self.resolution_mm,
        )
    }

    /// Remove the window's oldest point. The caller supplies the
    /// extrusion delta to subtract from the window's total (for a
    /// front pop that is the *new* front's delta - the one that no
    /// longer counts once its predecessor is gone).
    ///
    /// # Panics
    ///
    /// Panics if the window is empty.
    pub fn pop_front(&mut self, e_relative_adjustment: f64) -> Point {
        self.e_relative -= e_relative_adjustment;
        if self.points.len() == self.min_segments {
            self.is_shape = false;
        }
        let removed = self.points.pop_front();
        if let Some(front) = self.points.front() {
            self.original_path_length -= removed.distance_xy(front);
        } else {
            self.original_path_length = 0.0;
        }
        removed
    }

    /// Remove the window's newest point, subtracting its extrusion
    /// delta from the window's total.
    ///
    /// # Panics
    ///
    /// Panics if the window is empty.
    pub fn pop_back(&mut self, e_relative_adjustment: f64) -> Point {
        self.e_relative -= e_relative_adjustment;
        if self.points.len() == self.min_segments {
            self.is_shape = false;
        }
        let removed = self.points.pop_back();
        if let Some(back) = self.points.back() {
            self.original_path_length -= removed.distance_xy(back);
        } else {
            self.original_path_length = 0.0;
        }
        removed
    }

    /// Format the window as a G2/G3 command for absolute extrusion
    /// mode, carrying the caller-supplied cumulative `E`.
    ///
    /// # Panics
    ///
    /// Panics if the window is empty.
    pub fn shape_gcode_absolute(&mut self, e_absolute: f64, feedrate: f64) -> Option<&str> {
        let e = (self.e_relative != 0.0).then_some(e_absolute);
        self.format_shape_gcode(e, feedrate)
    }

    /// Format the window as a G2/G3 command for relative extrusion
    /// mode, carrying the window's extrusion delta.
    ///
    /// # Panics
    ///
    /// Panics if the window is empty.
    pub fn shape_gcode_relative(&mut self, feedrate: f64) -> Option<&str> {
        let e = (self.e_relative != 0.0).then_some(self.e_relative);
        self.format_shape_gcode(e, feedrate)
    }

    fn format_shape_gcode(&mut self, e: Option<f64>, feedrate: f64) -> Option<&str> {
        assert!(
            !self.points.is_empty(),
            "G-code requested for an empty window"
        );
        let arc = self.try_get_arc()?;

        self.gcode_buffer.clear();
        write!(
            self.gcode_buffer,
            "{} X{:.5} Y{:.5} I{:.5} J{:.5}",
            arc.direction().gcode_command(),
            arc.end.x,
            arc.end.y,
            arc.i(),
            arc.j()
        )
        .unwrap();
        if let Some(e) = e {
            write!(self.gcode_buffer, " E{:.5}", e).unwrap();
        }
        if greater_than_or_equal(feedrate, 1.0, POSITION_EPSILON) {
            write!(self.gcode_buffer, " F{:.0}", feedrate).unwrap();
        }
        Some(self.gcode_buffer.as_str())
    }
}

impl SegmentedShape for SegmentedArc {
    fn segment_count(&self) -> usize {
        SegmentedArc::segment_count(self)
    }

    fn min_segments(&self) -> usize {
        SegmentedArc::min_segments(self)
    }

    fn max_segments(&self) -> usize {
        SegmentedArc::max_segments(self)
    }

    fn shape_length(&self) -> f64 {
        SegmentedArc::shape_length(self)
    }

    fn shape_e_relative(&self) -> f64 {
        SegmentedArc::shape_e_relative(self)
    }

    fn is_shape(&self) -> bool {
        SegmentedArc::is_shape(self)
    }

    fn clear(&mut self) {
        SegmentedArc::clear(self)
    }

    fn try_add_point(&mut self, p: Point, e_relative: f64) -> bool {
        SegmentedArc::try_add_point(self, p, e_relative)
    }
}
