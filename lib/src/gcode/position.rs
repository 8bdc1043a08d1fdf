//! Printer position tracking.
//!
//! The tracker consumes parsed commands in source order and maintains
//! the absolute toolhead position, the extrusion axis, positioning
//! modes and the feedrate in force. Per move it exposes the new
//! absolute endpoint and the extrusion delta that move consumed - the
//! oracle the arc accumulator is driven from.

use crate::geometry::{is_zero, Point, POSITION_EPSILON};

use super::ParsedCommand;

/// A snapshot of printer state after one command.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Absolute extruder position in the source's coordinate frame
    /// (i.e. as reset by G92).
    pub e: f64,
    /// Feedrate in force, mm/min. Zero until the first F parameter.
    pub f: f64,
    /// Extrusion consumed by the command that produced this snapshot.
    pub e_relative: f64,
    /// XYZ axes in relative mode (G91).
    pub is_relative: bool,
    /// Extruder axis in relative mode (M83).
    pub is_extruder_relative: bool,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            e: 0.0,
            f: 0.0,
            e_relative: 0.0,
            is_relative: false,
            is_extruder_relative: false,
        }
    }
}

impl Position {
    /// The move arriving at this position pushed filament.
    #[inline]
    pub fn is_extruding(&self) -> bool {
        self.e_relative > POSITION_EPSILON
    }

    /// The move arriving at this position pulled filament back.
    #[inline]
    pub fn is_retracting(&self) -> bool {
        self.e_relative < -POSITION_EPSILON
    }

    /// The move arriving at this position left the extruder alone.
    #[inline]
    pub fn is_travel(&self) -> bool {
        is_zero(self.e_relative, POSITION_EPSILON)
    }

    /// This position as an accumulator endpoint.
    #[inline]
    pub fn to_point(&self) -> Point {
        Point::new(self.x, self.y, self.z, self.e_relative)
    }
}

/// Streaming position tracker. Feed every source command through
/// [`PositionTracker::update`]; the previous snapshot is retained so a
/// driver can compare the states on either side of a move.
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    current: Position,
    previous: Position,
    g90_influences_extruder: bool,
}

impl PositionTracker {
    /// Create a tracker. `g90_influences_extruder` selects the firmware
    /// dialect in which G90/G91 also switch the extruder axis mode.
    pub fn new(g90_influences_extruder: bool) -> Self {
        Self {
            g90_influences_extruder,
            ..Self::default()
        }
    }

    /// State after the most recent command.
    #[inline]
    pub fn current(&self) -> &Position {
        &self.current
    }

    /// State before the most recent command.
    #[inline]
    pub fn previous(&self) -> &Position {
        &self.previous
    }

    /// Apply one command.
    pub fn update(&mut self, cmd: &ParsedCommand) {
        self.previous = self.current;
        self.current.e_relative = 0.0;
        if cmd.is_empty() {
            return;
        }

        match cmd.command.as_str() {
            "G0" | "G1" => self.apply_move(cmd),
            "G28" => self.apply_home(cmd),
            "G90" => {
                self.current.is_relative = false;
                if self.g90_influences_extruder {
                    self.current.is_extruder_relative = false;
                }
            }
            "G91" => {
                self.current.is_relative = true;
                if self.g90_influences_extruder {
                    self.current.is_extruder_relative = true;
                }
            }
            "G92" => self.apply_set_position(cmd),
            "M82" => self.current.is_extruder_relative = false,
            "M83" => self.current.is_extruder_relative = true,
            _ => {}
        }
    }

    fn apply_move(&mut self, cmd: &ParsedCommand) {
        if let Some(v) = cmd.parameter('X') {
            self.current.x = if self.current.is_relative {
                self.current.x + v
            } else {
                v
            };
        }
        if let Some(v) = cmd.parameter('Y') {
            self.current.y = if self.current.is_relative {
                self.current.y + v
            } else {
                v
            };
        }
        if let Some(v) = cmd.parameter('Z') {
            self.current.z = if self.current.is_relative {
                self.current.z + v
            } else {
                v
            };
        }
        if let Some(v) = cmd.parameter('E') {
            if self.current.is_extruder_relative {
                self.current.e_relative = v;
                self.current.e += v;
            } else {
                self.current.e_relative = v - self.current.e;
                self.current.e = v;
            }
        }
        if let Some(v) = cmd.parameter('F') {
            self.current.f = v;
        }
    }

    fn apply_home(&mut self, cmd: &ParsedCommand) {
        // Homing without axis words homes everything
        let all = !cmd.has_parameter('X') && !cmd.has_parameter('Y') && !cmd.has_parameter('Z');
        if all || cmd.has_parameter('X') {
            self.current.x = 0.0;
        }
        if all || cmd.has_parameter('Y') {
            self.current.y = 0.0;
        }
        if all || cmd.has_parameter('Z') {
            self.current.z = 0.0;
        }
    }

    fn apply_set_position(&mut self, cmd: &ParsedCommand) {
        // G92 renames the current position; nothing physically moves
        let any = cmd.has_parameter('X')
            || cmd.has_parameter('Y')
            || cmd.has_parameter('Z')
            || cmd.has_parameter('E');
        if !any {
            self.current.x = 0.0;
            self.current.y = 0.0;
            self.current.z = 0.0;
            self.current.e = 0.0;
            return;
        }
        if let Some(v) = cmd.parameter('X') {
            self.current.x = v;
        }
        if let Some(v) = cmd.parameter('Y') {
            self.current.y = v;
        }
        if let Some(v) = cmd.parameter('Z') {
            self.current.z = v;
        }
        if let Some(v) = cmd.parameter('E') {
            self.current.e = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse_line;
    use super::*;

    fn track(lines: &[&str]) -> PositionTracker {
        let mut tracker = PositionTracker::new(false);
        for line in lines {
            tracker.update(&parse_line(line));
        }
        tracker
    }

    #[test]
    fn test_absolute_moves() {
        let t = track(&["G90", "G1 X10 Y5 Z0.2 F1800", "G1 X20"]);
        assert_eq!(t.current().x, 20.0);
        assert_eq!(t.current().y, 5.0);
        assert_eq!(t.current().z, 0.2);
        assert_eq!(t.current().f, 1800.0);
        assert_eq!(t.previous().x, 10.0);
    }

    #[test]
    fn test_relative_moves() {
        let t = track(&["G91", "G1 X10 Y5", "G1 X-3 Y2"]);
        assert_eq!(t.current().x, 7.0);
        assert_eq!(t.current().y, 7.0);
        assert!(t.current().is_relative);
    }

    #[test]
    fn test_absolute_extrusion_delta() {
        let t = track(&["M82", "G1 X1 E0.5", "G1 X2 E0.8"]);
        assert!((t.current().e_relative - 0.3).abs() < 1e-12);
        assert!((t.current().e - 0.8).abs() < 1e-12);
        assert!(t.current().is_extruding());
    }

    #[test]
    fn test_relative_extrusion_delta() {
        let t = track(&["M83", "G1 X1 E0.5", "G1 X2 E0.25"]);
        assert!((t.current().e_relative - 0.25).abs() < 1e-12);
        assert!((t.current().e - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_retraction_state() {
        let t = track(&["M83", "G1 X1 E0.5", "G1 E-2.0"]);
        assert!(t.current().is_retracting());
        assert!(t.previous().is_extruding());
    }

    #[test]
    fn test_travel_has_no_extrusion() {
        let t = track(&["G1 X5 Y5"]);
        assert!(t.current().is_travel());
        assert_eq!(t.current().e_relative, 0.0);
    }

    #[test]
    fn test_g92_resets_extruder_frame() {
        let t = track(&["M82", "G1 X1 E10.0", "G92 E0", "G1 X2 E0.4"]);
        // The G92 itself moved nothing
        assert!((t.current().e_relative - 0.4).abs() < 1e-12);
        assert!((t.current().e - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_g90_influences_extruder_dialect() {
        let mut t = PositionTracker::new(true);
        t.update(&parse_line("G91"));
        assert!(t.current().is_extruder_relative);
        t.update(&parse_line("G90"));
        assert!(!t.current().is_extruder_relative);

        let mut t = PositionTracker::new(false);
        t.update(&parse_line("G91"));
        assert!(!t.current().is_extruder_relative);
    }

    #[test]
    fn test_home() {
        let t = track(&["G1 X10 Y10 Z10", "G28 Z"]);
        assert_eq!(t.current().x, 10.0);
        assert_eq!(t.current().z, 0.0);
        let t = track(&["G1 X10 Y10 Z10", "G28"]);
        assert_eq!(t.current().x, 0.0);
        assert_eq!(t.current().y, 0.0);
    }
}
