//! Streaming G-code compression.
//!
//! [`Compressor`] reads a source program line by line, tracks printer
//! state, and offers every eligible linear move to a [`SegmentedArc`]
//! accumulator. While the accumulator accepts, the source lines are
//! buffered; when it rejects, the buffered run is replaced by a single
//! G2/G3 command (if the window reconciles to an arc) or flushed
//! verbatim (if it does not). Non-move lines close the open window and
//! pass through untouched, so the output differs from the input only
//! where runs of moves were welded.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::fitting::{
    SegmentedArc, DEFAULT_MAX_SEGMENTS, DEFAULT_MIN_SEGMENTS, DEFAULT_RESOLUTION_MM,
};
use crate::gcode::{parse_line, ParsedCommand, PositionTracker};
use crate::geometry::{is_equal, POSITION_EPSILON};
use crate::{Error, Result, VERSION};

/// Configuration for the compressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Maximum deviation between the original path and a welded arc
    /// (mm). The accumulator applies half of this on either side.
    pub resolution_mm: f64,

    /// Fewest moves an emitted arc may replace.
    pub min_segments: usize,

    /// Most endpoints a single arc may span.
    pub max_segments: usize,

    /// Firmware dialect in which G90/G91 also switch the extruder
    /// axis mode.
    pub g90_influences_extruder: bool,

    /// How many source lines between progress callbacks.
    pub progress_interval_lines: u64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            resolution_mm: DEFAULT_RESOLUTION_MM,
            min_segments: DEFAULT_MIN_SEGMENTS,
            max_segments: DEFAULT_MAX_SEGMENTS,
            g90_influences_extruder: false,
            progress_interval_lines: 5000,
        }
    }
}

impl CompressorConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the resolution in millimeters.
    pub fn resolution_mm(mut self, resolution_mm: f64) -> Self {
        self.resolution_mm = resolution_mm;
        self
    }

    /// Builder: set the minimum window size.
    pub fn min_segments(mut self, min_segments: usize) -> Self {
        self.min_segments = min_segments;
        self
    }

    /// Builder: set the maximum window size.
    pub fn max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Builder: select the G90/G91-influences-extruder dialect.
    pub fn g90_influences_extruder(mut self, value: bool) -> Self {
        self.g90_influences_extruder = value;
        self
    }

    /// Check the configuration for contradictions.
    pub fn validate(&self) -> Result<()> {
        if self.resolution_mm <= 0.0 {
            return Err(Error::Config("resolution must be positive".into()));
        }
        if self.min_segments < 3 {
            return Err(Error::Config("an arc needs at least three endpoints".into()));
        }
        if self.max_segments < self.min_segments {
            return Err(Error::Config(
                "max_segments must not be below min_segments".into(),
            ));
        }
        if self.progress_interval_lines == 0 {
            return Err(Error::Config("progress interval must be positive".into()));
        }
        Ok(())
    }
}

/// Counters for one compression run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Source lines read.
    pub lines_processed: u64,
    /// Lines that carried a command.
    pub gcodes_processed: u64,
    /// Arc commands written.
    pub arcs_created: u64,
    /// Linear moves folded into arcs.
    pub points_compressed: u64,
    /// Bytes of source consumed.
    pub source_bytes: u64,
    /// Bytes of output written.
    pub target_bytes: u64,
}

impl CompressionStats {
    /// Source-to-target size ratio. 1.0 when nothing was written.
    pub fn compression_ratio(&self) -> f64 {
        if self.target_bytes == 0 {
            1.0
        } else {
            self.source_bytes as f64 / self.target_bytes as f64
        }
    }
}

/// A progress snapshot delivered through the callback.
#[derive(Debug, Clone, Copy)]
pub struct CompressionProgress {
    pub lines_processed: u64,
    pub arcs_created: u64,
    pub points_compressed: u64,
    pub source_bytes_read: u64,
    /// Total source size, when known (file-based runs).
    pub source_bytes_total: Option<u64>,
}

impl CompressionProgress {
    /// Fraction of the source consumed, when the total is known.
    pub fn percent_complete(&self) -> Option<f64> {
        self.source_bytes_total
            .filter(|&total| total > 0)
            .map(|total| self.source_bytes_read as f64 / total as f64 * 100.0)
    }
}

/// Callback invoked with progress snapshots. Return `false` to cancel
/// the run; the output ends with everything flushed so far.
pub type ProgressCallback = Box<dyn FnMut(CompressionProgress) -> bool>;

/// A source line buffered while the accumulator decides its fate.
#[derive(Debug, Clone)]
struct UnwrittenCommand {
    line: String,
    comment: String,
}

/// Streaming G-code compressor.
pub struct Compressor {
    config: CompressorConfig,
    progress: Option<ProgressCallback>,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressorConfig::default())
    }
}

impl Compressor {
    /// Create a compressor with the given configuration.
    pub fn new(config: CompressorConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Create a compressor with default configuration.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Get the configuration.
    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Install a progress callback. Snapshots are delivered every
    /// `progress_interval_lines` source lines; returning `false`
    /// cancels the run with [`Error::Cancelled`].
    pub fn set_progress_callback(&mut self, callback: impl FnMut(CompressionProgress) -> bool + 'static) {
        self.progress = Some(Box::new(callback));
    }

    /// Compress from any buffered reader into any writer.
    pub fn compress<R: BufRead, W: Write>(
        &mut self,
        reader: R,
        writer: W,
    ) -> Result<CompressionStats> {
        self.compress_sized(reader, writer, None)
    }

    /// Compress one file into another.
    pub fn compress_file(
        &mut self,
        source: impl AsRef<Path>,
        target: impl AsRef<Path>,
    ) -> Result<CompressionStats> {
        let source_size = std::fs::metadata(source.as_ref())?.len();
        let reader = BufReader::new(File::open(source.as_ref())?);
        let mut writer = BufWriter::new(File::create(target.as_ref())?);
        let stats = self.compress_sized(reader, &mut writer, Some(source_size))?;
        writer.flush()?;
        Ok(stats)
    }

    fn compress_sized<R: BufRead, W: Write>(
        &mut self,
        mut reader: R,
        writer: W,
        source_size: Option<u64>,
    ) -> Result<CompressionStats> {
        self.config.validate()?;

        let mut pass = WeldPass::new(&self.config, writer);
        pass.write_header()?;

        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            pass.stats.source_bytes += read as u64;
            pass.process_line(&line)?;

            if let Some(callback) = self.progress.as_mut() {
                if pass.stats.lines_processed % self.config.progress_interval_lines == 0 {
                    let snapshot = CompressionProgress {
                        lines_processed: pass.stats.lines_processed,
                        arcs_created: pass.stats.arcs_created,
                        points_compressed: pass.stats.points_compressed,
                        source_bytes_read: pass.stats.source_bytes,
                        source_bytes_total: source_size,
                    };
                    if !callback(snapshot) {
                        pass.finalize()?;
                        return Err(Error::Cancelled);
                    }
                }
            }
        }

        pass.finalize()?;
        Ok(pass.stats)
    }
}

/// One run's working state: the accumulator, the position oracle and
/// the queue of source lines whose fate is still open.
struct WeldPass<'a, W: Write> {
    config: &'a CompressorConfig,
    writer: W,
    arc: SegmentedArc,
    tracker: PositionTracker,
    pending: VecDeque<UnwrittenCommand>,
    waiting_for_arc: bool,
    /// Feedrate in force before the window opened; the arc only needs
    /// an F word when the welded moves changed it.
    previous_feedrate: f64,
    previous_is_extruder_relative: bool,
    /// Cumulative source-frame E at the last welded point.
    absolute_e: f64,
    /// Feedrate of the last welded move.
    feedrate_at_last_point: f64,
    stats: CompressionStats,
}

impl<'a, W: Write> WeldPass<'a, W> {
    fn new(config: &'a CompressorConfig, writer: W) -> Self {
        Self {
            config,
            writer,
            arc: SegmentedArc::new(
                config.min_segments,
                config.max_segments,
                config.resolution_mm,
            ),
            tracker: PositionTracker::new(config.g90_influences_extruder),
            pending: VecDeque::new(),
            waiting_for_arc: false,
            previous_feedrate: -1.0,
            previous_is_extruder_relative: false,
            absolute_e: 0.0,
            feedrate_at_last_point: 0.0,
            stats: CompressionStats::default(),
        }
    }

    fn write_header(&mut self) -> Result<()> {
        let header = format!(
            "; Postprocessed by arcfit v{}\n; resolution_mm = {:.2}\n; g90_influences_extruder = {}\n\n",
            VERSION, self.config.resolution_mm, self.config.g90_influences_extruder,
        );
        self.writer.write_all(header.as_bytes())?;
        self.stats.target_bytes += header.len() as u64;
        Ok(())
    }

    fn process_line(&mut self, raw: &str) -> Result<()> {
        let line = raw.trim_end_matches(['\r', '\n']);
        self.stats.lines_processed += 1;

        let cmd = parse_line(line);
        if !cmd.is_empty() {
            self.stats.gcodes_processed += 1;
        }
        // Every line updates the oracle, command or not
        self.tracker.update(&cmd);
        self.process_command(&cmd, line)
    }

    fn process_command(&mut self, cmd: &ParsedCommand, line: &str) -> Result<()> {
        let cur = *self.tracker.current();
        let prev = *self.tracker.previous();

        // A move may join the window when it stays in the plane, in
        // absolute XYZ mode, keeps the extruder mode, and - once a
        // window is open - keeps the feedrate and the direction of
        // filament travel.
        let is_candidate = !cmd.is_empty()
            && (cmd.command == "G0" || cmd.command == "G1")
            && is_equal(cur.z, prev.z, POSITION_EPSILON)
            && !cur.is_relative
            && cur.is_extruder_relative == prev.is_extruder_relative
            && (!self.waiting_for_arc
                || (prev.is_extruding() && cur.is_extruding())
                || (prev.is_retracting() && cur.is_retracting()))
            && (!self.waiting_for_arc || is_equal(prev.f, cur.f, POSITION_EPSILON));

        let mut arc_added = false;
        if is_candidate {
            if !self.waiting_for_arc {
                self.previous_is_extruder_relative = prev.is_extruder_relative;
                self.flush_pending()?;
                // Seed the window with the previous position; the start
                // point consumes no extrusion within the window.
                let mut seed = prev.to_point();
                seed.e_relative = 0.0;
                self.arc.try_add_point(seed, 0.0);
            }
            arc_added = self.arc.try_add_point(cur.to_point(), cur.e_relative);
            if arc_added {
                if !self.waiting_for_arc {
                    self.waiting_for_arc = true;
                    self.previous_feedrate = prev.f;
                    debug!("starting new arc window from: {line}");
                } else {
                    debug!("added point to arc window from: {line}");
                }
                self.absolute_e = cur.e;
                self.feedrate_at_last_point = cur.f;
            }
        }

        if !arc_added {
            if self.arc.segment_count() < self.config.min_segments {
                if self.arc.segment_count() != 0 {
                    debug!("not enough segments for an arc, flushing: {line}");
                }
                self.waiting_for_arc = false;
                self.arc.clear();
            } else if self.waiting_for_arc {
                if self.try_emit_arc()? {
                    // Re-offer the move to a fresh window; the second
                    // pass cannot recurse again because no window is
                    // open.
                    return self.process_command(cmd, line);
                }
                debug!("window did not reconcile to an arc, flushing");
                self.waiting_for_arc = false;
                self.arc.clear();
            }
        }

        self.pending.push_back(UnwrittenCommand {
            line: line.to_string(),
            comment: cmd.comment.clone(),
        });
        if !self.waiting_for_arc {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Replace the buffered window moves with a single arc command.
    /// Returns `false` (leaving the queue untouched) when the window
    /// does not materialize.
    fn try_emit_arc(&mut self) -> Result<bool> {
        let feedrate = if self.previous_feedrate > 0.0
            && is_equal(
                self.previous_feedrate,
                self.feedrate_at_last_point,
                POSITION_EPSILON,
            ) {
            0.0
        } else {
            self.feedrate_at_last_point
        };

        let formatted = if self.previous_is_extruder_relative {
            self.arc.shape_gcode_relative(feedrate)
        } else {
            self.arc.shape_gcode_absolute(self.absolute_e, feedrate)
        };
        let Some(formatted) = formatted else {
            return Ok(false);
        };
        let mut arc_line = formatted.to_string();

        let count = self.arc.segment_count();
        self.stats.points_compressed += (count - 1) as u64;
        self.stats.arcs_created += 1;

        // The welded moves sit at the back of the queue: one buffered
        // line per window point except the start, which was written
        // before the window opened.
        let mut replaced = Vec::with_capacity(count - 1);
        for _ in 0..count - 1 {
            replaced.push(
                self.pending
                    .pop_back()
                    .expect("every window move has a buffered source line"),
            );
        }
        replaced.reverse();

        // Carry the replaced moves' distinct comments onto the arc
        let mut comment = String::new();
        for entry in &replaced {
            if entry.comment.is_empty() || comment.contains(entry.comment.as_str()) {
                continue;
            }
            if !comment.is_empty() {
                comment.push_str(" - ");
            }
            comment.push_str(&entry.comment);
        }
        if !comment.is_empty() {
            arc_line.push(';');
            arc_line.push_str(&comment);
        }

        debug!(
            "arc created from {} segments: {arc_line}",
            count - 1
        );
        self.pending.push_back(UnwrittenCommand {
            line: arc_line,
            comment,
        });

        self.waiting_for_arc = false;
        self.arc.clear();
        self.flush_pending()?;
        Ok(true)
    }

    fn flush_pending(&mut self) -> Result<()> {
        while let Some(entry) = self.pending.pop_front() {
            let trimmed = entry.line.trim_end();
            self.writer.write_all(trimmed.as_bytes())?;
            self.writer.write_all(b"\n")?;
            self.stats.target_bytes += trimmed.len() as u64 + 1;
        }
        Ok(())
    }

    /// Close the open window at end of input and flush everything.
    fn finalize(&mut self) -> Result<()> {
        if self.waiting_for_arc
            && self.arc.segment_count() >= self.config.min_segments
            && self.try_emit_arc()?
        {
            debug!("final arc emitted at end of input");
        }
        self.waiting_for_arc = false;
        self.arc.clear();
        self.flush_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use std::fmt::Write as _;

    fn run(input: &str, config: CompressorConfig) -> (String, CompressionStats) {
        let mut output = Vec::new();
        let stats = Compressor::new(config)
            .compress(input.as_bytes(), &mut output)
            .expect("compression succeeds");
        (String::from_utf8(output).unwrap(), stats)
    }

    /// Body lines of the output (header comment block stripped).
    fn body(output: &str) -> Vec<&str> {
        output
            .lines()
            .skip_while(|l| l.starts_with("; ") || l.is_empty())
            .collect()
    }

    fn circle_gcode(moves: usize, relative_e: bool) -> String {
        let mut input = String::from("G90\n");
        if relative_e {
            input.push_str("M83\n");
        }
        input.push_str("G1 X10.00000 Y0.00000 F1800\n");
        for k in 1..=moves {
            let angle = k as f64 * PI / 64.0;
            let e = if relative_e {
                0.1
            } else {
                0.1 * k as f64
            };
            writeln!(
                input,
                "G1 X{:.5} Y{:.5} E{:.5}",
                10.0 * angle.cos(),
                10.0 * angle.sin(),
                e
            )
            .unwrap();
        }
        input
    }

    #[test]
    fn test_circle_is_welded_into_arcs() {
        let input = circle_gcode(80, true);
        let (output, stats) = run(&input, CompressorConfig::default());

        assert_eq!(stats.arcs_created, 2);
        assert_eq!(stats.points_compressed, 79);
        assert!(output.contains("G3 "));
        // 83 input lines collapse to a handful
        assert!(body(&output).len() < 10);
    }

    #[test]
    fn test_relative_arc_carries_window_extrusion() {
        let input = circle_gcode(80, true);
        let (output, _) = run(&input, CompressorConfig::default());
        // First window: 49 welded moves at 0.1 each
        assert!(output.contains("E4.90000"));
    }

    #[test]
    fn test_absolute_arc_carries_cumulative_extrusion() {
        let input = circle_gcode(60, false);
        let (output, stats) = run(&input, CompressorConfig::default());
        assert!(stats.arcs_created >= 1);
        // The first arc ends at move 50, whose source E is 5.0
        assert!(output.contains("E5.00000"));
    }

    #[test]
    fn test_collinear_moves_pass_through() {
        let mut input = String::from("G90\nM83\n");
        for k in 0..20 {
            writeln!(input, "G1 X{}.00000 Y0.00000 E0.10000", k).unwrap();
        }
        let (output, stats) = run(&input, CompressorConfig::default());
        assert_eq!(stats.arcs_created, 0);
        for line in input.lines() {
            assert!(output.contains(line), "missing passthrough line: {line}");
        }
    }

    #[test]
    fn test_non_move_lines_pass_through_unchanged() {
        let input = "; header comment\nM104 S210\nG28\nM83\nG1 X1 Y1 E0.1\nM107\n";
        let (output, stats) = run(input, CompressorConfig::default());
        assert_eq!(stats.arcs_created, 0);
        for line in input.lines() {
            assert!(output.contains(line), "missing passthrough line: {line}");
        }
        assert_eq!(stats.lines_processed, 6);
    }

    #[test]
    fn test_retraction_boundary_closes_window() {
        // A retraction mid-circle must not be folded into the arc
        let mut input = circle_gcode(40, true);
        input.push_str("G1 E-2.00000\n");
        let (output, stats) = run(&input, CompressorConfig::default());
        assert_eq!(stats.arcs_created, 1);
        assert!(output.contains("G1 E-2.00000"));
    }

    #[test]
    fn test_feedrate_change_splits_windows() {
        let mut input = String::from("G90\nM83\nG1 X10.00000 Y0.00000 F1800\n");
        for k in 1..=40 {
            let angle = k as f64 * PI / 64.0;
            let f = if k == 20 { " F900" } else { "" };
            writeln!(
                input,
                "G1 X{:.5} Y{:.5} E0.10000{f}",
                10.0 * angle.cos(),
                10.0 * angle.sin()
            )
            .unwrap();
        }
        let (output, stats) = run(&input, CompressorConfig::default());
        // The speed change forces the first window shut; both halves weld
        assert_eq!(stats.arcs_created, 2);
        // The second arc must announce the new feedrate
        assert!(output.contains("F900"));
    }

    #[test]
    fn test_arc_inherits_replaced_comment() {
        let mut input = String::from("G90\nM83\nG1 X10.00000 Y0.00000 F1800\n");
        for k in 1..=20 {
            let angle = k as f64 * PI / 64.0;
            writeln!(
                input,
                "G1 X{:.5} Y{:.5} E0.10000 ; outer wall",
                10.0 * angle.cos(),
                10.0 * angle.sin()
            )
            .unwrap();
        }
        let (output, stats) = run(&input, CompressorConfig::default());
        assert_eq!(stats.arcs_created, 1);
        let arc_line = output
            .lines()
            .find(|l| l.starts_with("G3"))
            .expect("an arc was written");
        assert!(arc_line.contains("outer wall"));
    }

    #[test]
    fn test_cancellation_through_callback() {
        let input = circle_gcode(80, true);
        let config = CompressorConfig {
            progress_interval_lines: 10,
            ..CompressorConfig::default()
        };
        let mut compressor = Compressor::new(config);
        compressor.set_progress_callback(|_| false);
        let result = compressor.compress(input.as_bytes(), Vec::new());
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_progress_snapshots_are_delivered() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let input = circle_gcode(80, true);
        let config = CompressorConfig {
            progress_interval_lines: 25,
            ..CompressorConfig::default()
        };
        let seen = Rc::new(RefCell::new(0u32));
        let seen_in_callback = Rc::clone(&seen);
        let mut compressor = Compressor::new(config);
        compressor.set_progress_callback(move |progress| {
            *seen_in_callback.borrow_mut() += 1;
            assert!(progress.lines_processed > 0);
            assert!(progress.percent_complete().is_none());
            true
        });
        compressor
            .compress(input.as_bytes(), Vec::new())
            .expect("compression succeeds");
        assert!(*seen.borrow() >= 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad = CompressorConfig::default().min_segments(2);
        let result = Compressor::new(bad).compress("".as_bytes(), Vec::new());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_stats_compression_ratio() {
        let input = circle_gcode(80, true);
        let (_, stats) = run(&input, CompressorConfig::default());
        assert!(stats.compression_ratio() > 1.0);
        assert!(stats.source_bytes > stats.target_bytes);
    }
}
