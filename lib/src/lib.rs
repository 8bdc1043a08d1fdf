//! # Arcfit
//!
//! Compresses 3D-printer toolpath programs by replacing runs of short
//! linear moves (G0/G1) with equivalent circular-arc moves (G2/G3),
//! keeping the welded path within a configurable resolution of the
//! original. This reduces G-code file size and the rate at which motion
//! commands must be streamed to the printer firmware.
//!
//! The library is organized in three layers:
//! - [`geometry`] - points, segments, circles and arcs, plus the
//!   tolerance predicates all floating-point comparisons go through
//! - [`fitting`] - the sliding-window accumulator that decides,
//!   point-by-point, whether a growing run of move endpoints still
//!   admits a single arc
//! - [`gcode`] and [`compress`] - the line parser, printer position
//!   tracker, and the streaming driver that welds a whole file
//!
//! ## Example
//!
//! ```rust,ignore
//! use arcfit::compress::{Compressor, CompressorConfig};
//!
//! let config = CompressorConfig::default().resolution_mm(0.05);
//! let stats = Compressor::new(config).compress_file("input.gcode", "output.gcode")?;
//! println!("created {} arcs", stats.arcs_created);
//! ```

pub mod compress;
pub mod fitting;
pub mod gcode;
pub mod geometry;

// Re-export commonly used types
pub use compress::{CompressionProgress, CompressionStats, Compressor, CompressorConfig};
pub use fitting::{PointBuffer, SegmentedArc, SegmentedShape};
pub use gcode::{parse_line, ParsedCommand, Position, PositionTracker};
pub use geometry::{Arc, ArcDirection, Circle, Point, Segment, Vector};

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for compression operations.
///
/// Geometric rejections (collinear points, off-circle endpoints, angle
/// reconciliation failures) are not errors - they are the normal
/// signaling channel of the accumulator and surface as `bool`/`Option`
/// results. Only faults that prevent processing from continuing are
/// reported here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
