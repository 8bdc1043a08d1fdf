//! Arcfit CLI - Command-line interface for the arcfit library
//!
//! Usage:
//!   arcfit-cli <input.gcode> -o <output.gcode> [options]
//!   arcfit-cli <input.gcode> --resolution 0.1 --max-segments 80
//!   arcfit-cli <input.gcode> --config my_config.json

use anyhow::{Context, Result};
use arcfit::compress::{Compressor, CompressorConfig};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use std::fs;
use std::path::PathBuf;

/// Compresses G0/G1 toolpath moves into G2/G3 arcs within a configurable resolution
#[derive(Parser, Debug)]
#[command(name = "arcfit-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input G-code file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output G-code file (default: INPUT with a .arc.gcode extension)
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Compressor configuration file (JSON format) - overrides the
    /// individual options below
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Maximum deviation from the original path in mm
    #[arg(long, default_value = "0.05")]
    resolution: f64,

    /// Fewest moves an emitted arc may replace
    #[arg(long, default_value = "3")]
    min_segments: usize,

    /// Most endpoints a single arc may span
    #[arg(long, default_value = "50")]
    max_segments: usize,

    /// Firmware dialect in which G90/G91 also switch the extruder mode
    #[arg(long)]
    g90_influences_extruder: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        }
        None => CompressorConfig::default()
            .resolution_mm(cli.resolution)
            .min_segments(cli.min_segments)
            .max_segments(cli.max_segments)
            .g90_influences_extruder(cli.g90_influences_extruder),
    };

    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("arc.gcode"));

    info!("Compressing {}", cli.input.display());
    info!("  resolution: {} mm", config.resolution_mm);
    info!("  window: {}..{} segments", config.min_segments, config.max_segments);

    let source_size = fs::metadata(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?
        .len();

    // Create progress bar
    let progress = ProgressBar::new(source_size);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.set_message("welding arcs...");

    let mut compressor = Compressor::new(config);
    let bar = progress.clone();
    compressor.set_progress_callback(move |snapshot| {
        bar.set_position(snapshot.source_bytes_read);
        true
    });

    let stats = compressor
        .compress_file(&cli.input, &output_path)
        .context("Compression failed")?;

    progress.finish_with_message("done");

    println!("Wrote {}", output_path.display());
    println!("  Lines processed:  {}", stats.lines_processed);
    println!("  Arcs created:     {}", stats.arcs_created);
    println!("  Points compressed: {}", stats.points_compressed);
    println!(
        "  Size: {} -> {} bytes ({:.1}% of original)",
        stats.source_bytes,
        stats.target_bytes,
        stats.target_bytes as f64 / stats.source_bytes.max(1) as f64 * 100.0
    );

    Ok(())
}
