//! End-to-end compression tests over realistic G-code fixtures.

use std::f64::consts::PI;
use std::fmt::Write as _;

use arcfit::compress::{Compressor, CompressorConfig};
use arcfit::gcode::{parse_line, PositionTracker};

/// A small but realistic print fragment: preamble, a straight skirt,
/// a circular perimeter, a retraction and a travel move.
fn print_fragment() -> String {
    let mut g = String::new();
    g.push_str("; generated by a slicer\n");
    g.push_str("M104 S210\n");
    g.push_str("M140 S60\n");
    g.push_str("G28\n");
    g.push_str("G90\n");
    g.push_str("M83\n");
    g.push_str("G1 Z0.20000 F600\n");
    // Straight skirt segment
    g.push_str("G1 X20.00000 Y20.00000 F4500\n");
    g.push_str("G1 X60.00000 Y20.00000 E1.32990 F1800\n");
    // Circular perimeter: radius 15 around (45, 35), fed as chords
    g.push_str("G1 X60.00000 Y35.00000 E0.49871\n");
    for k in 1..=96 {
        let angle = k as f64 * 2.0 * PI / 96.0;
        writeln!(
            g,
            "G1 X{:.5} Y{:.5} E0.03270 ; perimeter",
            45.0 + 15.0 * angle.cos(),
            35.0 + 15.0 * angle.sin()
        )
        .unwrap();
    }
    // Retract and hop away
    g.push_str("G1 E-2.00000 F3000\n");
    g.push_str("G1 X10.00000 Y10.00000 F9000\n");
    g.push_str("M107\n");
    g
}

#[test]
fn test_fragment_compresses_and_preserves_structure() {
    let input = print_fragment();
    let mut output = Vec::new();
    let stats = Compressor::with_defaults()
        .compress(input.as_bytes(), &mut output)
        .expect("compression succeeds");
    let output = String::from_utf8(output).unwrap();

    // The circular perimeter welds into arcs; the straight and
    // non-move lines survive verbatim.
    assert!(stats.arcs_created >= 2);
    assert!(stats.points_compressed > 80);
    assert!(output.contains("M104 S210"));
    assert!(output.contains("G28"));
    assert!(output.contains("G1 X60.00000 Y20.00000 E1.32990 F1800"));
    assert!(output.contains("G1 E-2.00000 F3000"));
    assert!(output.contains("M107"));
    assert!(output.lines().any(|l| l.starts_with("G3") || l.starts_with("G2")));
    assert!(output.len() < input.len());
}

#[test]
fn test_output_replays_to_the_same_endpoint() {
    // Replaying the compressed program must leave the toolhead and the
    // extruder where the original would have.
    let input = print_fragment();
    let mut output = Vec::new();
    Compressor::with_defaults()
        .compress(input.as_bytes(), &mut output)
        .unwrap();
    let output = String::from_utf8(output).unwrap();

    let mut original = PositionTracker::new(false);
    for line in input.lines() {
        original.update(&parse_line(line));
    }

    let mut welded = PositionTracker::new(false);
    let mut welded_e = 0.0;
    for line in output.lines() {
        let cmd = parse_line(line);
        // Arc moves carry their endpoint in X/Y and their extrusion in
        // E; fold them through the same tracker as linear moves.
        if cmd.command == "G2" || cmd.command == "G3" {
            welded_e += cmd.parameter('E').unwrap_or(0.0);
            let x = cmd.parameter('X').unwrap();
            let y = cmd.parameter('Y').unwrap();
            welded.update(&parse_line(&format!("G1 X{x} Y{y}")));
        } else {
            if cmd.command == "G1" {
                welded_e += cmd.parameter('E').unwrap_or(0.0);
            }
            welded.update(&cmd);
        }
    }

    // Arc endpoints are emitted at five decimal places, so replay
    // agreement is bounded by the formatting, not the geometry.
    assert!((original.current().x - welded.current().x).abs() < 1e-4);
    assert!((original.current().y - welded.current().y).abs() < 1e-4);

    // Total extrusion is conserved across welding (relative mode)
    let mut original_e = 0.0;
    for line in input.lines() {
        if let Some(e) = parse_line(line).parameter('E') {
            original_e += e;
        }
    }
    assert!((original_e - welded_e).abs() < 1e-4);
}

#[test]
fn test_tighter_resolution_welds_less() {
    let input = print_fragment();

    let mut loose_out = Vec::new();
    let loose = Compressor::new(CompressorConfig::default().resolution_mm(0.1))
        .compress(input.as_bytes(), &mut loose_out)
        .unwrap();

    let mut tight_out = Vec::new();
    let tight = Compressor::new(CompressorConfig::default().resolution_mm(0.0001))
        .compress(input.as_bytes(), &mut tight_out)
        .unwrap();

    assert!(tight.points_compressed < loose.points_compressed);
}

#[test]
fn test_idempotent_on_already_welded_output() {
    // A second pass finds no further runs of linear moves to weld.
    let input = print_fragment();
    let mut first = Vec::new();
    let stats_first = Compressor::with_defaults()
        .compress(input.as_bytes(), &mut first)
        .unwrap();
    assert!(stats_first.arcs_created > 0);

    let mut second = Vec::new();
    let stats_second = Compressor::with_defaults()
        .compress(first.as_slice(), &mut second)
        .unwrap();
    assert_eq!(stats_second.arcs_created, 0);
}
