#![warn(missing_docs)]

//! Outer-wall refinement post-processor for sliced G-code.
//!
//! This crate rewrites a finished G-code file so that every outer-wall
//! (external perimeter) block is deposited as multiple thinner passes at the
//! same total extruded volume, improving visible surface quality without
//! reslicing the model. It understands the layer and feature markers of
//! PrusaSlicer, OrcaSlicer, and Bambu Studio.
//!
//! # Example
//!
//! ```ignore
//! use finewall::{process_file, PassPolicy, SmoothSettings};
//!
//! let settings = SmoothSettings {
//!     policy: PassPolicy::Adaptive,
//!     target_height: Some(0.1),
//!     ..Default::default()
//! };
//!
//! let stats = process_file("model.gcode".as_ref(), &settings)?;
//! println!("rewrote {} wall blocks", stats.segments);
//! ```

pub mod error;
pub mod header;
pub mod line;
pub mod marker;
pub mod plan;
pub mod rewrite;
pub mod scan;

pub use error::{Result, SmoothError};
pub use line::GcodeLine;
pub use marker::{MarkerKind, MarkerSet};
pub use plan::{adaptive_plan, fixed_plan, PassPlan, PassPolicy};
pub use rewrite::rewrite_segment;
pub use scan::{Cursor, ScanEvent, Scanner, WallSegment};

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

/// Rewriting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothSettings {
    /// Pass-count policy.
    pub policy: PassPolicy,
    /// Desired outer-wall sub-layer height (mm). When `None`, the
    /// `min_layer_height` header field is used instead.
    pub target_height: Option<f64>,
    /// Feed rate for travel-back moves between passes (mm/min).
    pub travel_feedrate: f64,
}

impl Default for SmoothSettings {
    fn default() -> Self {
        Self {
            policy: PassPolicy::Adaptive,
            target_height: None,
            travel_feedrate: 9000.0,
        }
    }
}

impl SmoothSettings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if let Some(target) = self.target_height {
            if !target.is_finite() || target <= 0.0 {
                return Err(SmoothError::InvalidTargetHeight(target));
            }
        }
        Ok(())
    }
}

/// Counters describing what one run did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SmoothStats {
    /// Layer-change markers seen.
    pub layers: usize,
    /// Outer-wall blocks found.
    pub segments: usize,
    /// Total passes emitted across all blocks.
    pub passes_emitted: usize,
    /// Blocks left unsplit because the layer was already at or below the
    /// target height (or splitting offered no accuracy benefit).
    pub unsplit_blocks: usize,
}

/// Result of rewriting one file.
#[derive(Debug, Clone)]
pub struct SmoothOutput {
    /// The rewritten instruction stream.
    pub gcode: String,
    /// Run counters.
    pub stats: SmoothStats,
}

/// Rewrite a G-code document.
///
/// The target sub-layer height comes from the settings or, when unset, from
/// the `min_layer_height` header field. The fixed policy additionally needs
/// the nominal `layer_height` header field for its one whole-file plan.
/// A file without any recognized wall markers passes through unchanged;
/// absence of wall blocks is not an error.
///
/// The input is consumed line by line, so CRLF line endings come out as LF
/// and the output always ends with a newline; line content is otherwise
/// byte-exact.
pub fn smooth(input: &str, settings: &SmoothSettings) -> Result<SmoothOutput> {
    settings.validate()?;

    let lines: Vec<GcodeLine> = input.lines().map(GcodeLine::parse).collect();

    let target = match settings.target_height {
        Some(target) => target,
        None => header::min_layer_height(&lines)
            .ok_or(SmoothError::HeaderFieldMissing("min_layer_height"))?,
    };
    if !target.is_finite() || target <= 0.0 {
        return Err(SmoothError::InvalidTargetHeight(target));
    }

    // The fixed policy plans once from the nominal layer height; the
    // adaptive policy plans per block from the layer's annotated height.
    let whole_file_plan = match settings.policy {
        PassPolicy::Fixed => {
            let base = header::layer_height(&lines)
                .ok_or(SmoothError::HeaderFieldMissing("layer_height"))?;
            let plan = fixed_plan(base, target);
            info!(
                "base layer height {:.3}mm, target {:.3}mm: {} passes of {:.3}mm",
                base, target, plan.passes, plan.height_per_pass
            );
            Some(plan)
        }
        PassPolicy::Adaptive => {
            info!("adaptive splitting toward {:.3}mm outer walls", target);
            None
        }
    };

    let markers = MarkerSet::new();
    let mut scanner = Scanner::new(&lines, &markers);
    let mut out = String::with_capacity(input.len() + input.len() / 2);
    let mut stats = SmoothStats::default();

    while let Some(event) = scanner.next() {
        match event {
            ScanEvent::Passthrough(line) => {
                out.push_str(line.raw());
                out.push('\n');
            }
            ScanEvent::Wall(segment) => {
                let plan = match whole_file_plan {
                    Some(plan) => plan,
                    None => adaptive_plan(segment.entry_layer_height, target),
                };
                stats.segments += 1;
                stats.passes_emitted += plan.passes as usize;
                if plan.passes == 1 {
                    stats.unsplit_blocks += 1;
                    info!(
                        "block at z={:.3}: layer height {:.3}mm kept as a single pass",
                        segment.entry_z, segment.entry_layer_height
                    );
                } else {
                    info!(
                        "block at z={:.3}: {} passes of {:.4}mm (extrusion x{:.4})",
                        segment.entry_z,
                        plan.passes,
                        plan.height_per_pass,
                        plan.extrusion_multiplier
                    );
                }
                for rewritten in
                    rewrite_segment(&segment, &plan, settings.policy, settings.travel_feedrate)
                {
                    out.push_str(&rewritten);
                    out.push('\n');
                }
            }
        }
    }
    stats.layers = scanner.cursor().layer;

    info!(
        "{} wall blocks rewritten into {} passes ({} kept unsplit)",
        stats.segments, stats.passes_emitted, stats.unsplit_blocks
    );

    Ok(SmoothOutput { gcode: out, stats })
}

/// Rewrite a G-code file in place.
///
/// The whole file is read, rewritten, written to a sibling temporary file,
/// and renamed over the original, so a failure partway through never leaves
/// a partially written file behind.
pub fn process_file(path: &Path, settings: &SmoothSettings) -> Result<SmoothStats> {
    let input = fs::read_to_string(path)?;
    let output = smooth(&input, settings)?;

    let tmp = path.with_extension("finewall.tmp");
    fs::write(&tmp, &output.gcode)?;
    fs::rename(&tmp, path)?;
    Ok(output.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FIXED_DOC: &str = "\
; layer_height = 0.2
; min_layer_height = 0.08
G28
G1 Z0.2 F600
G1 X5.0 Y5.0 F9000
;TYPE:External perimeter
G1 X10 Y5 E1.20000
G1 X10 Y10 E1.20000
;TYPE:Internal infill
G1 X0 Y0 E2.0
";

    const ADAPTIVE_DOC: &str = "\
; min_layer_height = 0.08
;LAYER_CHANGE
;HEIGHT:0.3
G1 Z0.6 F600
G1 X5.0 Y5.0 F9000
;TYPE:Outer wall
G1 X10 Y5 E0.90000
;TYPE:Internal infill
G1 X0 Y0 E2.0
";

    #[test]
    fn test_fixed_policy_document() {
        let settings = SmoothSettings {
            policy: PassPolicy::Fixed,
            target_height: Some(0.05),
            ..Default::default()
        };
        let result = smooth(FIXED_DOC, &settings).unwrap();

        assert_eq!(result.stats.segments, 1);
        assert_eq!(result.stats.passes_emitted, 4);
        let scaled = result
            .gcode
            .lines()
            .filter(|l| l.contains("E0.30000"))
            .count();
        assert_eq!(scaled, 8); // two wall moves, four passes each
        assert_eq!(
            result
                .gcode
                .lines()
                .filter(|l| l.contains("travel back to start"))
                .count(),
            3
        );
        // Surrounding stream is untouched.
        assert!(result.gcode.contains("G1 X0 Y0 E2.0"));
        assert!(result.gcode.starts_with("; layer_height = 0.2\n"));
    }

    #[test]
    fn test_adaptive_policy_document() {
        let settings = SmoothSettings {
            policy: PassPolicy::Adaptive,
            target_height: Some(0.1),
            ..Default::default()
        };
        let result = smooth(ADAPTIVE_DOC, &settings).unwrap();

        assert_eq!(result.stats.segments, 1);
        assert_eq!(result.stats.passes_emitted, 3);
        assert_eq!(result.stats.layers, 1);

        // Per-pass extrusion sums back to the original delta.
        let total: f64 = result
            .gcode
            .lines()
            .filter(|l| l.starts_with("G1 X10 Y5"))
            .map(|l| GcodeLine::parse(l).field('E').unwrap())
            .sum();
        assert!((total - 0.9).abs() < 1e-4);
    }

    #[test]
    fn test_adaptive_target_falls_back_to_header() {
        // No explicit target: min_layer_height = 0.08 applies, and the
        // 0.3mm layer splits into 4 passes of 0.075mm (closest to 0.08).
        let settings = SmoothSettings::default();
        let result = smooth(ADAPTIVE_DOC, &settings).unwrap();
        assert_eq!(result.stats.passes_emitted, 4);
    }

    #[test]
    fn test_missing_header_field_is_fatal() {
        let settings = SmoothSettings::default();
        let err = smooth("G28\nG1 Z0.2\n", &settings).unwrap_err();
        assert!(matches!(
            err,
            SmoothError::HeaderFieldMissing("min_layer_height")
        ));

        let settings = SmoothSettings {
            policy: PassPolicy::Fixed,
            target_height: Some(0.05),
            ..Default::default()
        };
        let err = smooth("G28\nG1 Z0.2\n", &settings).unwrap_err();
        assert!(matches!(err, SmoothError::HeaderFieldMissing("layer_height")));
    }

    #[test]
    fn test_invalid_target_is_fatal() {
        let settings = SmoothSettings {
            target_height: Some(-0.1),
            ..Default::default()
        };
        assert!(matches!(
            smooth(ADAPTIVE_DOC, &settings),
            Err(SmoothError::InvalidTargetHeight(_))
        ));
    }

    #[test]
    fn test_unrecognized_dialect_passes_through() {
        let doc = "; layer_height = 0.2\nG28\nG1 Z0.2\nG1 X1 Y1 E0.5\n";
        let settings = SmoothSettings {
            policy: PassPolicy::Fixed,
            target_height: Some(0.05),
            ..Default::default()
        };
        let result = smooth(doc, &settings).unwrap();
        assert_eq!(result.gcode, doc);
        assert_eq!(result.stats.segments, 0);
    }

    #[test]
    fn test_crlf_input_is_normalized_to_lf() {
        let doc = "; layer_height = 0.2\r\nG28\r\nG1 Z0.2";
        let settings = SmoothSettings {
            policy: PassPolicy::Fixed,
            target_height: Some(0.05),
            ..Default::default()
        };
        let result = smooth(doc, &settings).unwrap();
        assert_eq!(result.gcode, "; layer_height = 0.2\nG28\nG1 Z0.2\n");
    }

    #[test]
    fn test_rewrite_is_idempotent_at_target_height() {
        let settings = SmoothSettings {
            policy: PassPolicy::Adaptive,
            target_height: Some(0.1),
            ..Default::default()
        };
        let first = smooth(ADAPTIVE_DOC, &settings).unwrap();

        // The rewritten file prints 0.1mm sub-layers, recorded in the pass
        // annotations. A second run reads them back, lands in the no-split
        // branch for every block, and changes nothing.
        let second = smooth(&first.gcode, &settings).unwrap();
        assert_eq!(second.stats.unsplit_blocks, second.stats.segments);
        assert_eq!(second.gcode, first.gcode);
    }

    #[test]
    fn test_thin_layer_keeps_original_z() {
        let doc = "\
; min_layer_height = 0.12
;LAYER_CHANGE
;HEIGHT:0.08
G1 Z0.28 F600
G1 X5.0 Y5.0 F9000
;TYPE:Outer wall
G1 X10 Y5 E0.40000
;TYPE:Internal infill
";
        let settings = SmoothSettings::default();
        let result = smooth(doc, &settings).unwrap();
        assert_eq!(result.stats.unsplit_blocks, 1);
        assert!(result.gcode.contains("G1 X10 Y5 E0.40000"));
        // No pass Z moves were inserted; the block is verbatim.
        assert!(!result.gcode.contains("pass 1 of"));
    }

    #[test]
    fn test_settings_validate() {
        assert!(SmoothSettings::default().validate().is_ok());
        let bad = SmoothSettings {
            target_height: Some(0.0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_process_file_rewrites_in_place() {
        let dir = std::env::temp_dir().join("finewall-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fixed.gcode");
        std::fs::write(&path, FIXED_DOC).unwrap();

        let settings = SmoothSettings {
            policy: PassPolicy::Fixed,
            target_height: Some(0.05),
            ..Default::default()
        };
        let stats = process_file(&path, &settings).unwrap();
        assert_eq!(stats.segments, 1);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("E0.30000"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_process_file_leaves_input_on_error() {
        let dir = std::env::temp_dir().join("finewall-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("no-header.gcode");
        std::fs::write(&path, "G28\nG1 Z0.2\n").unwrap();

        let settings = SmoothSettings::default();
        assert!(process_file(&path, &settings).is_err());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "G28\nG1 Z0.2\n"
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_fixed_subdivision_is_exact() {
        let plan = fixed_plan(0.2, 0.05);
        assert_relative_eq!(plan.passes as f64 * plan.height_per_pass, 0.2);
    }
}
