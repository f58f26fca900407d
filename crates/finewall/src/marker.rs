//! Slicer dialect marker table.
//!
//! PrusaSlicer, OrcaSlicer, and Bambu Studio annotate their G-code with
//! different comment markers for layer changes and feature (wall/infill)
//! boundaries. The recognized markers form a small closed set, compiled once
//! into a [`MarkerSet`]; supporting a new dialect means extending this table,
//! not touching the scan loop.

use regex::Regex;

use crate::line::GcodeLine;

/// Kind of structural marker carried by a comment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Layer-change marker (`;LAYER_CHANGE`, `;CHANGE_LAYER`).
    LayerChange,
    /// Start of an outer-wall / external-perimeter block.
    WallStart,
    /// Any other feature or type boundary.
    FeatureBoundary,
}

/// Compiled marker patterns for all supported slicer dialects.
pub struct MarkerSet {
    layer_change: Regex,
    height_note: Regex,
    wall_start: Regex,
    type_tag: Regex,
    feature_tag: Regex,
    pass_note: Regex,
}

impl MarkerSet {
    /// Compile the dialect table.
    pub fn new() -> Self {
        Self {
            // PrusaSlicer/Orca use LAYER_CHANGE, Bambu Studio CHANGE_LAYER.
            layer_change: Regex::new(r";\s*(?:LAYER_CHANGE|CHANGE_LAYER)").unwrap(),
            // Per-layer height annotation following a layer change.
            height_note: Regex::new(r";\s*(?:HEIGHT:|LAYER_HEIGHT:)\s*([0-9]*\.?[0-9]+)")
                .unwrap(),
            wall_start: Regex::new(
                r";\s*(?:TYPE:\s*(?:External perimeter|Outer wall)|FEATURE:\s*Outer wall)",
            )
            .unwrap(),
            type_tag: Regex::new(r";\s*TYPE:").unwrap(),
            feature_tag: Regex::new(r";\s*FEATURE:").unwrap(),
            // Our own pass annotation, emitted by the rewriter. Reading it
            // back makes a second run see the sub-layer height instead of
            // the layer's original annotation, so already-split walls hit
            // the no-split branch.
            pass_note: Regex::new(r"; pass \d+ of \d+ \(([0-9]*\.?[0-9]+)mm\)").unwrap(),
        }
    }

    /// Classify a line's structural marker, if it carries one.
    pub fn classify(&self, line: &GcodeLine) -> Option<MarkerKind> {
        let raw = line.raw();
        if self.layer_change.is_match(raw) {
            Some(MarkerKind::LayerChange)
        } else if self.wall_start.is_match(raw) {
            Some(MarkerKind::WallStart)
        } else if self.type_tag.is_match(raw) || self.feature_tag.is_match(raw) {
            Some(MarkerKind::FeatureBoundary)
        } else {
            None
        }
    }

    /// Does this line start an outer-wall block?
    pub fn is_wall_start(&self, line: &GcodeLine) -> bool {
        self.wall_start.is_match(line.raw())
    }

    /// Per-layer height annotation value, if the line carries one.
    pub fn layer_height_annotation(&self, line: &GcodeLine) -> Option<f64> {
        let caps = self.height_note.captures(line.raw())?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// Sub-layer height from a rewriter-emitted pass annotation, if the
    /// line carries one.
    pub fn pass_height_annotation(&self, line: &GcodeLine) -> Option<f64> {
        let caps = self.pass_note.captures(line.raw())?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// Does this line terminate an outer-wall block (lookahead-of-one)?
    ///
    /// Terminators: any `;TYPE:` tag; a `;FEATURE:` tag for a different
    /// feature (`Overhang` and `Outer` continue the wall); Bambu `;Z`
    /// annotations; any machine command except the `M73` progress report
    /// (`M991`, Bambu's layer-change command, falls under this rule).
    pub fn ends_wall_block(&self, line: &GcodeLine) -> bool {
        let raw = line.raw();
        if self.type_tag.is_match(raw) {
            return true;
        }
        if self.feature_tag.is_match(raw) && !raw.contains("Overhang") && !raw.contains("Outer") {
            return true;
        }
        if raw.trim_start().starts_with(";Z") {
            return true;
        }
        if let Some(cmd) = line.command() {
            if cmd.starts_with('M') && cmd != "M73" {
                return true;
            }
        }
        false
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line(s: &str) -> GcodeLine {
        GcodeLine::parse(s)
    }

    #[test]
    fn test_layer_change_dialects() {
        let markers = MarkerSet::new();
        assert_eq!(
            markers.classify(&line(";LAYER_CHANGE")),
            Some(MarkerKind::LayerChange)
        );
        assert_eq!(
            markers.classify(&line("; CHANGE_LAYER")),
            Some(MarkerKind::LayerChange)
        );
        assert_eq!(markers.classify(&line("G1 X1 Y2")), None);
    }

    #[test]
    fn test_wall_start_dialects() {
        let markers = MarkerSet::new();
        assert!(markers.is_wall_start(&line(";TYPE:External perimeter")));
        assert!(markers.is_wall_start(&line(";TYPE:Outer wall")));
        assert!(markers.is_wall_start(&line("; FEATURE: Outer wall")));
        assert!(!markers.is_wall_start(&line(";TYPE:Internal infill")));
        assert_eq!(
            markers.classify(&line(";TYPE:Internal infill")),
            Some(MarkerKind::FeatureBoundary)
        );
    }

    #[test]
    fn test_height_annotations() {
        let markers = MarkerSet::new();
        assert_relative_eq!(
            markers.layer_height_annotation(&line(";HEIGHT:0.25")).unwrap(),
            0.25
        );
        assert_relative_eq!(
            markers
                .layer_height_annotation(&line("; LAYER_HEIGHT: 0.16"))
                .unwrap(),
            0.16
        );
        assert!(markers.layer_height_annotation(&line(";HEIGHT:abc")).is_none());
    }

    #[test]
    fn test_pass_annotation_round_trips() {
        let markers = MarkerSet::new();
        assert_relative_eq!(
            markers
                .pass_height_annotation(&line("G1 Z0.500 ; pass 2 of 3 (0.100mm)"))
                .unwrap(),
            0.1
        );
        assert!(markers
            .pass_height_annotation(&line("G1 Z0.500 F600"))
            .is_none());
    }

    #[test]
    fn test_block_terminators() {
        let markers = MarkerSet::new();
        assert!(markers.ends_wall_block(&line(";TYPE:Internal infill")));
        assert!(markers.ends_wall_block(&line("; FEATURE: Inner wall")));
        assert!(markers.ends_wall_block(&line(";Z:1.25")));
        assert!(markers.ends_wall_block(&line("M991 S0 P0")));
        assert!(markers.ends_wall_block(&line("M106 S255")));
    }

    #[test]
    fn test_non_terminators() {
        let markers = MarkerSet::new();
        // Progress report and wall continuations stay inside the block.
        assert!(!markers.ends_wall_block(&line("M73 P42 R10")));
        assert!(!markers.ends_wall_block(&line("; FEATURE: Overhang wall")));
        assert!(!markers.ends_wall_block(&line("; FEATURE: Outer wall")));
        assert!(!markers.ends_wall_block(&line("G1 X1 Y2 E0.1")));
    }
}
