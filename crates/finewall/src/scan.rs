//! Stream scanning and wall-block segmentation.
//!
//! A [`Scanner`] walks the parsed instruction stream once, tracking layer
//! and Z state in a [`Cursor`] and grouping each outer-wall block into a
//! [`WallSegment`] for the rewriter. Everything else is passed through
//! unchanged.

use log::debug;

use crate::line::GcodeLine;
use crate::marker::{MarkerKind, MarkerSet};

/// Lines inspected after a layer-change marker for a height annotation.
const HEIGHT_LOOKAHEAD: usize = 4;

/// Lines inspected before a wall block for its entry XY position.
const ENTRY_XY_LOOKBEHIND: usize = 10;

/// Scanning state threaded through one pass over the stream.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    /// Index of the layer currently being processed.
    pub layer: usize,
    /// Last seen absolute Z height (mm).
    pub z: f64,
    /// Height of the active layer (mm), from the per-layer annotation.
    /// Zero until the first annotation is seen.
    pub layer_height: f64,
}

/// A maximal contiguous run of lines forming one outer-wall block,
/// together with the cursor snapshot valid at its start. Created when a
/// wall-start marker is recognized and consumed immediately by the
/// rewriter.
#[derive(Debug)]
pub struct WallSegment<'a> {
    /// The block's lines, starting at the wall-start marker. The
    /// terminating marker is not part of the block.
    pub lines: Vec<&'a GcodeLine>,
    /// Absolute Z at the start of the block (mm).
    pub entry_z: f64,
    /// Height of the layer the block belongs to (mm).
    pub entry_layer_height: f64,
    /// Most recent XY position before the block, used for travel-back
    /// moves. `None` when no positioning move exists within the
    /// look-behind window; no travel-backs are emitted then.
    pub entry_xy: Option<(f64, f64)>,
}

/// What the scanner found at the current position.
#[derive(Debug)]
pub enum ScanEvent<'a> {
    /// A line copied unchanged to the output.
    Passthrough(&'a GcodeLine),
    /// A complete outer-wall block to be rewritten.
    Wall(WallSegment<'a>),
}

/// Single forward pass over the instruction stream.
pub struct Scanner<'a> {
    lines: &'a [GcodeLine],
    markers: &'a MarkerSet,
    idx: usize,
    cursor: Cursor,
}

impl<'a> Scanner<'a> {
    /// Create a scanner over a parsed stream.
    pub fn new(lines: &'a [GcodeLine], markers: &'a MarkerSet) -> Self {
        Self {
            lines,
            markers,
            idx: 0,
            cursor: Cursor {
                layer: 0,
                z: 0.0,
                layer_height: 0.0,
            },
        }
    }

    /// The current scanning state.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Absorb lines into a wall segment, starting at the wall-start marker
    /// under the scan index. Termination is lookahead-of-one: the current
    /// line is appended, then the following line decides whether the block
    /// ends. The terminator itself is left for the next scan step, so a new
    /// `;TYPE:` tag is re-examined as a potential wall start. A block that
    /// runs to end-of-file is still collected.
    fn collect_segment(&mut self) -> WallSegment<'a> {
        let start = self.idx;
        let mut lines = Vec::new();
        while self.idx < self.lines.len() {
            lines.push(&self.lines[self.idx]);
            self.idx += 1;
            match self.lines.get(self.idx) {
                Some(next) if self.markers.ends_wall_block(next) => break,
                Some(_) => {}
                None => break,
            }
        }

        // Most recent positioning move before the block fixes the entry XY.
        let mut entry_xy = None;
        let low = start.saturating_sub(ENTRY_XY_LOOKBEHIND);
        for line in self.lines[low..start].iter().rev() {
            if line.command() == Some("G1") {
                if let (Some(x), Some(y)) = (line.field('X'), line.field('Y')) {
                    entry_xy = Some((x, y));
                    break;
                }
            }
        }

        debug!(
            "wall block at layer {} (z={:.3}, {} lines, entry {:?})",
            self.cursor.layer,
            self.cursor.z,
            lines.len(),
            entry_xy
        );

        WallSegment {
            lines,
            entry_z: self.cursor.z,
            entry_layer_height: self.cursor.layer_height,
            entry_xy,
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = ScanEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.get(self.idx)?;

        if self.markers.classify(line) == Some(MarkerKind::LayerChange) {
            self.cursor.layer += 1;
            let window = &self.lines[self.idx + 1..(self.idx + 1 + HEIGHT_LOOKAHEAD).min(self.lines.len())];
            for look in window {
                if let Some(height) = self.markers.layer_height_annotation(look) {
                    if height != self.cursor.layer_height {
                        debug!("layer {} height {:.3}mm", self.cursor.layer, height);
                    }
                    self.cursor.layer_height = height;
                    break;
                }
            }
            self.idx += 1;
            return Some(ScanEvent::Passthrough(line));
        }

        if line.command() == Some("G1") {
            if let Some(z) = line.field('Z') {
                self.cursor.z = z;
                // A pass annotation from an earlier run overrides the
                // layer's height: the walls ahead are already sub-layers.
                if let Some(height) = self.markers.pass_height_annotation(line) {
                    self.cursor.layer_height = height;
                }
                self.idx += 1;
                return Some(ScanEvent::Passthrough(line));
            }
        }

        if self.markers.is_wall_start(line) {
            return Some(ScanEvent::Wall(self.collect_segment()));
        }

        self.idx += 1;
        Some(ScanEvent::Passthrough(line))
    }
}
