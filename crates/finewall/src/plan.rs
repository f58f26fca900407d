//! Pass planning - how many sub-passes a layer's outer wall splits into.
//!
//! Pure decision logic; the only side effect is diagnostic logging. The
//! fixed policy subdivides the nominal layer height exactly; the adaptive
//! policy works per layer (adaptive slicing varies layer heights) and may
//! decide that splitting is not worth it.

use log::debug;
use serde::{Deserialize, Serialize};

/// Pass-count policy. Which one applies depends on whether the slicer
/// printed the file with a uniform or an adaptive layer height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PassPolicy {
    /// Subdivide the nominal layer height from the file header into equal
    /// passes; one plan covers the whole file.
    Fixed,
    /// Decide per layer from its annotated height.
    #[default]
    Adaptive,
}

/// How the vertical motion and extrusion of one wall block are
/// redistributed across passes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassPlan {
    /// Number of passes (>= 1).
    pub passes: u32,
    /// Height of each pass (mm).
    pub height_per_pass: f64,
    /// Factor applied to every extrusion delta (1 / passes).
    pub extrusion_multiplier: f64,
}

impl PassPlan {
    /// Single unmodified pass: the block is re-emitted as-is.
    pub fn single(height: f64) -> Self {
        Self {
            passes: 1,
            height_per_pass: height,
            extrusion_multiplier: 1.0,
        }
    }

    fn split(passes: u32, layer_height: f64) -> Self {
        Self {
            passes,
            height_per_pass: layer_height / passes as f64,
            extrusion_multiplier: 1.0 / passes as f64,
        }
    }
}

/// Fixed-height policy: split the nominal layer height into
/// `round(base / target)` equal passes (at least one). The subdivision is
/// always exact: `passes * height_per_pass == base`.
pub fn fixed_plan(base_layer_height: f64, target_height: f64) -> PassPlan {
    let passes = (base_layer_height / target_height).round().max(1.0) as u32;
    PassPlan::split(passes, base_layer_height)
}

/// One way of splitting a layer, measured by how far its pass height lands
/// from the target.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    passes: u32,
    height: f64,
    deviation: f64,
}

impl Candidate {
    fn new(passes: u32, layer_height: f64, target_height: f64) -> Self {
        let height = layer_height / passes as f64;
        Self {
            passes,
            height,
            deviation: (height - target_height).abs(),
        }
    }
}

/// Rounding the pass count up and down gives the two split options for a
/// layer; the caller weighs their deviations against leaving it unsplit.
fn candidates(layer_height: f64, target_height: f64) -> (Candidate, Candidate) {
    let ratio = layer_height / target_height;
    let ceil = Candidate::new(ratio.ceil() as u32, layer_height, target_height);
    let floor = Candidate::new((ratio.floor() as u32).max(1), layer_height, target_height);
    (ceil, floor)
}

/// Adaptive policy: compare the current layer's actual height against the
/// target and pick whichever of {unsplit, ceil passes, floor passes} lands
/// closest to the target height.
///
/// A layer already at or below the target is re-emitted as a single pass:
/// splitting a layer thinner than desired has no surface-quality benefit.
/// On equal deviation the unsplit layer wins, and a ceil/floor tie picks
/// floor (fewer passes), since every extra pass costs travel and retraction.
pub fn adaptive_plan(layer_height: f64, target_height: f64) -> PassPlan {
    if layer_height <= target_height {
        return PassPlan::single(layer_height);
    }

    let (ceil, floor) = candidates(layer_height, target_height);
    let diff_original = (layer_height - target_height).abs();
    debug!(
        "options for {:.4}mm layer: {} passes of {:.4}mm (off {:.4}), \
         {} passes of {:.4}mm (off {:.4}), unsplit off {:.4}",
        layer_height,
        ceil.passes,
        ceil.height,
        ceil.deviation,
        floor.passes,
        floor.height,
        floor.deviation,
        diff_original
    );

    if diff_original <= ceil.deviation && diff_original <= floor.deviation {
        PassPlan::single(layer_height)
    } else if ceil.deviation < floor.deviation {
        PassPlan::split(ceil.passes, layer_height)
    } else {
        PassPlan::split(floor.passes, layer_height)
    }
}
