//! Wall-segment rewriting - re-emission of one block as multiple passes.

use log::trace;

use crate::line::GcodeLine;
use crate::plan::{PassPlan, PassPolicy};
use crate::scan::WallSegment;

/// Tolerance for recognizing a Z field that re-asserts the entry height.
const Z_REASSERT_TOLERANCE: f64 = 1e-5;

/// Rewrite one wall segment according to its pass plan.
///
/// A single-pass plan with unit extrusion returns the block verbatim, so a
/// layer at or below the target height (and any already-rewritten file run
/// through again) survives untouched. For a multi-pass plan, each pass
/// repeats the block's geometry at its own Z with every extrusion delta
/// scaled by the plan's multiplier; total extruded volume is conserved.
pub fn rewrite_segment(
    segment: &WallSegment<'_>,
    plan: &PassPlan,
    policy: PassPolicy,
    travel_feedrate: f64,
) -> Vec<String> {
    if plan.passes == 1 && plan.extrusion_multiplier == 1.0 {
        return segment.lines.iter().map(|l| l.raw().to_owned()).collect();
    }

    let mut out = Vec::with_capacity(segment.lines.len() * plan.passes as usize + plan.passes as usize * 2);
    for pass in 0..plan.passes {
        // After a full perimeter the nozzle is back near the block's start,
        // but every pass after the first must return there explicitly before
        // redrawing the outline at its new height.
        if pass > 0 {
            if let Some((x, y)) = segment.entry_xy {
                out.push(format!(
                    "G1 X{x:.3} Y{y:.3} F{travel_feedrate:.0} ; travel back to start"
                ));
            }
        }

        let pass_z = pass_z(segment, plan, policy, pass);
        trace!("pass {} of {} at z={:.3}", pass + 1, plan.passes, pass_z);
        // The pass height rides along in the annotation so a later run
        // recognizes already-split walls (see MarkerSet::pass_height_annotation).
        out.push(format!(
            "G1 Z{pass_z:.3} ; pass {} of {} ({:.3}mm)",
            pass + 1,
            plan.passes,
            plan.height_per_pass,
        ));

        for line in &segment.lines {
            match extrusion_delta(line) {
                Some(e) => {
                    let scaled = e * plan.extrusion_multiplier;
                    // Field is known present, so with_field cannot fail.
                    let mut rewritten = line
                        .with_field('E', scaled, 5)
                        .unwrap_or_else(|| (**line).clone());
                    rewritten = fix_reasserted_z(rewritten, segment.entry_z, pass_z);
                    out.push(rewritten.raw().to_owned());
                }
                None => out.push(line.raw().to_owned()),
            }
        }
    }
    out
}

/// Z height for one pass.
///
/// The fixed policy stacks upward from the block's entry Z. The adaptive
/// policy fills the layer's slab from below so the last pass finishes
/// exactly at the entry Z, preserving the apparent top-of-layer height.
fn pass_z(segment: &WallSegment<'_>, plan: &PassPlan, policy: PassPolicy, pass: u32) -> f64 {
    match policy {
        PassPolicy::Fixed => segment.entry_z + pass as f64 * plan.height_per_pass,
        PassPolicy::Adaptive => {
            (segment.entry_z - segment.entry_layer_height)
                + (pass + 1) as f64 * plan.height_per_pass
        }
    }
}

/// Extrusion delta of a motion line, if it carries one.
fn extrusion_delta(line: &GcodeLine) -> Option<f64> {
    if line.is_motion() {
        line.field('E')
    } else {
        None
    }
}

/// A line inside the block may silently re-assert the old layer height.
/// When its Z equals the entry Z and this pass prints at a different
/// height, the Z field is corrected to the pass height.
fn fix_reasserted_z(line: GcodeLine, entry_z: f64, pass_z: f64) -> GcodeLine {
    let Some(z) = line.field('Z') else { return line };
    if (z - entry_z).abs() < Z_REASSERT_TOLERANCE
        && format!("{pass_z:.5}") != format!("{entry_z:.5}")
    {
        if let Some(fixed) = line.with_field('Z', pass_z, 3) {
            return fixed;
        }
    }
    line
}
