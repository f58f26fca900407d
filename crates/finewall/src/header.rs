//! Slicer header metadata extraction.
//!
//! Slicers emit their full configuration as `; key = value` comment lines.
//! Only two fields matter here: the nominal layer height and, for the
//! adaptive policy's target fallback, the minimum layer height.

use regex::Regex;

use crate::line::GcodeLine;

/// Nominal layer height declared in the header comments, if present.
pub fn layer_height(lines: &[GcodeLine]) -> Option<f64> {
    find_field(lines, r"layer_height")
}

/// Minimum layer height declared in the header comments, if present.
pub fn min_layer_height(lines: &[GcodeLine]) -> Option<f64> {
    find_field(lines, r"min_layer_height")
}

/// Scan comment lines for the first `; <key> = <number>` declaration.
/// Case-insensitive; accepts integer or decimal literals.
fn find_field(lines: &[GcodeLine], key: &str) -> Option<f64> {
    let pattern = Regex::new(&format!(r"(?i);\s*{key}\s*=\s*([0-9]*\.?[0-9]+)")).unwrap();
    lines.iter().filter(|l| l.is_comment()).find_map(|l| {
        let caps = pattern.captures(l.raw())?;
        caps.get(1)?.as_str().parse().ok()
    })
}
