//! Layer index to percentage-of-depth coordinates.

use crate::models::AnalyzerKind;
use serde::{Deserialize, Serialize};

/// One point of a curve drawn against percentage depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub depth_percent: f64,
    pub value: f64,
}

/// One analyzer's curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerCurve {
    pub analyzer: AnalyzerKind,
    pub points: Vec<CurvePoint>,
}

/// Spread `len` layers evenly over 0..=100: the first layer maps to 0 and
/// the last to 100. A single layer sits at 0.
pub fn depth_percent(index: usize, len: usize) -> f64 {
    if len <= 1 {
        0.0
    } else {
        100.0 * index as f64 / (len - 1) as f64
    }
}

/// Display coordinate for a single sequence: layer `i` of `len` sits at
/// `100 * (i + 1) / len`, so the deepest layer is always at 100.
pub fn ordinal_depth_percent(index: usize, len: usize) -> f64 {
    if len == 0 {
        0.0
    } else {
        100.0 * (index + 1) as f64 / len as f64
    }
}

/// Pair every value with its [`ordinal_depth_percent`].
pub fn ordinal_curve(values: &[f64]) -> Vec<CurvePoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| CurvePoint {
            depth_percent: ordinal_depth_percent(i, values.len()),
            value,
        })
        .collect()
}
