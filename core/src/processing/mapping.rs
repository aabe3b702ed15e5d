use crate::prelude::{ScanError, ScanResult};
use crate::processing::grid::IntensityGrid;
use crate::processing::normalization::GlobalRange;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transfer curve from normalized intensity to display intensity.
///
/// Values are not clamped: anything outside `[0, 1]` reaches the renderer
/// as-is, and `NaN` marks a cell the renderer must leave blank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingFunction {
    #[default]
    Linear,
    Sqrt,
    Square,
}

impl MappingFunction {
    pub fn apply(self, normalized: f64) -> f64 {
        match self {
            MappingFunction::Linear => normalized,
            MappingFunction::Sqrt => normalized.sqrt(),
            MappingFunction::Square => normalized * normalized,
        }
    }

    pub fn map_value(self, raw: f64, range: GlobalRange) -> f64 {
        self.apply(range.normalize(raw))
    }

    pub fn map_grid(self, grid: &IntensityGrid, range: GlobalRange) -> Array2<f64> {
        grid.cells().mapv(|raw| self.map_value(raw, range))
    }
}

impl fmt::Display for MappingFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MappingFunction::Linear => "linear",
            MappingFunction::Sqrt => "sqrt",
            MappingFunction::Square => "square",
        };
        f.write_str(name)
    }
}

impl FromStr for MappingFunction {
    type Err = ScanError;

    fn from_str(value: &str) -> ScanResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(MappingFunction::Linear),
            "sqrt" | "square root" | "square-root" => Ok(MappingFunction::Sqrt),
            "square" => Ok(MappingFunction::Square),
            other => Err(ScanError::InvalidConfig(format!(
                "unknown mapping function '{}'",
                other
            ))),
        }
    }
}

/// Converts a mapped value to an 8-bit gray level, clamping to `[0, 1]`.
/// `NaN` has no level and renders blank.
pub fn display_level(mapped: f64) -> Option<u8> {
    if mapped.is_nan() {
        return None;
    }
    Some((mapped.clamp(0.0, 1.0) * 255.0).round() as u8)
}
