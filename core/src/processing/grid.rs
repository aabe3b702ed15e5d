use crate::math::stats::{Extent, StatsHelper};
use crate::prelude::{ScanError, ScanResult, GRID_STEP};
use crate::telemetry::log::LogManager;
use ndarray::{Array2, ArrayView2};

/// Literal separator between triplets sharing one stored line.
const TRIPLET_JOINER: &str = "}, {";

/// Largest grid a batch may describe. Coordinates beyond it are treated as
/// a corrupted batch instead of an allocation request.
pub const MAX_GRID_CELLS: usize = 1 << 22;

/// One `(row, col, intensity)` sample in raw scanner coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTriplet {
    pub row: usize,
    pub col: usize,
    pub intensity: f64,
}

/// Dense intensity grid rebuilt from one stored batch.
///
/// Dimensions are fixed at construction; unobserved cells hold `0.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityGrid {
    cells: Array2<f64>,
    step: usize,
}

impl IntensityGrid {
    pub fn rows(&self) -> usize {
        self.cells.nrows()
    }

    pub fn cols(&self) -> usize {
        self.cells.ncols()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Cell at grid indices.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells.get((row, col)).copied()
    }

    /// Cell holding the raw scanner coordinate `(row, col)`.
    pub fn at_coordinate(&self, row: usize, col: usize) -> Option<f64> {
        self.get(row / self.step, col / self.step)
    }

    pub fn cells(&self) -> ArrayView2<'_, f64> {
        self.cells.view()
    }

    pub fn extent(&self) -> Option<Extent> {
        StatsHelper::extent(self.cells.iter())
    }
}

/// Two-pass sparse-to-dense reconstruction.
///
/// The sizing pass must see every triplet before the fill pass can index,
/// so a single malformed triplet fails the whole batch.
#[derive(Debug, Clone, Copy)]
pub struct GridReconstructor {
    step: usize,
    logger: LogManager,
}

impl GridReconstructor {
    pub fn new(step: usize) -> ScanResult<Self> {
        if step == 0 {
            return Err(ScanError::InvalidConfig("grid step must be positive".into()));
        }
        Ok(Self {
            step,
            logger: LogManager::new("grid"),
        })
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn reconstruct<S: AsRef<str>>(&self, lines: &[S]) -> ScanResult<IntensityGrid> {
        // (largest coordinate, index of the line holding it)
        let mut max_row = (0, 0);
        let mut max_col = (0, 0);
        for (index, line) in lines.iter().enumerate() {
            for fields in triplet_fields(line.as_ref()) {
                let (row, col) = parse_coordinates(&fields)
                    .map_err(|reason| reconstruction_error(index, line.as_ref(), reason))?;
                if row > max_row.0 {
                    max_row = (row, index);
                }
                if col > max_col.0 {
                    max_col = (col, index);
                }
            }
        }

        let shape = (
            (max_row.0 / self.step).saturating_add(1),
            (max_col.0 / self.step).saturating_add(1),
        );
        match shape.0.checked_mul(shape.1) {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => {
                let index = if shape.0 >= shape.1 { max_row.1 } else { max_col.1 };
                let content = lines.get(index).map(|line| line.as_ref()).unwrap_or_default();
                return Err(reconstruction_error(
                    index,
                    content,
                    format!(
                        "{}x{} grid exceeds the {} cell limit",
                        shape.0, shape.1, MAX_GRID_CELLS
                    ),
                ));
            }
        }
        let mut cells = Array2::<f64>::zeros(shape);
        let mut written = Array2::<bool>::from_elem(shape, false);
        let mut overwrites = 0usize;

        for (index, line) in lines.iter().enumerate() {
            for fields in triplet_fields(line.as_ref()) {
                let triplet = parse_triplet(&fields)
                    .map_err(|reason| reconstruction_error(index, line.as_ref(), reason))?;
                let cell = (triplet.row / self.step, triplet.col / self.step);
                if written[cell] {
                    overwrites += 1;
                }
                written[cell] = true;
                cells[cell] = triplet.intensity;
            }
        }

        if overwrites > 0 {
            self.logger.detail(&format!(
                "{} samples overwrote an earlier sample in the same cell",
                overwrites
            ));
        }
        self.logger.detail(&format!(
            "reconstructed {}x{} grid from {} lines",
            shape.0,
            shape.1,
            lines.len()
        ));

        Ok(IntensityGrid {
            cells,
            step: self.step,
        })
    }
}

impl Default for GridReconstructor {
    fn default() -> Self {
        Self {
            step: GRID_STEP,
            logger: LogManager::new("grid"),
        }
    }
}

fn triplet_fields(line: &str) -> impl Iterator<Item = Vec<&str>> {
    line.split(TRIPLET_JOINER)
        .map(|chunk| chunk.trim_matches(|c: char| c == '{' || c == '}' || c.is_whitespace()))
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| chunk.split(',').map(str::trim).collect())
}

fn parse_coordinates(fields: &[&str]) -> Result<(usize, usize), String> {
    if fields.len() < 3 {
        return Err(format!(
            "expected row, col, intensity but found {} field(s)",
            fields.len()
        ));
    }
    let row = fields[0]
        .parse::<usize>()
        .map_err(|_| format!("row '{}' is not a non-negative integer", fields[0]))?;
    let col = fields[1]
        .parse::<usize>()
        .map_err(|_| format!("col '{}' is not a non-negative integer", fields[1]))?;
    Ok((row, col))
}

fn parse_triplet(fields: &[&str]) -> Result<SampleTriplet, String> {
    let (row, col) = parse_coordinates(fields)?;
    let intensity = fields[2]
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("intensity '{}' is not a finite number", fields[2]))?;
    Ok(SampleTriplet {
        row,
        col,
        intensity,
    })
}

fn reconstruction_error(index: usize, line: &str, reason: String) -> ScanError {
    ScanError::Reconstruction {
        line: index + 1,
        content: line.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstructs_reference_line() {
        let grid = GridReconstructor::new(5)
            .unwrap()
            .reconstruct(&["{0, 0, 12.5}, {0, 5, 7.0}, {5, 0, 3.2}"])
            .unwrap();

        assert_eq!((grid.rows(), grid.cols()), (2, 2));
        assert_eq!(grid.get(0, 0), Some(12.5));
        assert_eq!(grid.get(0, 1), Some(7.0));
        assert_eq!(grid.get(1, 0), Some(3.2));
        assert_eq!(grid.get(1, 1), Some(0.0));
    }

    #[test]
    fn readback_returns_last_written_intensity() {
        let lines = [
            "{0, 0, 1.0}, {10, 15, 4.0}",
            "{5, 5, 2.0}",
            "{10, 15, 9.5}, {0, 0, -3.0}",
        ];
        let grid = GridReconstructor::default().reconstruct(&lines).unwrap();

        assert_eq!((grid.rows(), grid.cols()), (3, 4));
        assert_eq!(grid.at_coordinate(0, 0), Some(-3.0));
        assert_eq!(grid.at_coordinate(5, 5), Some(2.0));
        assert_eq!(grid.at_coordinate(10, 15), Some(9.5));
    }

    #[test]
    fn sizing_sees_maxima_from_any_line() {
        let lines = ["{0, 20, 1.0}", "{35, 0, 2.0}"];
        let grid = GridReconstructor::default().reconstruct(&lines).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (8, 5));
        assert_eq!(grid.at_coordinate(35, 0), Some(2.0));
    }

    #[test]
    fn blank_lines_are_skipped_and_empty_batch_is_single_cell() {
        let grid = GridReconstructor::default()
            .reconstruct(&["", "   ", "{0, 5, 1.5}"])
            .unwrap();
        assert_eq!((grid.rows(), grid.cols()), (1, 2));

        let empty: [&str; 0] = [];
        let grid = GridReconstructor::default().reconstruct(&empty).unwrap();
        assert_eq!((grid.rows(), grid.cols()), (1, 1));
        assert_eq!(grid.get(0, 0), Some(0.0));
    }

    #[test]
    fn short_triplet_fails_whole_batch_naming_the_line() {
        let lines = ["{0, 0, 1.0}", "{0, 5}"];
        let err = GridReconstructor::default().reconstruct(&lines).unwrap_err();
        match err {
            ScanError::Reconstruction { line, content, .. } => {
                assert_eq!(line, 2);
                assert_eq!(content, "{0, 5}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_numeric_fields_are_rejected() {
        let reconstructor = GridReconstructor::default();
        assert!(reconstructor.reconstruct(&["{a, 0, 1.0}"]).is_err());
        assert!(reconstructor.reconstruct(&["{0, -5, 1.0}"]).is_err());
        assert!(reconstructor.reconstruct(&["{0, 0, bright}"]).is_err());
        assert!(reconstructor.reconstruct(&["{0, 0, NaN}"]).is_err());
    }

    #[test]
    fn oversized_coordinates_fail_without_allocating() {
        let lines = [
            "{0, 0, 1.0}",
            "{18446744073709551615, 18446744073709551615, 1.0}",
        ];
        let err = GridReconstructor::default().reconstruct(&lines).unwrap_err();
        match err {
            ScanError::Reconstruction { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("cell limit"));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let wide = ["{0, 0, 1.0}", "{5, 0, 2.0}", "{0, 10000000000, 3.0}"];
        let err = GridReconstructor::default().reconstruct(&wide).unwrap_err();
        assert!(matches!(err, ScanError::Reconstruction { line: 3, .. }));
    }

    #[test]
    fn grid_at_the_cell_limit_is_built() {
        let side = 1 << 11;
        let corner = format!("{{{}, {}, 1.0}}", (side - 1) * 5, (side - 1) * 5);
        let grid = GridReconstructor::default().reconstruct(&[corner]).unwrap();
        assert_eq!(grid.rows() * grid.cols(), MAX_GRID_CELLS);
    }

    #[test]
    fn zero_step_is_invalid() {
        assert!(matches!(
            GridReconstructor::new(0),
            Err(ScanError::InvalidConfig(_))
        ));
    }
}
