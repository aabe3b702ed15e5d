use lightcore::processing::SampleTriplet;

/// Renders samples the way the scanner prints one row:
/// `{row, col, intensity}` joined by `, `.
pub fn format_row(samples: &[SampleTriplet]) -> String {
    samples
        .iter()
        .map(|sample| format!("{{{}, {}, {:.2}}}", sample.row, sample.col, sample.intensity))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_row_uses_triplet_joiner() {
        let row = format_row(&[
            SampleTriplet {
                row: 5,
                col: 0,
                intensity: 3.2,
            },
            SampleTriplet {
                row: 5,
                col: 5,
                intensity: 12.0,
            },
        ]);
        assert_eq!(row, "{5, 0, 3.20}, {5, 5, 12.00}");
    }
}
