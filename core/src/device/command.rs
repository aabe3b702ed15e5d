use crate::prelude::{ScanParameters, ScanResult};
use std::fmt;

/// `TABLE,<minY>,<maxY>,<stepHint>` sweep request understood by the scanner.
///
/// The step sent here is advisory for the device; grid indexing always uses
/// the reconstructor's own step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCommand {
    params: ScanParameters,
}

impl ScanCommand {
    pub fn new(params: ScanParameters) -> ScanResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> ScanParameters {
        self.params
    }

    pub fn expected_samples(&self) -> usize {
        self.params.expected_samples()
    }

    /// Parses a command line back into its parameters, as a scanner would.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(',').map(str::trim);
        if fields.next()? != "TABLE" {
            return None;
        }
        let min_y = fields.next()?.parse().ok()?;
        let max_y = fields.next()?.parse().ok()?;
        let step = fields.next()?.parse().ok()?;
        Self::new(ScanParameters { min_y, max_y, step }).ok()
    }
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TABLE,{},{},{}",
            self.params.min_y, self.params.max_y, self.params.step
        )
    }
}
