use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Spatial quantization factor of the reference scan: raw coordinates are
/// divided by this to obtain grid indices.
pub const GRID_STEP: usize = 5;

/// Y sweep handed to the scanner with each `TABLE` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParameters {
    pub min_y: u32,
    pub max_y: u32,
    pub step: u32,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            min_y: 0,
            max_y: 35,
            step: 5,
        }
    }
}

impl ScanParameters {
    pub fn validate(&self) -> ScanResult<()> {
        if self.step == 0 {
            return Err(ScanError::InvalidConfig("scan step must be positive".into()));
        }
        if self.max_y < self.min_y {
            return Err(ScanError::InvalidConfig(format!(
                "max_y {} is below min_y {}",
                self.max_y, self.min_y
            )));
        }
        Ok(())
    }

    /// Number of frames one complete sweep produces; the progress denominator.
    pub fn expected_samples(&self) -> usize {
        ((self.max_y - self.min_y) / self.step) as usize + 1
    }
}

/// Timing and sweep configuration for the acquisition controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub scan: ScanParameters,
    /// Delay between `start` and the first recording phase.
    pub initial_delay: Duration,
    /// Recording time before the batch is persisted.
    pub record_interval: Duration,
    /// Delay between a persistence tick and the next recording phase.
    pub cycle_delay: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            scan: ScanParameters::default(),
            initial_delay: Duration::ZERO,
            record_interval: Duration::from_secs(2 * 60),
            cycle_delay: Duration::from_secs(30 * 60),
        }
    }
}

/// Common error type for the acquisition and reconstruction core.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("device failure: {0}")]
    Device(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("cannot reconstruct grid, line {line} ({content:?}): {reason}")]
    Reconstruction {
        line: usize,
        content: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("view '{0}' is already open")]
    AlreadyRegistered(String),
    #[error("unknown view {0}")]
    UnknownView(u64),
}

pub type ScanResult<T> = Result<T, ScanError>;
