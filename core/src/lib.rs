//! Core of the light-scan tracker.
//!
//! Acquires bracketed telemetry frames from a scanning device, persists them
//! in timed batches, rebuilds stored batches into dense intensity grids and
//! keeps every open grid view normalized against one shared global range.

pub mod acquisition;
pub mod device;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod storage;
pub mod telemetry;

pub use prelude::{AcquisitionConfig, ScanError, ScanParameters, ScanResult, GRID_STEP};
