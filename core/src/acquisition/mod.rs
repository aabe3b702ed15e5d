pub mod batch;
pub mod clock;
pub mod controller;
pub mod ingest;

pub use batch::{AcquisitionBatch, Phase, Progress};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::AcquisitionController;
pub use ingest::{FrameIngest, IngestOutcome, SessionMonitor};
