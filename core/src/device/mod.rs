pub mod command;
pub mod frame;
pub mod link;

pub use command::ScanCommand;
pub use frame::TelemetryFrame;
pub use link::{DeviceLink, WriterLink};
