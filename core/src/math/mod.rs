pub mod stats;

pub use stats::{Extent, StatsHelper};
