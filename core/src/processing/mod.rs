pub mod grid;
pub mod mapping;
pub mod normalization;

pub use grid::{GridReconstructor, IntensityGrid, SampleTriplet, MAX_GRID_CELLS};
pub use mapping::{display_level, MappingFunction};
pub use normalization::{GlobalRange, NormalizationCoordinator, RangeObserver, ViewHandle};
