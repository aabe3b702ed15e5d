use crate::math::stats::StatsHelper;
use crate::prelude::{ScanError, ScanResult};
use crate::processing::grid::IntensityGrid;
use crate::processing::mapping::MappingFunction;
use crate::telemetry::log::LogManager;
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Opaque identifier of a registered view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ViewHandle(u64);

impl ViewHandle {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Intensity bounds across every registered grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalRange {
    pub max: f64,
    pub min: f64,
}

impl GlobalRange {
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// `(raw - min) / (max - min)`; a zero-width range yields `NaN`.
    pub fn normalize(&self, raw: f64) -> f64 {
        let width = self.width();
        if width == 0.0 {
            return f64::NAN;
        }
        (raw - self.min) / width
    }
}

/// Receives the fresh global range after every membership change.
pub trait RangeObserver: Send {
    fn range_changed(&mut self, handle: ViewHandle, range: GlobalRange);
}

impl<F> RangeObserver for F
where
    F: FnMut(ViewHandle, GlobalRange) + Send,
{
    fn range_changed(&mut self, handle: ViewHandle, range: GlobalRange) {
        self(handle, range)
    }
}

struct RegisteredView {
    label: String,
    grid: IntensityGrid,
    observer: Box<dyn RangeObserver>,
}

/// Registry of open views and the global range derived from their union.
///
/// The range is recomputed from every registered grid on each membership
/// change, never adjusted incrementally, so removing a view can retract an
/// extremum it contributed.
pub struct NormalizationCoordinator {
    views: BTreeMap<ViewHandle, RegisteredView>,
    next_id: u64,
    range: Option<GlobalRange>,
    logger: LogManager,
}

impl NormalizationCoordinator {
    pub fn new() -> Self {
        Self {
            views: BTreeMap::new(),
            next_id: 1,
            range: None,
            logger: LogManager::new("views"),
        }
    }

    /// Adds a view and notifies every registered view, the new one included.
    /// A label that is already open is refused, so no grid is counted twice.
    pub fn register<O>(
        &mut self,
        label: impl Into<String>,
        grid: IntensityGrid,
        observer: O,
    ) -> ScanResult<ViewHandle>
    where
        O: RangeObserver + 'static,
    {
        let label = label.into();
        if self.find(&label).is_some() {
            return Err(ScanError::AlreadyRegistered(label));
        }

        let handle = ViewHandle(self.next_id);
        self.next_id += 1;
        self.logger.record(&format!(
            "opened view {} '{}' ({}x{})",
            handle,
            label,
            grid.rows(),
            grid.cols()
        ));
        self.views.insert(
            handle,
            RegisteredView {
                label,
                grid,
                observer: Box::new(observer),
            },
        );

        self.recompute();
        self.notify();
        Ok(handle)
    }

    /// Removes a view and hands its grid back. Survivors are notified; when
    /// the last view closes the range becomes absent and nobody is notified.
    pub fn unregister(&mut self, handle: ViewHandle) -> ScanResult<IntensityGrid> {
        let view = self
            .views
            .remove(&handle)
            .ok_or(ScanError::UnknownView(handle.id()))?;
        self.logger
            .record(&format!("closed view {} '{}'", handle, view.label));

        self.recompute();
        self.notify();
        Ok(view.grid)
    }

    /// Rebuilds the global range from scratch over all registered grids.
    pub fn recompute(&mut self) -> Option<GlobalRange> {
        let extent = self
            .views
            .values()
            .fold(None, |acc, view| StatsHelper::merge(acc, view.grid.extent()));
        self.range = extent.map(|extent| GlobalRange {
            max: extent.max,
            min: extent.min,
        });

        match self.range {
            Some(range) => self.logger.record(&format!(
                "global intensity max {} min {} over {} view(s)",
                range.max,
                range.min,
                self.views.len()
            )),
            None => self.logger.record("no views open, global range cleared"),
        }
        self.range
    }

    fn notify(&mut self) {
        let Some(range) = self.range else {
            return;
        };
        for (handle, view) in self.views.iter_mut() {
            view.observer.range_changed(*handle, range);
        }
    }

    pub fn range(&self) -> Option<GlobalRange> {
        self.range
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn handles(&self) -> Vec<ViewHandle> {
        self.views.keys().copied().collect()
    }

    pub fn find(&self, label: &str) -> Option<ViewHandle> {
        self.views
            .iter()
            .find(|(_, view)| view.label == label)
            .map(|(handle, _)| *handle)
    }

    pub fn label(&self, handle: ViewHandle) -> Option<&str> {
        self.views.get(&handle).map(|view| view.label.as_str())
    }

    pub fn grid(&self, handle: ViewHandle) -> Option<&IntensityGrid> {
        self.views.get(&handle).map(|view| &view.grid)
    }

    /// The view's raw grid mapped through the current global range.
    pub fn mapped(&self, handle: ViewHandle, mapping: MappingFunction) -> ScanResult<Array2<f64>> {
        let view = self
            .views
            .get(&handle)
            .ok_or(ScanError::UnknownView(handle.id()))?;
        let range = self
            .range
            .ok_or_else(|| ScanError::InvalidState("no global range while a view is open".into()))?;
        Ok(mapping.map_grid(&view.grid, range))
    }
}

impl Default for NormalizationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
