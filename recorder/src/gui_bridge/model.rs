use lightcore::prelude::ScanResult;
use lightcore::processing::{
    display_level, GlobalRange, GridReconstructor, IntensityGrid, MappingFunction,
    NormalizationCoordinator, ViewHandle,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Renderer-neutral state of one open view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewModel {
    pub id: ViewHandle,
    pub label: String,
    pub rows: usize,
    pub cols: usize,
    /// Last range this view was notified with.
    pub range: Option<GlobalRange>,
    pub mapping: MappingFunction,
    /// Raw intensities, row-major.
    pub raw: Vec<Vec<f64>>,
    /// Mapped values; `NaN` serializes as `null`.
    pub mapped: Vec<Vec<f64>>,
    /// 8-bit gray levels; `None` is a blank cell.
    pub levels: Vec<Vec<Option<u8>>>,
}

type RangeInbox = Arc<Mutex<BTreeMap<ViewHandle, GlobalRange>>>;

/// The set of open views: reconstructs batches, registers them with the
/// coordinator and keeps what each view was last told about the range.
pub struct ViewDesk {
    coordinator: NormalizationCoordinator,
    reconstructor: GridReconstructor,
    mapping: MappingFunction,
    received: RangeInbox,
}

impl ViewDesk {
    pub fn new(grid_step: usize, mapping: MappingFunction) -> ScanResult<Self> {
        Ok(Self {
            coordinator: NormalizationCoordinator::new(),
            reconstructor: GridReconstructor::new(grid_step)?,
            mapping,
            received: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    /// Opens a view over a stored batch. A batch that fails to reconstruct
    /// is refused without disturbing the views already open.
    pub fn open(&mut self, label: &str, lines: &[String]) -> ScanResult<ViewHandle> {
        let grid = self.reconstructor.reconstruct(lines)?;
        self.register(label, grid)
    }

    /// Reconstructor matching this desk's grid step, for callers that build
    /// the grid outside the desk lock.
    pub fn reconstructor(&self) -> GridReconstructor {
        self.reconstructor
    }

    pub fn register(&mut self, label: &str, grid: IntensityGrid) -> ScanResult<ViewHandle> {
        let inbox = self.received.clone();
        self.coordinator
            .register(label, grid, move |handle: ViewHandle, range: GlobalRange| {
                if let Ok(mut received) = inbox.lock() {
                    received.insert(handle, range);
                }
            })
    }

    pub fn close(&mut self, handle: ViewHandle) -> ScanResult<()> {
        self.coordinator.unregister(handle)?;
        if let Ok(mut received) = self.received.lock() {
            received.remove(&handle);
        }
        Ok(())
    }

    pub fn handles(&self) -> Vec<ViewHandle> {
        self.coordinator.handles()
    }

    pub fn range(&self) -> Option<GlobalRange> {
        self.coordinator.range()
    }

    pub fn set_mapping(&mut self, mapping: MappingFunction) {
        self.mapping = mapping;
    }

    pub fn view(&self, handle: ViewHandle) -> ScanResult<ViewModel> {
        let mapped = self.coordinator.mapped(handle, self.mapping)?;
        let label = self.coordinator.label(handle).unwrap_or_default().to_string();
        let raw = self
            .coordinator
            .grid(handle)
            .map(|grid| grid.cells().rows().into_iter().map(|row| row.to_vec()).collect())
            .unwrap_or_default();
        let levels = mapped
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&value| display_level(value)).collect())
            .collect();
        let range = self
            .received
            .lock()
            .ok()
            .and_then(|received| received.get(&handle).copied());

        Ok(ViewModel {
            id: handle,
            label,
            rows: mapped.nrows(),
            cols: mapped.ncols(),
            range,
            mapping: self.mapping,
            raw,
            mapped: mapped.rows().into_iter().map(|row| row.to_vec()).collect(),
            levels,
        })
    }

    pub fn snapshot(&self) -> Vec<ViewModel> {
        self.handles()
            .into_iter()
            .filter_map(|handle| self.view(handle).ok())
            .collect()
    }
}

const SHADES: &[u8] = b" .:-=+*#%@";

/// Text rendering of a view: one shade character per cell, `?` for blank.
pub fn render_shades(model: &ViewModel) -> String {
    model
        .levels
        .iter()
        .map(|row| {
            row.iter()
                .map(|level| match level {
                    Some(level) => {
                        let index = *level as usize * (SHADES.len() - 1) / 255;
                        SHADES[index] as char
                    }
                    None => '?',
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
