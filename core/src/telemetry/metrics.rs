use serde::Serialize;
use std::sync::Mutex;

/// Counters shared by the controller and the serial ingest path.
pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_accepted: usize,
    pub lines_dropped: usize,
    pub batches_saved: usize,
    pub save_failures: usize,
    pub device_failures: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_accepted(&self) {
        self.update(|metrics| metrics.frames_accepted += 1);
    }

    pub fn record_dropped(&self) {
        self.update(|metrics| metrics.lines_dropped += 1);
    }

    pub fn record_saved(&self) {
        self.update(|metrics| metrics.batches_saved += 1);
    }

    pub fn record_save_failure(&self) {
        self.update(|metrics| metrics.save_failures += 1);
    }

    pub fn record_device_failure(&self) {
        self.update(|metrics| metrics.device_failures += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
