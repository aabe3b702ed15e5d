use crate::device::frame::TelemetryFrame;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// Controller phase of the record/persist cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    PreScanDelay,
    Recording,
    Persisting,
}

/// Snapshot published to the foreground after every batch or phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Progress {
    pub phase: Phase,
    /// Frames buffered since the last successful save.
    pub current: usize,
    /// Frames one sweep should produce.
    pub expected: usize,
}

/// Frames collected since the last successful persistence tick.
///
/// The serial listener only appends and the persistence step only drains;
/// both go through one mutex, and the progress count is republished under
/// that same lock so it always equals the buffered length.
pub struct AcquisitionBatch {
    frames: Mutex<Vec<TelemetryFrame>>,
    progress: watch::Sender<Progress>,
}

impl AcquisitionBatch {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            frames: Mutex::new(Vec::new()),
            progress,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> Progress {
        *self.progress.borrow()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends one frame and returns the new batch length.
    pub fn append(&self, frame: TelemetryFrame) -> usize {
        let mut frames = self.lock();
        frames.push(frame);
        self.publish_len(frames.len());
        frames.len()
    }

    /// Moves every buffered frame out for persistence.
    pub fn take(&self) -> Vec<TelemetryFrame> {
        let mut frames = self.lock();
        let drained = std::mem::take(&mut *frames);
        self.publish_len(0);
        drained
    }

    /// Puts frames from a failed save back in front of anything appended
    /// while the save was in flight. Returns the new batch length.
    pub fn restore(&self, mut earlier: Vec<TelemetryFrame>) -> usize {
        let mut frames = self.lock();
        earlier.append(&mut frames);
        *frames = earlier;
        self.publish_len(frames.len());
        frames.len()
    }

    /// Discards the buffer and returns how many frames were dropped.
    pub fn clear(&self) -> usize {
        let mut frames = self.lock();
        let dropped = frames.len();
        frames.clear();
        self.publish_len(0);
        dropped
    }

    pub(crate) fn publish_phase(&self, phase: Phase, expected: usize) {
        self.progress.send_modify(|progress| {
            progress.phase = phase;
            progress.expected = expected;
        });
    }

    fn publish_len(&self, current: usize) {
        self.progress
            .send_modify(|progress| progress.current = current);
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TelemetryFrame>> {
        // A panicked holder cannot leave the Vec half-written; keep the data.
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for AcquisitionBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize) -> TelemetryFrame {
        TelemetryFrame::extract(&format!("{{{}, 0, 1.0}}", index * 5)).unwrap()
    }

    #[test]
    fn append_publishes_length_as_progress() {
        let batch = AcquisitionBatch::new();
        let receiver = batch.subscribe();
        batch.append(frame(0));
        assert_eq!(batch.append(frame(1)), 2);
        assert_eq!(receiver.borrow().current, 2);
    }

    #[test]
    fn restore_keeps_arrival_order() {
        let batch = AcquisitionBatch::new();
        batch.append(frame(0));
        batch.append(frame(1));
        let in_flight = batch.take();
        assert!(batch.is_empty());

        batch.append(frame(2));
        assert_eq!(batch.restore(in_flight), 3);

        let frames = batch.take();
        assert_eq!(frames, vec![frame(0), frame(1), frame(2)]);
        assert_eq!(batch.progress().current, 0);
    }

    #[test]
    fn clear_reports_dropped_frames() {
        let batch = AcquisitionBatch::new();
        for index in 0..4 {
            batch.append(frame(index));
        }
        assert_eq!(batch.clear(), 4);
        assert_eq!(batch.progress().current, 0);
    }
}
