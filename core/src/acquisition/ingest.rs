use crate::acquisition::batch::{AcquisitionBatch, Progress};
use crate::device::frame::TelemetryFrame;
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// State shared between the controller, the serial listener and observers.
pub(crate) struct SessionShared {
    pub(crate) batch: AcquisitionBatch,
    pub(crate) collecting: AtomicBool,
    pub(crate) metrics: MetricsRecorder,
}

impl SessionShared {
    pub(crate) fn new() -> Self {
        Self {
            batch: AcquisitionBatch::new(),
            collecting: AtomicBool::new(false),
            metrics: MetricsRecorder::new(),
        }
    }
}

/// What happened to one raw telemetry line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Frame buffered; carries the new batch length.
    Accepted(usize),
    /// No `{...}` pair in the line.
    NoFrame,
    /// No sweep in progress, the line was ignored.
    NotRecording,
}

/// Handle given to the serial listener. Never blocks on the foreground.
#[derive(Clone)]
pub struct FrameIngest {
    shared: Arc<SessionShared>,
    logger: LogManager,
}

impl FrameIngest {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self {
            shared,
            logger: LogManager::new("ingest"),
        }
    }

    pub fn ingest_line(&self, line: &str) -> IngestOutcome {
        if !self.shared.collecting.load(Ordering::Acquire) {
            self.shared.metrics.record_dropped();
            self.logger
                .detail(&format!("not recording, ignoring line {:?}", line.trim_end()));
            return IngestOutcome::NotRecording;
        }

        match TelemetryFrame::extract(line) {
            Some(frame) => {
                self.logger.detail(&format!("frame received: {}", frame));
                let count = self.shared.batch.append(frame);
                self.shared.metrics.record_accepted();
                IngestOutcome::Accepted(count)
            }
            None => {
                self.shared.metrics.record_dropped();
                self.logger
                    .detail(&format!("no frame in line {:?}", line.trim_end()));
                IngestOutcome::NoFrame
            }
        }
    }
}

/// Read-only view of a running session for the foreground.
#[derive(Clone)]
pub struct SessionMonitor {
    shared: Arc<SessionShared>,
}

impl SessionMonitor {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    pub fn progress(&self) -> Progress {
        self.shared.batch.progress()
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.shared.batch.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_ingest() -> (FrameIngest, Arc<SessionShared>) {
        let shared = Arc::new(SessionShared::new());
        shared.collecting.store(true, Ordering::Release);
        (FrameIngest::new(shared.clone()), shared)
    }

    #[test]
    fn ingest_buffers_frames_and_skips_noise() {
        let (ingest, shared) = recording_ingest();
        assert_eq!(ingest.ingest_line("{0, 0, 1.0}\r\n"), IngestOutcome::Accepted(1));
        assert_eq!(ingest.ingest_line("scanner ready"), IngestOutcome::NoFrame);
        assert_eq!(ingest.ingest_line("x{5, 0, 2.0}y"), IngestOutcome::Accepted(2));

        let metrics = shared.metrics.snapshot();
        assert_eq!(metrics.frames_accepted, 2);
        assert_eq!(metrics.lines_dropped, 1);
        assert_eq!(shared.batch.progress().current, 2);
    }

    #[test]
    fn session_between_sweeps_accepts_nothing() {
        let shared = Arc::new(SessionShared::new());
        let ingest = FrameIngest::new(shared.clone());
        assert_eq!(ingest.ingest_line("{0, 0, 1.0}"), IngestOutcome::NotRecording);
        assert!(shared.batch.is_empty());
    }

    #[test]
    fn concurrent_listeners_lose_no_frames() {
        let (ingest, shared) = recording_ingest();
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let ingest = ingest.clone();
                std::thread::spawn(move || {
                    for row in 0..50 {
                        ingest.ingest_line(&format!("{{{}, {}, 1.0}}", row * 5, worker * 5));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        for _ in 0..10 {
            drained.extend(shared.batch.take());
        }
        for worker in workers {
            worker.join().unwrap();
        }
        drained.extend(shared.batch.take());

        assert_eq!(drained.len(), 200);
        assert_eq!(SessionMonitor::new(shared).metrics().frames_accepted, 200);
    }
}
