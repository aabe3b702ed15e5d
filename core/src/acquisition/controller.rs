use crate::acquisition::batch::{Phase, Progress};
use crate::acquisition::clock::{Clock, SystemClock};
use crate::acquisition::ingest::{FrameIngest, SessionMonitor, SessionShared};
use crate::device::command::ScanCommand;
use crate::device::link::DeviceLink;
use crate::prelude::{AcquisitionConfig, ScanError, ScanResult};
use crate::storage::BatchSink;
use crate::telemetry::log::LogManager;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Drives the delay -> record -> persist cycle.
///
/// There are no timer callbacks: the owner calls [`poll`](Self::poll)
/// periodically and the controller decides from its current phase and
/// deadline what to do next. Each transition disarms the elapsed deadline
/// and arms the next one before touching the device or the sink.
///
/// Frames are collected from the moment the scan command goes out until the
/// persistence step completes; lines arriving between sweeps are ignored.
pub struct AcquisitionController<L, S, C = SystemClock> {
    config: AcquisitionConfig,
    link: L,
    sink: S,
    clock: C,
    phase: Phase,
    deadline: Option<Duration>,
    expected: usize,
    shared: Arc<SessionShared>,
    logger: LogManager,
}

impl<L, S, C> AcquisitionController<L, S, C>
where
    L: DeviceLink,
    S: BatchSink,
    C: Clock,
{
    pub fn new(config: AcquisitionConfig, link: L, sink: S, clock: C) -> ScanResult<Self> {
        config.scan.validate()?;
        Ok(Self {
            config,
            link,
            sink,
            clock,
            phase: Phase::Idle,
            deadline: None,
            expected: 0,
            shared: Arc::new(SessionShared::new()),
            logger: LogManager::new("acquisition"),
        })
    }

    /// Handle for the serial listener thread.
    pub fn ingest(&self) -> FrameIngest {
        FrameIngest::new(self.shared.clone())
    }

    pub fn monitor(&self) -> SessionMonitor {
        SessionMonitor::new(self.shared.clone())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn progress(&self) -> Progress {
        self.shared.batch.progress()
    }

    pub fn pending_frames(&self) -> usize {
        self.shared.batch.len()
    }

    /// Time left until the next transition, if one is armed.
    pub fn time_to_next(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_sub(self.clock.monotonic()))
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Arms the cycle. Stale frames are dropped and progress restarts at 0.
    pub fn start(&mut self) -> ScanResult<()> {
        if self.phase != Phase::Idle {
            return Err(ScanError::InvalidState(format!(
                "acquisition already running ({:?})",
                self.phase
            )));
        }

        let stale = self.shared.batch.clear();
        if stale > 0 {
            self.logger
                .warn(&format!("discarded {} stale frames on start", stale));
        }
        self.expected = 0;
        self.arm(Phase::PreScanDelay, self.config.initial_delay);
        self.logger.record(&format!(
            "armed, first sweep in {}s",
            self.config.initial_delay.as_secs()
        ));
        Ok(())
    }

    /// Hard transition to idle from any phase. The unsaved buffer is
    /// discarded; returns how many frames were lost.
    pub fn stop(&mut self) -> usize {
        if self.phase == Phase::Idle {
            return 0;
        }

        self.deadline = None;
        self.shared.collecting.store(false, Ordering::Release);
        let discarded = self.shared.batch.clear();
        self.phase = Phase::Idle;
        self.expected = 0;
        self.shared.batch.publish_phase(Phase::Idle, 0);
        self.logger.record(&format!(
            "stopped, {} unsaved frames discarded",
            discarded
        ));
        discarded
    }

    /// Single dispatch step. Performs at most one transition when the armed
    /// deadline has elapsed and returns the resulting phase.
    ///
    /// A device error leaves the controller idle. A storage error keeps the
    /// batch for the next persistence tick and the cycle carries on.
    pub fn poll(&mut self) -> ScanResult<Phase> {
        let Some(deadline) = self.deadline else {
            return Ok(self.phase);
        };
        if self.clock.monotonic() < deadline {
            return Ok(self.phase);
        }
        self.deadline = None;

        match self.phase {
            Phase::PreScanDelay => self.begin_recording()?,
            Phase::Recording => self.persist_batch()?,
            Phase::Idle | Phase::Persisting => {}
        }
        Ok(self.phase)
    }

    fn begin_recording(&mut self) -> ScanResult<()> {
        let command = ScanCommand::new(self.config.scan)?;
        self.expected = command.expected_samples();
        self.arm(Phase::Recording, self.config.record_interval);
        self.shared.collecting.store(true, Ordering::Release);

        if let Err(err) = self.link.send_line(&command.to_string()) {
            self.shared.metrics.record_device_failure();
            self.logger
                .failure(&format!("scan command failed, going idle: {}", err));
            self.stop();
            return Err(err);
        }

        self.logger.record(&format!(
            "sent {}, expecting {} samples",
            command, self.expected
        ));
        Ok(())
    }

    fn persist_batch(&mut self) -> ScanResult<()> {
        self.phase = Phase::Persisting;
        self.shared.batch.publish_phase(Phase::Persisting, self.expected);
        self.deadline = Some(self.clock.monotonic() + self.config.cycle_delay);

        let frames = self.shared.batch.take();
        let result = if frames.is_empty() {
            self.logger.warn("no frames collected this sweep, nothing saved");
            Ok(())
        } else {
            let captured_at = self.clock.wall();
            match self.sink.persist(captured_at, &frames) {
                Ok(name) => {
                    self.shared.metrics.record_saved();
                    self.logger
                        .record(&format!("saved {} frames as '{}'", frames.len(), name));
                    Ok(())
                }
                Err(err) => {
                    self.shared.metrics.record_save_failure();
                    let pending = self.shared.batch.restore(frames);
                    self.logger.warn(&format!(
                        "save failed, keeping {} frames for the next tick: {}",
                        pending, err
                    ));
                    Err(err)
                }
            }
        };

        self.shared.collecting.store(false, Ordering::Release);
        self.phase = Phase::PreScanDelay;
        self.shared
            .batch
            .publish_phase(Phase::PreScanDelay, self.expected);
        result
    }

    fn arm(&mut self, phase: Phase, delay: Duration) {
        self.phase = phase;
        self.deadline = Some(self.clock.monotonic() + delay);
        self.shared.batch.publish_phase(phase, self.expected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::clock::ManualClock;
    use crate::acquisition::ingest::IngestOutcome;
    use crate::device::frame::TelemetryFrame;
    use crate::device::link::WriterLink;
    use crate::prelude::ScanParameters;
    use chrono::{DateTime, Local, TimeZone};
    use std::io;

    #[derive(Default)]
    struct MemorySink {
        saved: Vec<(String, Vec<String>)>,
        failures_left: usize,
    }

    impl BatchSink for MemorySink {
        fn persist(
            &mut self,
            captured_at: DateTime<Local>,
            frames: &[TelemetryFrame],
        ) -> ScanResult<String> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(ScanError::Storage("disk unavailable".into()));
            }
            let name = captured_at.format("%Y-%m-%d %H-%M-%S").to_string();
            let lines = frames.iter().map(|frame| frame.to_string()).collect();
            self.saved.push((name.clone(), lines));
            Ok(name)
        }
    }

    struct UnpluggedPort;

    impl io::Write for UnpluggedPort {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::NotConnected, "no device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    type TestController = AcquisitionController<WriterLink<Vec<u8>>, MemorySink, ManualClock>;

    const RECORD: Duration = Duration::from_secs(120);
    const CYCLE: Duration = Duration::from_secs(1800);

    fn config() -> AcquisitionConfig {
        AcquisitionConfig {
            scan: ScanParameters {
                min_y: 0,
                max_y: 30,
                step: 5,
            },
            initial_delay: Duration::from_secs(10),
            record_interval: RECORD,
            cycle_delay: CYCLE,
        }
    }

    fn controller() -> (TestController, ManualClock) {
        let start = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        let controller = AcquisitionController::new(
            config(),
            WriterLink::new(Vec::new()),
            MemorySink::default(),
            clock.clone(),
        )
        .unwrap();
        (controller, clock)
    }

    fn recording() -> (TestController, ManualClock) {
        let (mut controller, clock) = controller();
        controller.start().unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
        (controller, clock)
    }

    fn feed(ingest: &FrameIngest, count: usize) {
        for index in 0..count {
            let line = format!("{{{}, 0, {}.5}}", index * 5, index);
            assert!(matches!(ingest.ingest_line(&line), IngestOutcome::Accepted(_)));
        }
    }

    fn sent(controller: &TestController) -> String {
        String::from_utf8_lossy(controller.link().get_ref()).into_owned()
    }

    #[test]
    fn cycle_walks_through_every_phase() {
        let (mut controller, clock) = controller();
        assert_eq!(controller.phase(), Phase::Idle);

        controller.start().unwrap();
        assert_eq!(controller.phase(), Phase::PreScanDelay);
        assert_eq!(controller.poll().unwrap(), Phase::PreScanDelay);

        clock.advance(Duration::from_secs(10));
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
        assert_eq!(sent(&controller), "TABLE,0,30,5\n");
        assert_eq!(controller.progress().expected, 7);

        feed(&controller.ingest(), 3);
        assert_eq!(controller.progress().current, 3);

        clock.advance(RECORD);
        assert_eq!(controller.poll().unwrap(), Phase::PreScanDelay);
        assert_eq!(controller.sink().saved.len(), 1);
        assert_eq!(controller.sink().saved[0].0, "2024-05-01 08-02-10");
        assert_eq!(controller.progress().current, 0);
        assert_eq!(controller.time_to_next(), Some(CYCLE));

        clock.advance(CYCLE);
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
        assert_eq!(sent(&controller), "TABLE,0,30,5\nTABLE,0,30,5\n");
    }

    #[test]
    fn save_is_time_driven_even_when_sweep_is_incomplete() {
        let (mut controller, clock) = recording();
        feed(&controller.ingest(), 2);

        clock.advance(RECORD - Duration::from_secs(1));
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
        clock.advance(Duration::from_secs(1));
        controller.poll().unwrap();

        assert_eq!(controller.sink().saved[0].1.len(), 2);
        assert_eq!(controller.monitor().metrics().batches_saved, 1);
    }

    #[test]
    fn failed_save_keeps_frames_for_the_next_tick() {
        let (mut controller, clock) = recording();
        controller.sink_mut().failures_left = 1;
        feed(&controller.ingest(), 40);

        clock.advance(RECORD);
        let err = controller.poll().unwrap_err();
        assert!(matches!(err, ScanError::Storage(_)));
        assert_eq!(controller.phase(), Phase::PreScanDelay);
        assert_eq!(controller.pending_frames(), 40);

        clock.advance(CYCLE);
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
        feed(&controller.ingest(), 15);

        clock.advance(RECORD);
        controller.poll().unwrap();
        let saved = &controller.sink().saved;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1.len(), 55);
        assert_eq!(saved[0].1[0], "{0, 0, 0.5}");
        assert_eq!(saved[0].1[40], "{0, 0, 0.5}");
        assert_eq!(controller.pending_frames(), 0);
        assert_eq!(controller.monitor().metrics().save_failures, 1);
    }

    #[test]
    fn lines_between_sweeps_are_not_collected() {
        let (mut controller, clock) = controller();
        let ingest = controller.ingest();
        controller.start().unwrap();
        assert_eq!(ingest.ingest_line("{0, 0, 9.0}"), IngestOutcome::NotRecording);

        clock.advance(Duration::from_secs(10));
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
        feed(&ingest, 2);

        clock.advance(RECORD);
        assert_eq!(controller.poll().unwrap(), Phase::PreScanDelay);
        assert_eq!(ingest.ingest_line("{5, 0, 9.0}"), IngestOutcome::NotRecording);
        assert_eq!(controller.pending_frames(), 0);
        assert_eq!(controller.sink().saved[0].1.len(), 2);
        assert_eq!(controller.monitor().metrics().lines_dropped, 2);
    }

    #[test]
    fn stop_discards_unsaved_frames() {
        let (mut controller, clock) = recording();
        let ingest = controller.ingest();
        feed(&ingest, 12);

        assert_eq!(controller.stop(), 12);
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.progress(), Progress::default());
        assert_eq!(ingest.ingest_line("{0, 0, 1.0}"), IngestOutcome::NotRecording);

        clock.advance(RECORD + CYCLE);
        assert_eq!(controller.poll().unwrap(), Phase::Idle);
        assert!(controller.sink().saved.is_empty());
        assert_eq!(controller.pending_frames(), 0);
    }

    #[test]
    fn stop_when_idle_is_a_no_op_and_restart_works() {
        let (mut controller, clock) = controller();
        assert_eq!(controller.stop(), 0);

        controller.start().unwrap();
        assert!(matches!(controller.start(), Err(ScanError::InvalidState(_))));
        controller.stop();

        controller.start().unwrap();
        clock.advance(Duration::from_secs(10));
        assert_eq!(controller.poll().unwrap(), Phase::Recording);
    }

    #[test]
    fn device_failure_falls_back_to_idle() {
        let start = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        let mut controller = AcquisitionController::new(
            config(),
            WriterLink::new(UnpluggedPort),
            MemorySink::default(),
            clock.clone(),
        )
        .unwrap();

        controller.start().unwrap();
        clock.advance(Duration::from_secs(10));
        let err = controller.poll().unwrap_err();

        assert!(matches!(err, ScanError::Device(_)));
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.time_to_next(), None);
        assert_eq!(controller.monitor().metrics().device_failures, 1);
    }

    #[test]
    fn empty_sweep_writes_nothing() {
        let (mut controller, clock) = recording();
        clock.advance(RECORD);
        assert_eq!(controller.poll().unwrap(), Phase::PreScanDelay);
        assert!(controller.sink().saved.is_empty());
    }

    #[test]
    fn invalid_scan_is_rejected_at_construction() {
        let mut bad = config();
        bad.scan.step = 0;
        let result = AcquisitionController::new(
            bad,
            WriterLink::new(Vec::<u8>::new()),
            MemorySink::default(),
            ManualClock::default(),
        );
        assert!(result.is_err());
    }
}
