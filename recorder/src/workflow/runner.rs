use crate::generator::profile::SimulatedScanner;
use crate::gui_bridge::bridge::GuiBridge;
use crate::gui_bridge::model::ViewDesk;
use crate::workflow::config::RecorderConfig;
use crate::workflow::listener::{LineSource, Listener, ReaderLineSource};
use anyhow::Context;
use lightcore::acquisition::{
    AcquisitionController, Clock, Phase, SessionMonitor, SystemClock,
};
use lightcore::device::{DeviceLink, WriterLink};
use lightcore::prelude::{ScanError, ScanResult};
use lightcore::storage::{BatchSink, DirectorySink};
use lightcore::telemetry::MetricsSnapshot;
use log::{error, info, warn};
use std::future::{self, Future};
use std::io::BufReader;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use tokio::task::{self, JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

type SerialLink = Box<dyn DeviceLink + Send>;

/// What a recording session left behind.
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    pub metrics: MetricsSnapshot,
    pub discarded: usize,
}

pub struct Runner {
    config: RecorderConfig,
    poll_interval: Duration,
}

impl Runner {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Runs the acquisition cycle until Ctrl+C or a device failure.
    pub fn record(&self, simulate: bool, serve: bool) -> anyhow::Result<SessionSummary> {
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for the acquisition loop")?;
        self.record_until(simulate, serve, &runtime, async {
            signal::ctrl_c().await.context("awaiting Ctrl+C")
        })
    }

    fn record_until<F>(
        &self,
        simulate: bool,
        serve: bool,
        runtime: &tokio::runtime::Runtime,
        shutdown: F,
    ) -> anyhow::Result<SessionSummary>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let sink = DirectorySink::new(&self.config.data_dir);
        let (link, source) = self.open_device(simulate)?;
        let mut controller = AcquisitionController::new(
            self.config.to_acquisition_config(),
            link,
            sink.clone(),
            SystemClock::new(),
        )
        .context("building acquisition controller")?;
        let listener = Listener::spawn(source, controller.ingest());

        if serve {
            let desk = ViewDesk::new(self.config.grid_step, self.config.mapping)
                .context("building view desk")?;
            let bridge = GuiBridge::new(
                Arc::new(Mutex::new(desk)),
                sink,
                Some(controller.monitor()),
                self.config.bridge_address,
            );
            bridge.publish_status("serving live acquisition status");
        }

        let monitor = controller.monitor();
        if let Err(err) = controller.start() {
            listener.shutdown();
            return Err(err).context("starting acquisition");
        }
        let controller = Arc::new(Mutex::new(controller));
        let outcome = runtime.block_on(drive(
            controller.clone(),
            &monitor,
            self.poll_interval,
            shutdown,
        ));

        let discarded = lock(&controller).stop();
        listener.shutdown();
        if discarded > 0 {
            warn!("{} unsaved frames discarded on shutdown", discarded);
        }
        outcome.map(|()| SessionSummary {
            metrics: monitor.metrics(),
            discarded,
        })
    }

    fn open_device(
        &self,
        simulate: bool,
    ) -> anyhow::Result<(SerialLink, Box<dyn LineSource>)> {
        if simulate {
            let (scanner, source) = SimulatedScanner::new(self.config.simulator.clone());
            info!("recording from simulated scanner");
            return Ok((Box::new(scanner), Box::new(source)));
        }

        let serial = &self.config.serial;
        let port = serialport::new(&serial.port, serial.baud_rate)
            .timeout(Duration::from_millis(serial.timeout_ms))
            .open()
            .with_context(|| format!("opening serial port {}", serial.port))?;
        let reader = port
            .try_clone()
            .with_context(|| format!("cloning serial port {}", serial.port))?;
        info!("recording from {} at {} baud", serial.port, serial.baud_rate);
        Ok((
            Box::new(WriterLink::new(port)),
            Box::new(ReaderLineSource::new(BufReader::new(reader))),
        ))
    }
}

type Step = JoinHandle<ScanResult<Phase>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Timer loop. Each dispatch step runs on the blocking pool, since it may
/// write a batch to disk, so progress and shutdown stay responsive while a
/// save is in flight. On shutdown the running step is awaited before
/// returning.
async fn drive<L, S, C, F>(
    controller: Arc<Mutex<AcquisitionController<L, S, C>>>,
    monitor: &SessionMonitor,
    poll_interval: Duration,
    shutdown: F,
) -> anyhow::Result<()>
where
    L: DeviceLink + Send + 'static,
    S: BatchSink + Send + 'static,
    C: Clock + Send + 'static,
    F: Future<Output = anyhow::Result<()>>,
{
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut progress = monitor.subscribe();
    let mut step: Option<Step> = None;
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = ticker.tick(), if step.is_none() => {
                let controller = controller.clone();
                step = Some(task::spawn_blocking(move || {
                    let mut controller = lock(&controller);
                    controller.poll()
                }));
            }
            finished = wait_for(&mut step), if step.is_some() => {
                step = None;
                if let Err(err) = settle(finished) {
                    break Err(err);
                }
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = *progress.borrow_and_update();
                match snapshot.phase {
                    Phase::Recording => info!(
                        "recording {}/{} samples",
                        snapshot.current, snapshot.expected
                    ),
                    phase => info!("{:?} ({} frames pending)", phase, snapshot.current),
                }
            }
            result = &mut shutdown => {
                break result.map(|()| info!("shutdown requested"));
            }
        }
    };

    let last = match step {
        Some(running) => {
            info!("waiting for the running acquisition step to finish");
            settle(running.await)
        }
        None => Ok(()),
    };
    outcome.and(last)
}

async fn wait_for(step: &mut Option<Step>) -> Result<ScanResult<Phase>, JoinError> {
    match step {
        Some(running) => running.await,
        None => future::pending().await,
    }
}

fn settle(finished: Result<ScanResult<Phase>, JoinError>) -> anyhow::Result<()> {
    match finished.context("acquisition step did not complete")? {
        Ok(_) => Ok(()),
        Err(ScanError::Storage(err)) => {
            warn!("batch kept for retry: {}", err);
            Ok(())
        }
        Err(err) => {
            error!("acquisition halted: {}", err);
            Err(err).context("scanner stopped responding")
        }
    }
}
