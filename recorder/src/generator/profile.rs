use crate::generator::template::format_row;
use crate::workflow::listener::LineSource;
use lightcore::device::{DeviceLink, ScanCommand};
use lightcore::prelude::{ScanError, ScanParameters, ScanResult};
use lightcore::processing::SampleTriplet;
use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// Shape of the synthetic light field produced by the simulated scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerProfile {
    /// Last X coordinate of every row.
    pub max_col: u32,
    /// X spacing between samples.
    pub lattice: u32,
    pub peak: f64,
    pub spot_row: f64,
    pub spot_col: f64,
    pub spot_radius: f64,
    pub noise: f64,
    /// Probability of a status or garbled line before each row.
    pub chatter: f64,
    pub line_interval_ms: u64,
    pub seed: u64,
}

impl Default for ScannerProfile {
    fn default() -> Self {
        Self {
            max_col: 30,
            lattice: 5,
            peak: 900.0,
            spot_row: 15.0,
            spot_col: 15.0,
            spot_radius: 8.0,
            noise: 4.0,
            chatter: 0.1,
            line_interval_ms: 250,
            seed: 0,
        }
    }
}

const CHATTER: [&str; 3] = ["STATUS,OK", "{12, 5", "MOVING Y"];

/// Stand-in for the serial scanner: answers `TABLE` commands with one line
/// per Y row on a background thread.
pub struct SimulatedScanner {
    profile: ScannerProfile,
    rng: StdRng,
    lines: Sender<String>,
}

impl SimulatedScanner {
    pub fn new(profile: ScannerProfile) -> (Self, ChannelLineSource) {
        let (lines, receiver) = mpsc::channel();
        let rng = StdRng::seed_from_u64(profile.seed);
        let scanner = Self {
            profile,
            rng,
            lines,
        };
        (scanner, ChannelLineSource::new(receiver))
    }

    /// Lines one sweep emits, chatter included.
    pub fn sweep_lines(&mut self, params: ScanParameters) -> Vec<String> {
        let lattice = self.profile.lattice.max(1);
        let mut lines = Vec::new();
        for row in (params.min_y..=params.max_y).step_by(params.step.max(1) as usize) {
            if self.rng.gen_bool(self.profile.chatter.clamp(0.0, 1.0)) {
                lines.push(CHATTER[self.rng.gen_range(0..CHATTER.len())].to_string());
            }
            let samples: Vec<SampleTriplet> = (0..=self.profile.max_col)
                .step_by(lattice as usize)
                .map(|col| SampleTriplet {
                    row: row as usize,
                    col: col as usize,
                    intensity: self.intensity(row, col),
                })
                .collect();
            lines.push(format!("ROW {} {}\r", row, format_row(&samples)));
        }
        lines
    }

    fn intensity(&mut self, row: u32, col: u32) -> f64 {
        let dy = row as f64 - self.profile.spot_row;
        let dx = col as f64 - self.profile.spot_col;
        let radius = self.profile.spot_radius.max(f64::EPSILON);
        let spot = self.profile.peak * (-(dx * dx + dy * dy) / (2.0 * radius * radius)).exp();
        let jitter = if self.profile.noise > 0.0 {
            self.rng.gen_range(-self.profile.noise..self.profile.noise)
        } else {
            0.0
        };
        (spot + jitter).max(0.0)
    }
}

impl DeviceLink for SimulatedScanner {
    fn send_line(&mut self, line: &str) -> ScanResult<()> {
        let command = ScanCommand::parse(line)
            .ok_or_else(|| ScanError::Device(format!("unrecognised command '{}'", line)))?;
        let lines = self.sweep_lines(command.params());
        debug!("simulated scanner sweeping {} lines for {}", lines.len(), command);

        let sender = self.lines.clone();
        let interval = Duration::from_millis(self.profile.line_interval_ms);
        thread::spawn(move || {
            for line in lines {
                if sender.send(line).is_err() {
                    break;
                }
                thread::sleep(interval);
            }
        });
        Ok(())
    }
}

/// Line source fed by the simulated scanner.
pub struct ChannelLineSource {
    receiver: Receiver<String>,
    timeout: Duration,
}

impl ChannelLineSource {
    fn new(receiver: Receiver<String>) -> Self {
        Self {
            receiver,
            timeout: Duration::from_millis(200),
        }
    }
}

impl LineSource for ChannelLineSource {
    fn next_line(&mut self) -> io::Result<Option<String>> {
        match self.receiver.recv_timeout(self.timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated scanner disconnected",
            )),
        }
    }
}
