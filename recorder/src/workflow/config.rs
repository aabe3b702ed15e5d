use crate::generator::profile::ScannerProfile;
use anyhow::{ensure, Context};
use lightcore::prelude::{AcquisitionConfig, ScanParameters, GRID_STEP};
use lightcore::processing::MappingFunction;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            timeout_ms: 500,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub initial_delay_secs: u64,
    pub record_secs: u64,
    pub cycle_delay_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 0,
            record_secs: 2 * 60,
            cycle_delay_secs: 30 * 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub serial: SerialConfig,
    pub data_dir: PathBuf,
    pub scan: ScanParameters,
    pub timing: TimingConfig,
    pub grid_step: usize,
    pub mapping: MappingFunction,
    pub bridge_address: SocketAddr,
    pub simulator: ScannerProfile,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            data_dir: PathBuf::from("LightTrackerData"),
            scan: ScanParameters::default(),
            timing: TimingConfig::default(),
            grid_step: GRID_STEP,
            mapping: MappingFunction::default(),
            bridge_address: SocketAddr::from(([127, 0, 0, 1], 9000)),
            simulator: ScannerProfile::default(),
        }
    }
}

impl RecorderConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading recorder config {}", path_ref.display()))?;
        let config: RecorderConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing recorder config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.scan.validate().context("checking scan parameters")?;
        ensure!(self.grid_step > 0, "grid_step must be positive");
        ensure!(self.timing.record_secs > 0, "record_secs must be positive");
        Ok(())
    }

    pub fn to_acquisition_config(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            scan: self.scan,
            initial_delay: Duration::from_secs(self.timing.initial_delay_secs),
            record_interval: Duration::from_secs(self.timing.record_secs),
            cycle_delay: Duration::from_secs(self.timing.cycle_delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_matches_reference_profile() {
        let cfg = RecorderConfig::default();
        let acquisition = cfg.to_acquisition_config();
        assert_eq!(acquisition.record_interval, Duration::from_secs(120));
        assert_eq!(acquisition.cycle_delay, Duration::from_secs(1800));
        assert_eq!(acquisition.scan.expected_samples(), 8);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_load_reads_partial_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"serial:\n  port: COM6\nscan:\n  max_y: 30\ntiming:\n  record_secs: 60\nmapping: sqrt\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = RecorderConfig::load(&path).unwrap();

        assert_eq!(cfg.serial.port, "COM6");
        assert_eq!(cfg.serial.baud_rate, 115_200);
        assert_eq!(cfg.scan.max_y, 30);
        assert_eq!(cfg.scan.step, 5);
        assert_eq!(cfg.timing.record_secs, 60);
        assert_eq!(cfg.timing.cycle_delay_secs, 1800);
        assert_eq!(cfg.mapping, MappingFunction::Sqrt);
    }

    #[test]
    fn validate_rejects_zero_grid_step() {
        let cfg = RecorderConfig {
            grid_step: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
