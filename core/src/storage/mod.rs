//! Persistence of acquisition batches.
//!
//! One text file per persistence tick, one frame per line, named after the
//! capture time with second resolution. A batch is written under a staging
//! name and renamed into place, so a listed batch is always complete.

use crate::device::frame::TelemetryFrame;
use crate::prelude::{ScanError, ScanResult};
use chrono::{DateTime, Local};
use log::warn;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const BATCH_EXTENSION: &str = "txt";
const STAGING_EXTENSION: &str = "part";
const BATCH_NAME_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

/// Destination for completed batches.
pub trait BatchSink {
    /// Stores `frames` as one unit and returns the batch name.
    fn persist(&mut self, captured_at: DateTime<Local>, frames: &[TelemetryFrame])
        -> ScanResult<String>;
}

impl<S: BatchSink + ?Sized> BatchSink for Box<S> {
    fn persist(
        &mut self,
        captured_at: DateTime<Local>,
        frames: &[TelemetryFrame],
    ) -> ScanResult<String> {
        (**self).persist(captured_at, frames)
    }
}

/// Directory of batch files addressed by name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn batch_name(captured_at: DateTime<Local>) -> String {
        captured_at.format(BATCH_NAME_FORMAT).to_string()
    }

    /// Path of a batch; accepts the name with or without extension.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let stem = name
            .strip_suffix(&format!(".{}", BATCH_EXTENSION))
            .unwrap_or(name);
        self.root.join(format!("{}.{}", stem, BATCH_EXTENSION))
    }

    /// Stored batch names, oldest first.
    pub fn list(&self) -> ScanResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|err| {
            ScanError::Storage(format!("listing {}: {}", self.root.display(), err))
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(BATCH_EXTENSION))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    /// Raw lines of a stored batch, ready for grid reconstruction.
    pub fn load(&self, name: &str) -> ScanResult<Vec<String>> {
        let path = self.path_for(name);
        let contents = fs::read_to_string(&path)
            .map_err(|err| ScanError::Storage(format!("reading {}: {}", path.display(), err)))?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    /// Fills a staging file and moves it into place only once every line is
    /// on disk. A failed write leaves no batch file behind.
    fn write_batch<F>(&self, name: &str, fill: F) -> ScanResult<()>
    where
        F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
    {
        let path = self.path_for(name);
        if path.exists() {
            return Err(ScanError::Storage(format!(
                "{} already exists",
                path.display()
            )));
        }
        let staging =
            path.with_extension(format!("{}.{}", BATCH_EXTENSION, STAGING_EXTENSION));

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .map_err(|err| storage_error(&staging, err))?;
        let mut writer = BufWriter::new(file);
        let written = fill(&mut writer)
            .and_then(|()| writer.flush())
            .and_then(|()| writer.get_ref().sync_all());
        drop(writer);

        let result = written
            .and_then(|()| fs::rename(&staging, &path))
            .map_err(|err| storage_error(&path, err));
        if result.is_err() {
            if let Err(err) = fs::remove_file(&staging) {
                warn!("cannot remove partial batch {}: {}", staging.display(), err);
            }
        }
        result
    }
}

fn storage_error(path: &Path, err: io::Error) -> ScanError {
    ScanError::Storage(format!("writing {}: {}", path.display(), err))
}

impl BatchSink for DirectorySink {
    fn persist(
        &mut self,
        captured_at: DateTime<Local>,
        frames: &[TelemetryFrame],
    ) -> ScanResult<String> {
        let name = Self::batch_name(captured_at);
        self.write_batch(&name, |writer| {
            for frame in frames {
                writeln!(writer, "{}", frame)?;
            }
            Ok(())
        })?;
        Ok(name)
    }
}
