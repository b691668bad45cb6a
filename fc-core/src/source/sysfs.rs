//! Local file temperature source

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{clamp_poll_interval, SnapshotCell, SourceSnapshot, TempSample, TempSource};
use crate::hw::control::read_int;
use fc_error::FanControlError;

/// Reads an integer milli-Celsius value from a file, one read per poll
#[derive(Debug)]
pub struct SysfsSource {
    id: String,
    path: PathBuf,
    poll_interval: Duration,
    cell: SnapshotCell,
}

impl SysfsSource {
    pub fn new(id: &str, path: &Path, poll_sec: u32) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_path_buf(),
            poll_interval: clamp_poll_interval(poll_sec),
            cell: SnapshotCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TempSource for SysfsSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn sample(&self) {
        let now = Instant::now();
        match read_int(&self.path) {
            Ok(temp_mc) => self.cell.store(TempSample::good(temp_mc, now)),
            Err(e) => {
                let err = FanControlError::TemperatureRead {
                    path: self.path.clone(),
                    reason: e.to_string(),
                };
                debug!(source = %self.id, "{}", err);
                self.cell.store(TempSample::failed(err.to_string(), now));
            }
        }
    }

    fn publish_failure(&self, error: &str) {
        self.cell.store(TempSample::failed(error, Instant::now()));
    }

    fn snapshot(&self) -> SourceSnapshot {
        self.cell.load()
    }
}
