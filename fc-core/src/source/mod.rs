//! Temperature sources
//!
//! A source performs one blocking read per poll and records the outcome in
//! its own [`SnapshotCell`]. Failures never escape `sample()`; they become a
//! failed [`TempSample`] carrying the error text.
//!
//! - `sysfs` - integer milli-Celsius read from a local file
//! - `rpc` - numeric reply field of an inter-process bus call
//! - `manager` - one polling worker per source

pub mod manager;
pub mod rpc;
pub mod sysfs;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{BoardSourceConfig, SourceLocation};
use crate::constants::source::MIN_POLL_INTERVAL;

pub use manager::{next_deadline, SourceManager};
pub use rpc::{RpcSource, RpcTransport, UbusCli};
pub use sysfs::SysfsSource;

/// Outcome of one poll
#[derive(Debug, Clone, PartialEq)]
pub struct TempSample {
    pub ok: bool,
    pub temp_mc: i32,
    pub timestamp: Instant,
    pub error: String,
}

impl TempSample {
    pub fn good(temp_mc: i32, timestamp: Instant) -> Self {
        Self {
            ok: true,
            temp_mc,
            timestamp,
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>, timestamp: Instant) -> Self {
        Self {
            ok: false,
            temp_mc: 0,
            timestamp,
            error: error.into(),
        }
    }
}

/// Latest known state of one source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSnapshot {
    pub has_polled: bool,
    pub last_sample: Option<TempSample>,
    /// Only ever advances to an `ok` sample
    pub last_good_sample: Option<TempSample>,
}

/// Per-source snapshot behind a short-lived lock
#[derive(Debug, Default)]
pub struct SnapshotCell {
    inner: Mutex<SourceSnapshot>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, sample: TempSample) {
        let mut snap = self.inner.lock();
        snap.has_polled = true;
        if sample.ok {
            snap.last_good_sample = Some(sample.clone());
        }
        snap.last_sample = Some(sample);
    }

    /// Copy of the current snapshot
    pub fn load(&self) -> SourceSnapshot {
        self.inner.lock().clone()
    }
}

/// Capability shared by every temperature source
pub trait TempSource: Send + Sync {
    fn id(&self) -> &str;

    /// Time between polls, never below one second
    fn poll_interval(&self) -> Duration;

    /// Perform one read and store the outcome
    fn sample(&self);

    /// Record a failure observed outside `sample()`
    fn publish_failure(&self, error: &str);

    fn snapshot(&self) -> SourceSnapshot;
}

pub(crate) fn clamp_poll_interval(poll_sec: u32) -> Duration {
    Duration::from_secs(u64::from(poll_sec)).max(MIN_POLL_INTERVAL)
}

/// Build the source matching a configured location
pub fn build_source(cfg: &BoardSourceConfig) -> Arc<dyn TempSource> {
    match &cfg.location {
        SourceLocation::Sysfs { path } => Arc::new(SysfsSource::new(&cfg.id, path, cfg.poll_sec)),
        SourceLocation::Rpc {
            object,
            method,
            key,
            args,
        } => Arc::new(RpcSource::new(
            &cfg.id,
            object,
            method,
            key,
            args,
            cfg.poll_sec,
            Box::new(UbusCli::default()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_good_never_reverts() {
        let cell = SnapshotCell::new();
        assert!(!cell.load().has_polled);

        let t0 = Instant::now();
        cell.store(TempSample::good(45_000, t0));
        cell.store(TempSample::failed("read error", t0 + Duration::from_secs(1)));

        let snap = cell.load();
        assert!(snap.has_polled);
        assert!(!snap.last_sample.as_ref().unwrap().ok);
        assert_eq!(snap.last_good_sample.as_ref().unwrap().temp_mc, 45_000);
        assert_eq!(snap.last_good_sample.unwrap().timestamp, t0);
    }

    #[test]
    fn test_poll_interval_floor() {
        assert_eq!(clamp_poll_interval(0), Duration::from_secs(1));
        assert_eq!(clamp_poll_interval(5), Duration::from_secs(5));
    }
}
