//! Concurrent source polling
//!
//! One OS thread per source. Each worker samples, then sleeps until its next
//! deadline on a fixed grid anchored at worker start. A worker that falls
//! behind skips the missed slots instead of bursting to catch up.
//!
//! The control loop only ever calls [`SourceManager::snapshot`], which copies
//! the latest per-source state under that source's own lock.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{build_source, SourceSnapshot, TempSource};
use crate::config::BoardConfig;
use crate::shutdown::{ExitReason, ShutdownSignal};
use fc_error::{FanControlError, Result};

type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Owns the sources and their polling workers
pub struct SourceManager {
    sources: Vec<Arc<dyn TempSource>>,
    workers: Vec<JoinHandle<()>>,
    stop: Arc<ShutdownSignal>,
    running: bool,
}

impl Default for SourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceManager {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            workers: Vec::new(),
            stop: Arc::new(ShutdownSignal::new()),
            running: false,
        }
    }

    /// Build one source per configured entry, in configuration order
    pub fn from_config(cfg: &BoardConfig) -> Self {
        let mut manager = Self::new();
        for src in &cfg.sources {
            manager.add(build_source(src));
        }
        manager
    }

    /// Register a source; ignored while workers are running
    pub fn add(&mut self, source: Arc<dyn TempSource>) {
        if self.running {
            warn!(source = %source.id(), "Cannot add a source while polling is running");
            return;
        }
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Arc<dyn TempSource>] {
        &self.sources
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Latest snapshot of one source, never waiting on its worker
    pub fn snapshot(&self, id: &str) -> Option<SourceSnapshot> {
        self.sources
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.snapshot())
    }

    /// Spawn one worker per source; no-op when already running
    ///
    /// If any worker fails to spawn, the ones already started are stopped
    /// and joined before the error is returned.
    pub fn start(&mut self) -> Result<()> {
        self.start_with(|name, body| thread::Builder::new().name(name).spawn(body))
    }

    fn start_with<F>(&mut self, mut spawn: F) -> Result<()>
    where
        F: FnMut(String, WorkerBody) -> io::Result<JoinHandle<()>>,
    {
        if self.running {
            return Ok(());
        }

        self.stop = Arc::new(ShutdownSignal::new());
        let sources = self.sources.clone();
        for source in &sources {
            let worker_source = Arc::clone(source);
            let worker_stop = Arc::clone(&self.stop);
            let body: WorkerBody = Box::new(move || poll_worker(worker_source, worker_stop));

            match spawn(format!("fc-src-{}", source.id()), body) {
                Ok(handle) => self.workers.push(handle),
                Err(e) => {
                    let id = source.id().to_string();
                    self.join_workers();
                    return Err(FanControlError::WorkerSpawn {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.running = true;
        info!("Started {} source worker(s)", self.workers.len());
        Ok(())
    }

    /// Signal every worker and join them; safe to call repeatedly
    pub fn stop(&mut self) {
        if !self.running && self.workers.is_empty() {
            return;
        }
        self.join_workers();
        self.running = false;
        debug!("Source workers stopped");
    }

    fn join_workers(&mut self) {
        self.stop.request(ExitReason::Plain);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("A source worker panicked during shutdown");
            }
        }
    }
}

impl Drop for SourceManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_worker(source: Arc<dyn TempSource>, stop: Arc<ShutdownSignal>) {
    let interval = source.poll_interval();
    let mut deadline = Instant::now();
    debug!(source = %source.id(), "Polling every {}s", interval.as_secs());

    while !stop.is_requested() {
        if panic::catch_unwind(AssertUnwindSafe(|| source.sample())).is_err() {
            source.publish_failure("sampler panicked");
        }
        deadline = next_deadline(deadline, interval, Instant::now());
        if stop.wait_until(deadline) {
            break;
        }
    }
}

/// Next slot on the grid `prev + k * interval` that lies after `now`
pub fn next_deadline(prev: Instant, interval: Duration, now: Instant) -> Instant {
    let next = prev + interval;
    if next > now || interval.is_zero() {
        return next.max(now);
    }
    let behind = now.duration_since(next).as_nanos();
    let skipped = behind / interval.as_nanos() + 1;
    next + interval * u32::try_from(skipped).unwrap_or(u32::MAX)
}
