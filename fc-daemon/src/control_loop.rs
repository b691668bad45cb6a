//! Fixed-interval control loop
//!
//! Runs on a blocking thread. Each pass runs one controller tick, then
//! sleeps on the shutdown signal until the next slot of the interval grid,
//! so a shutdown request ends the sleep at once.

use std::time::{Duration, Instant};

use fc_core::source::next_deadline;
use fc_core::{Controller, ExitReason, ShutdownSignal, SourceManager};
use fc_error::Result;
use tracing::{debug, error, info};

/// Tick until shutdown is requested or a tick fails.
///
/// A failed tick requests a fatal shutdown before returning its error.
pub fn run(controller: &mut Controller, manager: &SourceManager, shutdown: &ShutdownSignal) -> Result<()> {
    let interval = Duration::from_secs(u64::from(controller.config().interval_sec));
    let mut deadline = Instant::now();
    info!(
        "Control loop running every {}s ({} PWM)",
        interval.as_secs(),
        if controller.owns_pwm() { "driving" } else { "observing" }
    );

    while !shutdown.is_requested() {
        match controller.tick(manager, Instant::now()) {
            Ok(report) => debug!(
                target_pwm = report.target,
                applied = report.applied,
                any_valid = report.decision.any_valid,
                any_timeout = report.decision.any_timeout,
                critical = report.decision.critical,
                "tick"
            ),
            Err(e) => {
                error!("Control tick failed: {}", e);
                shutdown.request(ExitReason::Fatal);
                return Err(e);
            }
        }

        deadline = next_deadline(deadline, interval, Instant::now());
        if shutdown.wait_until(deadline) {
            break;
        }
    }

    info!("Control loop stopped");
    Ok(())
}
