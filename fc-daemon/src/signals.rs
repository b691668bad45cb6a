//! Signal handling
//!
//! The only thing a signal does is request shutdown with a reason.

use std::sync::Arc;

use fc_core::{ExitReason, ShutdownSignal};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::info;

/// Exit reason for a termination signal
pub fn reason_for(name: &str) -> Option<ExitReason> {
    match name {
        "SIGINT" | "SIGHUP" => Some(ExitReason::Restore),
        "SIGTERM" | "SIGQUIT" => Some(ExitReason::Plain),
        _ => None,
    }
}

/// Registered termination signal streams
///
/// Registration replaces the default terminate action at once, so this must
/// happen before any hardware is taken over.
pub struct TerminationSignals {
    sigint: Signal,
    sighup: Signal,
    sigterm: Signal,
    sigquit: Signal,
}

impl TerminationSignals {
    /// Register all four handlers; needs a running tokio runtime
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sighup: signal(SignalKind::hangup())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Request shutdown on every termination signal until the task is aborted
    ///
    /// A later signal replaces the exit reason of an earlier one.
    pub async fn listen(mut self, shutdown: Arc<ShutdownSignal>) {
        loop {
            let name = tokio::select! {
                _ = self.sigint.recv() => "SIGINT",
                _ = self.sighup.recv() => "SIGHUP",
                _ = self.sigterm.recv() => "SIGTERM",
                _ = self.sigquit.recv() => "SIGQUIT",
            };

            if let Some(reason) = reason_for(name) {
                info!("SIGNAL: Received {} - initiating shutdown ({:?})", name, reason);
                shutdown.request(reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_reason_mapping() {
        assert_eq!(reason_for("SIGINT"), Some(ExitReason::Restore));
        assert_eq!(reason_for("SIGHUP"), Some(ExitReason::Restore));
        assert_eq!(reason_for("SIGTERM"), Some(ExitReason::Plain));
        assert_eq!(reason_for("SIGQUIT"), Some(ExitReason::Plain));
        assert_eq!(reason_for("SIGUSR1"), None);
    }

    #[test]
    fn test_exit_codes_follow_signal() {
        assert_eq!(reason_for("SIGHUP").map(ExitReason::exit_code), Some(1));
        assert_eq!(reason_for("SIGTERM").map(ExitReason::exit_code), Some(0));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_signal_before_listener_polled_is_not_fatal() {
        let signals = TerminationSignals::register().unwrap();
        let shutdown = Arc::new(ShutdownSignal::new());

        // Delivered while nothing is awaiting the streams yet
        // SAFETY: raising SIGHUP on ourselves; the handler is already installed
        assert_eq!(unsafe { libc::raise(libc::SIGHUP) }, 0);

        let listener = tokio::spawn(signals.listen(Arc::clone(&shutdown)));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !shutdown.is_requested() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        listener.abort();

        assert!(shutdown.is_requested());
        assert_eq!(shutdown.reason(), Some(ExitReason::Restore));
    }
}
