//! Process-wide shutdown flag
//!
//! One [`ShutdownSignal`] is created at startup and shared by reference with
//! every source worker and the control loop. Signal handling only calls
//! [`ShutdownSignal::request`]; everything else waits on it.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Why the process is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// SIGINT / SIGHUP: restore the originally owned state, exit status 1
    Restore,
    /// SIGTERM / SIGQUIT: plain shutdown, exit status 0
    Plain,
    /// The control loop hit a fatal error
    Fatal,
}

impl ExitReason {
    fn to_raw(self) -> u8 {
        match self {
            ExitReason::Restore => 1,
            ExitReason::Plain => 2,
            ExitReason::Fatal => 3,
        }
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(ExitReason::Restore),
            2 => Some(ExitReason::Plain),
            3 => Some(ExitReason::Fatal),
            _ => None,
        }
    }

    /// Process exit status for this reason
    pub fn exit_code(self) -> i32 {
        match self {
            ExitReason::Plain => 0,
            ExitReason::Restore | ExitReason::Fatal => 1,
        }
    }
}

/// Shutdown flag plus exit reason, waitable with a deadline
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    reason: AtomicU8,
    lock: Mutex<()>,
    cond: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter
    ///
    /// The latest signal reason replaces an earlier one; `Fatal` is never replaced.
    pub fn request(&self, reason: ExitReason) {
        let _guard = self.lock.lock();
        if self.reason() != Some(ExitReason::Fatal) {
            self.reason.store(reason.to_raw(), Ordering::SeqCst);
        }
        self.requested.store(true, Ordering::SeqCst);
        self.cond.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<ExitReason> {
        ExitReason::from_raw(self.reason.load(Ordering::SeqCst))
    }

    /// Sleep until `deadline` or until shutdown is requested
    ///
    /// Returns `true` if shutdown was requested.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut guard = self.lock.lock();
        while !self.is_requested() {
            if self.cond.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_times_out_without_request() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_until(start + Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(signal.reason(), None);
    }

    #[test]
    fn test_request_wakes_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_until(Instant::now() + Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.request(ExitReason::Plain);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_latest_signal_reason_wins() {
        let signal = ShutdownSignal::new();
        signal.request(ExitReason::Plain);
        signal.request(ExitReason::Restore);
        assert_eq!(signal.reason(), Some(ExitReason::Restore));
        signal.request(ExitReason::Plain);
        assert_eq!(signal.reason(), Some(ExitReason::Plain));
        assert_eq!(ExitReason::Restore.exit_code(), 1);
        assert_eq!(ExitReason::Plain.exit_code(), 0);
        // Already requested: returns immediately even with a past deadline
        assert!(signal.wait_until(Instant::now()));
    }

    #[test]
    fn test_fatal_is_not_replaced() {
        let signal = ShutdownSignal::new();
        signal.request(ExitReason::Fatal);
        signal.request(ExitReason::Plain);
        assert_eq!(signal.reason(), Some(ExitReason::Fatal));
        assert_eq!(ExitReason::Fatal.exit_code(), 1);
    }
}
