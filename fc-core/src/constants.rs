//! Constants and configuration defaults for fancontrol
//!
//! Centralizes paths, limits and defaults. Other modules refer to these
//! instead of repeating literals.

use std::time::Duration;

/// Fixed system paths
pub mod paths {
    /// Default board configuration file
    pub const CONFIG_FILE: &str = "/etc/fancontrol.conf";

    /// Exclusive advisory instance lock
    pub const LOCK_FILE: &str = "/var/run/fancontrol.lock";

    /// PID file of the running instance
    pub const PID_FILE: &str = "/var/run/fancontrol.pid";

    /// Runtime status document, rewritten every tick
    pub const STATUS_FILE: &str = "/var/run/fancontrol.status.json";

    /// Default PWM register
    pub const PWM: &str = "/sys/class/hwmon/hwmon2/pwm1";

    /// Default PWM enable file
    pub const PWM_ENABLE: &str = "/sys/class/hwmon/hwmon2/pwm1_enable";

    /// Default control-mode file
    pub const CONTROL_MODE: &str = "/sys/class/thermal/thermal_zone0/mode";

    /// Journald socket, used to decide where logs go
    pub const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";
}

/// PWM register limits and enable-file values
pub mod pwm {
    /// Lowest register value accepted in configuration
    pub const MIN_VALUE: i32 = 0;

    /// Highest register value accepted in configuration
    pub const MAX_VALUE: i32 = 255;

    /// PWM enable modes
    pub mod enable {
        /// Manual (software) control
        pub const MANUAL: i32 = 1;
    }
}

/// Tokens written to the control-mode file
pub mod control_mode {
    /// This process owns the PWM register
    pub const USER_TOKEN: &str = "user";

    /// The platform owns the PWM register; restored when nothing was observed
    pub const KERNEL_TOKEN: &str = "kernel";
}

/// Temperature source limits
pub mod source {
    use super::Duration;

    /// Lowest accepted poll interval
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Bounds for the RPC call timeout, derived from the poll interval
    pub const MIN_RPC_TIMEOUT: Duration = Duration::from_secs(1);
    pub const MAX_RPC_TIMEOUT: Duration = Duration::from_secs(10);

    /// How often a pending RPC child process is checked for exit
    pub const RPC_WAIT_STEP: Duration = Duration::from_millis(20);

    /// Default RPC command-line client
    pub const RPC_PROGRAM: &str = "ubus";

    /// Lowest and highest accepted temperature threshold (mC)
    pub const MIN_THRESHOLD_MC: i32 = -273_150;
    pub const MAX_THRESHOLD_MC: i32 = 300_000;

    /// Weight bounds, percent
    pub const MIN_WEIGHT: i32 = 1;
    pub const MAX_WEIGHT: i32 = 200;

    /// Identifier pattern
    pub const ID_PATTERN: &str = "^[A-Za-z0-9_-]+$";
}

/// Configuration defaults
pub mod defaults {
    pub const INTERVAL_SEC: u32 = 1;
    pub const PWM_MIN: i32 = 0;
    pub const PWM_MAX: i32 = 255;
    pub const RAMP_UP_SEC: u32 = 5;
    pub const RAMP_DOWN_SEC: u32 = 10;
    pub const HYSTERESIS_MC: i32 = 2000;
    pub const FAILSAFE_PWM: i32 = 64;
    /// Negative disables the startup boost
    pub const PWM_STARTUP: i32 = -1;

    pub const T_START_MC: i32 = 60_000;
    pub const T_FULL_MC: i32 = 80_000;
    pub const T_CRIT_MC: i32 = 90_000;
    pub const WEIGHT: i32 = 100;
}

/// Status document
pub mod status {
    /// Name of the single supported cooling policy
    pub const POLICY: &str = "weighted-max";
}

/// Environment variables read by the daemon
pub mod env {
    /// Log filter, e.g. `debug` or `fc_core=trace`
    pub const LOG: &str = "FANCONTROL_LOG";

    /// Legacy switch; any value other than `0` enables debug logs
    pub const DEBUG: &str = "DEBUG";
}
