//! fancontrol Core Library
//!
//! Closed-loop PWM fan control for embedded and SoC boards.
//!
//! # Features
//!
//! - **Sources**: sysfs files and inter-process bus calls, each polled on
//!   its own thread with staleness tracking
//! - **Demand**: per-source thermal curve with hysteresis and critical override
//! - **Ramp**: constant-rate PWM transitions independent of the tick interval
//! - **Safety**: fail-safe aggregation and a runtime status document
//! - **Ownership**: transactional hardware takeover, always handed back
//!
//! # Module Structure
//!
//! - `hw/` - Whole-value text I/O on PWM, enable and control-mode files
//! - `source/` - Temperature sources and the polling manager
//! - `engine/` - Demand policy, ramp controller and the control tick
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::time::Instant;
//! use fc_core::{BoardConfig, Controller, SourceManager};
//!
//! let cfg = BoardConfig::load(Path::new("/etc/fancontrol.conf")).unwrap();
//! let mut manager = SourceManager::from_config(&cfg);
//! manager.start().unwrap();
//!
//! let mut controller = Controller::new(cfg, false, None);
//! let report = controller.tick(&manager, Instant::now()).unwrap();
//! println!("target {}", report.target);
//! ```

// Grouped modules
pub mod engine;
pub mod hw;
pub mod source;

// Standalone modules
pub mod config;
pub mod constants;
pub mod guard;
pub mod safety;
pub mod shutdown;
pub mod status;

pub use config::{BoardConfig, BoardSourceConfig, ControlMode, SourceLocation};

pub use engine::{
    apply_ramp, apply_startup_boost, demand, Controller, RampAccumulator, TickReport,
};

pub use guard::{check_hardware_access, GuardStack, OwnershipGuard, RuntimePaths};

pub use safety::{compute_target_decision, SourceTelemetry, TargetDecision};

pub use shutdown::{ExitReason, ShutdownSignal};

pub use source::{
    RpcSource, SourceManager, SourceSnapshot, SysfsSource, TempSample, TempSource,
};

pub use status::{write_status_file, RuntimeStatus};

pub use fc_error::{FanControlError, Result};
