//! One control tick
//!
//! Reads source snapshots, decides a target, ramps toward it, writes the
//! register when this process owns it, and publishes the status document.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, warn};

use super::demand::full_pwm;
use super::ramp::{apply_ramp, apply_startup_boost, RampAccumulator};
use crate::config::BoardConfig;
use crate::hw::control::{read_pwm_value, set_pwm_value};
use crate::safety::{compute_target_decision, SourceTelemetry, TargetDecision};
use crate::source::SourceManager;
use crate::status::{write_status_file, PwmStatus, RuntimeStatus};
use fc_error::Result;

/// What happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub decision: TargetDecision,
    /// Register value before the tick
    pub current: i32,
    pub target: i32,
    /// Register value after the tick
    pub applied: i32,
    pub telemetry: Vec<SourceTelemetry>,
}

/// Control state carried across ticks for one PWM channel
pub struct Controller {
    cfg: BoardConfig,
    owns_pwm: bool,
    current_pwm: i32,
    ramp: RampAccumulator,
    active_state: HashMap<String, bool>,
    status_path: Option<PathBuf>,
    monitor_since: Instant,
}

impl Controller {
    /// `owns_pwm` is false in kernel mode: the register is observed, never written
    pub fn new(cfg: BoardConfig, owns_pwm: bool, status_path: Option<PathBuf>) -> Self {
        let current_pwm = read_pwm_value(&cfg.pwm_path).unwrap_or_else(|e| {
            debug!("Initial PWM unreadable, assuming full cooling: {}", e);
            full_pwm(&cfg)
        });
        Self {
            cfg,
            owns_pwm,
            current_pwm,
            ramp: RampAccumulator::default(),
            active_state: HashMap::new(),
            status_path,
            monitor_since: Instant::now(),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.cfg
    }

    pub fn current_pwm(&self) -> i32 {
        self.current_pwm
    }

    pub fn owns_pwm(&self) -> bool {
        self.owns_pwm
    }

    /// Run one tick; only a failed PWM write is an error
    pub fn tick(&mut self, manager: &SourceManager, now: Instant) -> Result<TickReport> {
        if !self.owns_pwm {
            match read_pwm_value(&self.cfg.pwm_path) {
                Ok(v) => self.current_pwm = v,
                Err(e) => debug!("Keeping last observed PWM {}: {}", self.current_pwm, e),
            }
        }
        let current = self.current_pwm;

        let (decision, telemetry) = compute_target_decision(
            &self.cfg,
            manager.sources(),
            &mut self.active_state,
            self.monitor_since,
            now,
        );

        let applied = if self.owns_pwm {
            let ramped = apply_ramp(current, decision.target_pwm, &mut self.ramp, &self.cfg);
            let next = apply_startup_boost(&self.cfg, ramped, current);
            if next != current {
                set_pwm_value(&self.cfg.pwm_path, next)?;
                debug!(
                    target_pwm = decision.target_pwm,
                    applied = next,
                    "PWM {} -> {}",
                    current,
                    next
                );
            }
            self.current_pwm = next;
            next
        } else {
            current
        };

        if let Some(path) = &self.status_path {
            let pwm = PwmStatus {
                current,
                target: decision.target_pwm,
                applied,
            };
            let status = RuntimeStatus::new(&decision, pwm, &telemetry);
            if let Err(e) = write_status_file(path, &status) {
                warn!("Failed to write status file: {}", e);
            }
        }

        Ok(TickReport {
            decision,
            current,
            target: decision.target_pwm,
            applied,
            telemetry,
        })
    }
}
