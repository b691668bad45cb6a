//! Safety aggregation
//!
//! Folds every source's snapshot into one [`TargetDecision`] per tick.
//!
//! # Classification
//!
//! - **Timed out**: no good sample within `ttl_sec`. Its last good reading is
//!   ignored and the target is raised to at least the fail-safe level.
//! - **Not yet valid**: never sampled successfully, still inside its ttl.
//! - **Valid**: its demand joins the combined target, stronger wins.
//!
//! Any critical source forces full cooling, and so does having no valid
//! source at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::config::BoardConfig;
use crate::engine::demand::{clamp_pwm, demand, full_pwm, idle_pwm, stronger};
use crate::source::TempSource;
use crate::status::as_flag;

/// Per-tick decision; never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDecision {
    pub target_pwm: i32,
    pub any_valid: bool,
    pub any_timeout: bool,
    pub critical: bool,
}

/// Per-source view published in the status document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceTelemetry {
    pub id: String,
    #[serde(serialize_with = "as_flag")]
    pub has_polled: bool,
    #[serde(serialize_with = "as_flag")]
    pub ok: bool,
    #[serde(serialize_with = "as_flag")]
    pub stale: bool,
    #[serde(serialize_with = "as_flag")]
    pub using_last_good: bool,
    #[serde(serialize_with = "as_flag")]
    pub active: bool,
    #[serde(serialize_with = "as_flag")]
    pub critical: bool,
    #[serde(rename = "temp_mC")]
    pub temp_mc: i32,
    #[serde(rename = "age_s")]
    pub age_sec: u64,
    #[serde(rename = "ttl_s")]
    pub ttl_sec: u32,
    pub demand_pwm: i32,
    pub error: String,
}

/// Combine all sources into one target
///
/// `active_state` holds each source's hysteresis latch across ticks.
/// `monitor_since` is when polling started; a source that has never produced
/// a good sample counts as timed out once its ttl has elapsed since then.
pub fn compute_target_decision(
    cfg: &BoardConfig,
    sources: &[Arc<dyn TempSource>],
    active_state: &mut HashMap<String, bool>,
    monitor_since: Instant,
    now: Instant,
) -> (TargetDecision, Vec<SourceTelemetry>) {
    let mut decision = TargetDecision {
        target_pwm: idle_pwm(cfg),
        any_valid: false,
        any_timeout: false,
        critical: false,
    };
    let mut telemetry = Vec::with_capacity(sources.len());

    for source in sources {
        let mut item = SourceTelemetry {
            id: source.id().to_string(),
            demand_pwm: idle_pwm(cfg),
            ..Default::default()
        };
        let Some(src) = cfg.source(&item.id) else {
            item.error = "source id missing in config".to_string();
            telemetry.push(item);
            continue;
        };
        item.ttl_sec = src.ttl_sec;

        let snap = source.snapshot();
        item.has_polled = snap.has_polled;

        if let Some(last) = &snap.last_sample {
            item.ok = last.ok;
            item.error = last.error.clone();
            if last.ok {
                item.temp_mc = last.temp_mc;
            }
            item.age_sec = now.saturating_duration_since(last.timestamp).as_secs();
        }

        let ttl = u64::from(src.ttl_sec);
        let Some(good) = &snap.last_good_sample else {
            if now.saturating_duration_since(monitor_since).as_secs() > ttl {
                item.stale = true;
                decision.any_timeout = true;
                debug!(source = %item.id, ttl_s = ttl, "No good sample since startup");
            }
            telemetry.push(item);
            continue;
        };

        item.age_sec = now.saturating_duration_since(good.timestamp).as_secs();
        if !item.ok {
            item.using_last_good = true;
            item.temp_mc = good.temp_mc;
        }
        if item.age_sec > ttl {
            item.stale = true;
            decision.any_timeout = true;
            debug!(source = %item.id, age_s = item.age_sec, ttl_s = ttl, "Source timed out");
            telemetry.push(item);
            continue;
        }

        decision.any_valid = true;
        let active = active_state.entry(item.id.clone()).or_insert(false);
        let mut source_critical = false;
        item.demand_pwm = demand(cfg, src, good.temp_mc, active, &mut source_critical);
        item.active = *active;
        item.critical = source_critical;
        decision.critical |= source_critical;
        decision.target_pwm = stronger(decision.target_pwm, item.demand_pwm, cfg);

        debug!(
            source = %item.id,
            temp_mc = item.temp_mc,
            demand = item.demand_pwm,
            active = item.active,
            using_last_good = item.using_last_good,
            "Source demand"
        );
        telemetry.push(item);
    }

    if decision.critical || !decision.any_valid {
        decision.target_pwm = full_pwm(cfg);
    }
    if decision.any_timeout {
        decision.target_pwm = stronger(decision.target_pwm, clamp_pwm(cfg, cfg.failsafe_pwm), cfg);
    }
    decision.target_pwm = clamp_pwm(cfg, decision.target_pwm);

    (decision, telemetry)
}
