//! Rate-limited PWM transitions
//!
//! Crossing the whole PWM span takes `ramp_up_sec` toward stronger cooling
//! and `ramp_down_sec` toward weaker cooling, whatever the tick interval.
//! Each tick earns `span * interval / ramp` units of credit; only whole units
//! are spent and the fraction carries over to the next tick.

use super::demand::{clamp_pwm, idle_pwm, is_stronger};
use crate::config::BoardConfig;

/// Fractional progress carried between ticks
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RampAccumulator {
    pub stronger_credit: f64,
    pub weaker_credit: f64,
}

impl RampAccumulator {
    pub fn reset(&mut self) {
        self.stronger_credit = 0.0;
        self.weaker_credit = 0.0;
    }
}

/// Move `current` toward `target` by at most the credit earned this tick
pub fn apply_ramp(current: i32, target: i32, acc: &mut RampAccumulator, cfg: &BoardConfig) -> i32 {
    if target == current {
        acc.reset();
        return current;
    }

    let span = f64::from(cfg.pwm_max - cfg.pwm_min);
    let interval = f64::from(cfg.interval_sec);
    let stronger = is_stronger(target, current, cfg);

    let credit = if stronger {
        acc.weaker_credit = 0.0;
        acc.stronger_credit += span * interval / f64::from(cfg.ramp_up_sec.max(1));
        &mut acc.stronger_credit
    } else {
        acc.stronger_credit = 0.0;
        acc.weaker_credit += span * interval / f64::from(cfg.ramp_down_sec.max(1));
        &mut acc.weaker_credit
    };

    let step = credit.floor();
    *credit -= step;
    let step = step.min(f64::from(i32::MAX)) as i32;

    let next = if target > current {
        current.saturating_add(step).min(target)
    } else {
        current.saturating_sub(step).max(target)
    };

    if next == target {
        acc.reset();
    }
    next
}

/// Kick a stalled fan with the startup level before settling on `target`
///
/// Applies only when the ramp output asks for active cooling, the startup
/// level cools harder than that request, and the fan currently runs weaker
/// than the startup level. Disabled when `pwm_startup` is negative.
pub fn apply_startup_boost(cfg: &BoardConfig, target: i32, current: i32) -> i32 {
    if cfg.pwm_startup < 0 {
        return target;
    }

    let startup = clamp_pwm(cfg, cfg.pwm_startup);
    let requesting_cooling = is_stronger(target, idle_pwm(cfg), cfg);
    let startup_stronger = is_stronger(startup, target, cfg);
    let current_weaker = is_stronger(startup, current, cfg);

    if requesting_cooling && startup_stronger && current_weaker {
        startup
    } else {
        target
    }
}
