//! Per-source thermal demand
//!
//! Maps one temperature reading onto the PWM span.
//!
//! # How It Works
//!
//! 1. **Critical**: at or above `t_crit` the source demands full cooling.
//! 2. **Hysteresis**: an idle source activates at `t_start + hysteresis` and
//!    an active one drops back to idle at `t_start - hysteresis`, so readings
//!    oscillating inside that band never toggle the latch.
//! 3. **Linear ramp**: between `t_start` and `t_full` the demand scales
//!    linearly, multiplied by the source weight.
//!
//! Whether a higher register value cools harder is a single configuration
//! bit. Every "stronger than" comparison goes through [`is_stronger`].

use crate::config::{BoardConfig, BoardSourceConfig};

/// Weakest cooling level of the configured span
pub fn idle_pwm(cfg: &BoardConfig) -> i32 {
    if cfg.pwm_inverted {
        cfg.pwm_max
    } else {
        cfg.pwm_min
    }
}

/// Strongest cooling level of the configured span
pub fn full_pwm(cfg: &BoardConfig) -> i32 {
    if cfg.pwm_inverted {
        cfg.pwm_min
    } else {
        cfg.pwm_max
    }
}

/// True if `candidate` cools harder than `baseline`
pub fn is_stronger(candidate: i32, baseline: i32, cfg: &BoardConfig) -> bool {
    if cfg.pwm_inverted {
        candidate < baseline
    } else {
        candidate > baseline
    }
}

/// The stronger cooling level of the two
pub fn stronger(lhs: i32, rhs: i32, cfg: &BoardConfig) -> i32 {
    if is_stronger(rhs, lhs, cfg) {
        rhs
    } else {
        lhs
    }
}

pub fn clamp_pwm(cfg: &BoardConfig, pwm: i32) -> i32 {
    pwm.clamp(cfg.pwm_min, cfg.pwm_max)
}

/// Cooling demand of one source at `temp_mc`
///
/// `active` is the source's hysteresis latch and persists across calls.
/// `critical` is reset on every call and set only at or above `t_crit`.
pub fn demand(
    cfg: &BoardConfig,
    src: &BoardSourceConfig,
    temp_mc: i32,
    active: &mut bool,
    critical: &mut bool,
) -> i32 {
    *critical = false;

    if temp_mc >= src.t_crit_mc {
        *critical = true;
        *active = true;
        return full_pwm(cfg);
    }

    let on_threshold = src.t_start_mc.saturating_add(cfg.hysteresis_mc);
    let off_threshold = src.t_start_mc.saturating_sub(cfg.hysteresis_mc);

    if !*active {
        if temp_mc < on_threshold {
            return idle_pwm(cfg);
        }
        *active = true;
    } else if temp_mc <= off_threshold {
        *active = false;
        return idle_pwm(cfg);
    }

    let ratio = if temp_mc <= src.t_start_mc {
        0.0
    } else if temp_mc >= src.t_full_mc {
        1.0
    } else {
        f64::from(temp_mc - src.t_start_mc) / f64::from(src.t_full_mc - src.t_start_mc)
    };
    let ratio = (ratio * f64::from(src.weight) / 100.0).clamp(0.0, 1.0);

    let step = (ratio * f64::from(cfg.pwm_max - cfg.pwm_min)).round() as i32;
    let pwm = if cfg.pwm_inverted {
        cfg.pwm_max - step
    } else {
        cfg.pwm_min + step
    };
    clamp_pwm(cfg, pwm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceLocation;
    use std::path::PathBuf;

    fn source(weight: i32) -> BoardSourceConfig {
        BoardSourceConfig {
            id: "soc".into(),
            location: SourceLocation::Sysfs {
                path: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            },
            t_start_mc: 60_000,
            t_full_mc: 80_000,
            t_crit_mc: 90_000,
            ttl_sec: 4,
            poll_sec: 2,
            weight,
        }
    }

    fn eval(cfg: &BoardConfig, src: &BoardSourceConfig, temp: i32, active: &mut bool) -> (i32, bool) {
        let mut critical = false;
        let pwm = demand(cfg, src, temp, active, &mut critical);
        (pwm, critical)
    }

    #[test]
    fn test_scenario_curve_points() {
        let cfg = BoardConfig::default();
        let src = source(100);

        let mut active = false;
        assert_eq!(eval(&cfg, &src, 60_000, &mut active), (0, false));
        assert!(!active);

        let mut active = false;
        let (pwm, critical) = eval(&cfg, &src, 70_000, &mut active);
        assert!(pwm == 127 || pwm == 128, "{}", pwm);
        assert!(!critical);
        assert!(active);

        let mut active = false;
        assert_eq!(eval(&cfg, &src, 95_000, &mut active), (255, true));
        assert!(active);
    }

    #[test]
    fn test_below_start_is_idle() {
        let cfg = BoardConfig::default();
        let src = source(100);
        for temp in [-40_000, 0, 30_000, 59_999] {
            let mut active = false;
            assert_eq!(eval(&cfg, &src, temp, &mut active).0, idle_pwm(&cfg));
            assert!(!active);
        }
    }

    #[test]
    fn test_critical_overrides_latch() {
        let cfg = BoardConfig::default();
        let src = source(10);
        for start_active in [false, true] {
            let mut active = start_active;
            assert_eq!(eval(&cfg, &src, 90_000, &mut active), (255, true));
        }
    }

    #[test]
    fn test_hysteresis_has_no_chatter() {
        let cfg = BoardConfig::default();
        let src = source(100);
        let mut active = false;

        eval(&cfg, &src, 62_000, &mut active);
        assert!(active);

        // Strictly between t_start - hyst and t_start + hyst
        for temp in [61_999, 58_001, 60_000, 61_000, 58_500, 59_000] {
            eval(&cfg, &src, temp, &mut active);
            assert!(active, "dropped at {}", temp);
        }

        assert_eq!(eval(&cfg, &src, 58_000, &mut active).0, 0);
        assert!(!active);

        for temp in [58_001, 60_000, 61_999] {
            eval(&cfg, &src, temp, &mut active);
            assert!(!active, "activated at {}", temp);
        }
    }

    #[test]
    fn test_weight_scales_and_saturates() {
        let cfg = BoardConfig::default();

        let mut active = true;
        assert_eq!(eval(&cfg, &source(50), 80_000, &mut active).0, 128);

        let mut active = true;
        assert_eq!(eval(&cfg, &source(200), 70_000, &mut active).0, 255);
    }

    #[test]
    fn test_inverted_polarity() {
        let cfg = BoardConfig {
            pwm_inverted: true,
            pwm_min: 40,
            pwm_max: 240,
            ..BoardConfig::default()
        };
        let src = source(100);

        assert_eq!(idle_pwm(&cfg), 240);
        assert_eq!(full_pwm(&cfg), 40);
        assert!(is_stronger(40, 240, &cfg));
        assert_eq!(stronger(100, 90, &cfg), 90);

        let mut active = false;
        assert_eq!(eval(&cfg, &src, 50_000, &mut active).0, 240);
        let mut active = false;
        assert_eq!(eval(&cfg, &src, 70_000, &mut active).0, 140);
        let mut active = false;
        assert_eq!(eval(&cfg, &src, 91_000, &mut active), (40, true));
    }
}
