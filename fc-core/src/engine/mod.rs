//! Control engine
//!
//! - `demand` - per-source thermal curve with hysteresis
//! - `ramp` - rate-limited PWM transitions and startup boost
//! - `controller` - one control tick over all sources

pub mod controller;
pub mod demand;
pub mod ramp;

pub use controller::{Controller, TickReport};
pub use demand::{clamp_pwm, demand, full_pwm, idle_pwm, is_stronger, stronger};
pub use ramp::{apply_ramp, apply_startup_boost, RampAccumulator};
