//! Hardware boundary
//!
//! - `control` - text I/O for PWM, enable and control-mode files

pub mod control;

pub use control::{
    check_readable, check_writable, read_int, read_pwm_value, read_token, set_pwm_value,
    write_int, write_token,
};
