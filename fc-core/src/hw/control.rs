//! Whole-value text I/O for sysfs-style control files
//!
//! Every hardware file is handled the same way: writes put a single integer
//! or token followed by a newline, reads take the first whitespace-trimmed
//! token of the file.
//!
//! # Files
//!
//! - PWM register: integer in `[PWM_MIN, PWM_MAX]`
//! - PWM enable: integer mode (`1` = manual)
//! - Control mode: text token (`user` / `kernel`)

use std::ffi::CString;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use fc_error::{FanControlError, Result};

/// Read the first whitespace-separated token of a file
pub fn read_token(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| FanControlError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    content
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| FanControlError::generic(format!("{} is empty", path.display())))
}

/// Read an integer value (temperature, PWM, enable mode)
pub fn read_int(path: &Path) -> Result<i32> {
    let token = read_token(path)?;
    token.parse::<i32>().map_err(|e| {
        FanControlError::generic(format!(
            "{}: cannot parse '{}' as integer: {}",
            path.display(),
            token,
            e
        ))
    })
}

/// Write a text token followed by a newline
pub fn write_token(path: &Path, token: &str) -> Result<()> {
    fs::write(path, format!("{}\n", token)).map_err(|e| FanControlError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write an integer followed by a newline
pub fn write_int(path: &Path, value: i32) -> Result<()> {
    write_token(path, &value.to_string())
}

/// Read the current PWM register value
pub fn read_pwm_value(pwm_path: &Path) -> Result<i32> {
    read_int(pwm_path).map_err(|e| FanControlError::PwmRead {
        path: pwm_path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write a PWM register value
pub fn set_pwm_value(pwm_path: &Path, value: i32) -> Result<()> {
    write_int(pwm_path, value).map_err(|e| FanControlError::PwmWrite {
        path: pwm_path.to_path_buf(),
        reason: format!("Failed to write PWM value {}: {}", value, e),
    })
}

/// Check access for the real uid, like `access(2)`
fn has_access(path: &Path, mode: libc::c_int) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call.
    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

/// Fail unless the file exists and is writable
pub fn check_writable(path: &Path) -> Result<()> {
    if has_access(path, libc::W_OK) {
        Ok(())
    } else {
        Err(FanControlError::PathNotWritable(path.to_path_buf()))
    }
}

/// Fail unless the file exists and is readable
pub fn check_readable(path: &Path) -> Result<()> {
    if has_access(path, libc::R_OK) {
        Ok(())
    } else {
        Err(FanControlError::PathNotReadable(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_first_token() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mode");
        fs::write(&path, "  enabled extra\nsecond line\n").unwrap();
        assert_eq!(read_token(&path).unwrap(), "enabled");
    }

    #[test]
    fn test_read_int_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("temp1_input");
        fs::write(&path, "hot\n").unwrap();
        assert!(read_int(&path).is_err());

        fs::write(&path, "").unwrap();
        assert!(read_int(&path).is_err());
    }

    #[test]
    fn test_write_appends_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pwm1");
        set_pwm_value(&path, 128).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "128\n");
        assert_eq!(read_pwm_value(&path).unwrap(), 128);
    }

    #[test]
    fn test_missing_file_is_not_writable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent");
        assert!(matches!(
            check_writable(&path),
            Err(FanControlError::PathNotWritable(_))
        ));
        fs::write(&path, "0\n").unwrap();
        assert!(check_writable(&path).is_ok());
        assert!(check_readable(&path).is_ok());
    }
}
