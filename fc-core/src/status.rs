//! Runtime status document
//!
//! Rewritten once per tick. Readers always see a complete document because
//! it is written to `<path>.tmp` and renamed into place.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Serialize, Serializer};
use tracing::trace;

use crate::constants::status::POLICY;
use crate::safety::{SourceTelemetry, TargetDecision};
use fc_error::{FanControlError, Result};

/// Booleans are published as `0` / `1`
pub fn as_flag<S: Serializer>(value: &bool, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u8(u8::from(*value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PwmStatus {
    pub current: i32,
    pub target: i32,
    pub applied: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyFlags {
    #[serde(serialize_with = "as_flag")]
    pub any_valid: bool,
    #[serde(serialize_with = "as_flag")]
    pub any_timeout: bool,
    #[serde(serialize_with = "as_flag")]
    pub critical: bool,
}

impl From<&TargetDecision> for SafetyFlags {
    fn from(d: &TargetDecision) -> Self {
        Self {
            any_valid: d.any_valid,
            any_timeout: d.any_timeout,
            critical: d.critical,
        }
    }
}

/// Snapshot of one control tick
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatus<'a> {
    #[serde(serialize_with = "as_flag")]
    pub ok: bool,
    /// Unix seconds
    pub timestamp: u64,
    pub policy: &'static str,
    pub pwm: PwmStatus,
    pub safety: SafetyFlags,
    pub sources: &'a [SourceTelemetry],
}

impl<'a> RuntimeStatus<'a> {
    pub fn new(decision: &TargetDecision, pwm: PwmStatus, sources: &'a [SourceTelemetry]) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            ok: true,
            timestamp,
            policy: POLICY,
            pwm,
            safety: SafetyFlags::from(decision),
            sources,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Temporary sibling used for the atomic rename
pub fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Write the status document atomically
pub fn write_status_file(path: &Path, status: &RuntimeStatus<'_>) -> Result<()> {
    let json = status.to_json()?;
    let tmp = temp_path(path);
    let write_err = |p: &Path, e: std::io::Error| FanControlError::FileWrite {
        path: p.to_path_buf(),
        source: e,
    };

    let mut file = fs::File::create(&tmp).map_err(|e| write_err(&tmp, e))?;
    writeln!(file, "{}", json).map_err(|e| write_err(&tmp, e))?;
    file.sync_all().map_err(|e| write_err(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| write_err(path, e))?;
    trace!("Status written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn sample_status_parts() -> (TargetDecision, Vec<SourceTelemetry>) {
        let decision = TargetDecision {
            target_pwm: 128,
            any_valid: true,
            any_timeout: false,
            critical: false,
        };
        let sources = vec![SourceTelemetry {
            id: "soc".into(),
            has_polled: true,
            ok: true,
            active: true,
            temp_mc: 70_000,
            age_sec: 1,
            ttl_sec: 4,
            demand_pwm: 128,
            ..Default::default()
        }];
        (decision, sources)
    }

    #[test]
    fn test_document_shape() {
        let (decision, sources) = sample_status_parts();
        let pwm = PwmStatus {
            current: 100,
            target: 128,
            applied: 110,
        };
        let status = RuntimeStatus::new(&decision, pwm, &sources);
        let json: Value = serde_json::from_str(&status.to_json().unwrap()).unwrap();

        assert_eq!(json["ok"], 1);
        assert_eq!(json["policy"], "weighted-max");
        assert!(json["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(json["pwm"]["applied"], 110);
        assert_eq!(json["safety"]["any_valid"], 1);
        assert_eq!(json["safety"]["any_timeout"], 0);

        let src = &json["sources"][0];
        for key in [
            "id", "has_polled", "ok", "stale", "using_last_good", "active", "critical", "temp_mC",
            "age_s", "ttl_s", "demand_pwm", "error",
        ] {
            assert!(src.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(src["active"], 1);
        assert_eq!(src["stale"], 0);
        assert_eq!(src["temp_mC"], 70_000);
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fancontrol.status.json");
        let (decision, sources) = sample_status_parts();
        let pwm = PwmStatus {
            current: 0,
            target: 0,
            applied: 0,
        };

        write_status_file(&path, &RuntimeStatus::new(&decision, pwm, &sources)).unwrap();
        write_status_file(&path, &RuntimeStatus::new(&decision, pwm, &sources)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["sources"][0]["id"], "soc");
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("status.json");
        let (decision, sources) = sample_status_parts();
        let pwm = PwmStatus {
            current: 0,
            target: 0,
            applied: 0,
        };
        let err = write_status_file(&path, &RuntimeStatus::new(&decision, pwm, &sources)).unwrap_err();
        assert!(matches!(err, FanControlError::FileWrite { .. }));
    }
}
