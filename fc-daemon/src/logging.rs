//! Log initialisation
//!
//! Logs go to the systemd journal when its socket exists, otherwise to stderr.

use std::path::Path;

use fc_core::constants::{env, paths};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Where the subscriber ended up writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Journald,
    Stderr,
}

impl LogSink {
    pub fn describe(self) -> &'static str {
        match self {
            LogSink::Journald => "systemd journal",
            LogSink::Stderr => "stderr",
        }
    }
}

/// Pick the log filter: flag, then `FANCONTROL_LOG`, then the legacy `DEBUG` switch
pub fn resolve_level(flag: Option<&str>, log_var: Option<&str>, debug_var: Option<&str>) -> String {
    if let Some(level) = flag.filter(|l| !l.trim().is_empty()) {
        return level.trim().to_string();
    }
    if let Some(level) = log_var.filter(|l| !l.trim().is_empty()) {
        return level.trim().to_string();
    }
    match debug_var.map(str::trim) {
        Some(v) if !v.is_empty() && v != "0" => "debug".to_string(),
        _ => "info".to_string(),
    }
}

/// Resolve the level from the process environment
pub fn level_from_env(flag: Option<&str>) -> String {
    let log_var = std::env::var(env::LOG).ok();
    let debug_var = std::env::var(env::DEBUG).ok();
    resolve_level(flag, log_var.as_deref(), debug_var.as_deref())
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {:?}: {}, using info", level, e);
        EnvFilter::new("info")
    })
}

fn init_stderr(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter(level))
        .init();
}

/// Install the global subscriber
pub fn init(level: &str) -> LogSink {
    if !Path::new(paths::JOURNALD_SOCKET).exists() {
        init_stderr(level);
        return LogSink::Stderr;
    }

    match tracing_journald::layer() {
        Ok(journald_layer) => {
            tracing_subscriber::registry()
                .with(journald_layer)
                .with(filter(level))
                .init();
            LogSink::Journald
        }
        Err(e) => {
            eprintln!("Failed to create journald layer: {}, falling back to stderr", e);
            init_stderr(level);
            LogSink::Stderr
        }
    }
}
