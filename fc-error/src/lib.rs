//! Unified error handling for fancontrol
//!
//! A single error type used by the core library and the daemon.
//! Per-source sampling failures never travel as errors; they are folded into
//! a failed sample and only their `Display` text survives.

use std::io;
use std::path::PathBuf;

/// Result type alias using FanControlError
pub type Result<T> = std::result::Result<T, FanControlError>;

/// Unified error type for all fancontrol operations
#[derive(thiserror::Error, Debug)]
pub enum FanControlError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Path is not readable: {0}")]
    PathNotReadable(PathBuf),

    #[error("Path is not writable: {0}")]
    PathNotWritable(PathBuf),

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to read temperature from {path}: {reason}")]
    TemperatureRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to read PWM from {path}: {reason}")]
    PwmRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to write PWM to {path}: {reason}")]
    PwmWrite {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to switch control mode via {path}: {reason}")]
    ControlMode {
        path: PathBuf,
        reason: String,
    },

    // ============================================================================
    // Temperature Source Errors
    // ============================================================================
    #[error("RPC call {target} failed: {reason}")]
    Rpc {
        target: String,
        reason: String,
    },

    #[error("RPC reply for {target} has no usable field {key}")]
    RpcReplyField {
        target: String,
        key: String,
    },

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Failed to start worker for source {id}: {reason}")]
    WorkerSpawn {
        id: String,
        reason: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    // ============================================================================
    // Lifecycle Errors
    // ============================================================================
    #[error(
        "Instance lock {path} is already held{}, is fancontrol already running?",
        .holder.map(|pid| format!(" by process {}", pid)).unwrap_or_default()
    )]
    InstanceLocked {
        path: PathBuf,
        holder: Option<i32>,
    },

    #[error("File {path} exists and process {pid} is running, is fancontrol already running?")]
    AlreadyRunning {
        path: PathBuf,
        pid: i32,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl FanControlError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an RPC error for `object.method`
    pub fn rpc(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rpc {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

// Allow converting from String to FanControlError
impl From<String> for FanControlError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to FanControlError
impl From<&str> for FanControlError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
