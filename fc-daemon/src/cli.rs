//! Command Line Interface

use std::path::PathBuf;

use clap::Parser;
use fc_core::constants::paths;
use fc_core::RuntimePaths;

#[derive(Parser, Debug)]
#[command(name = "fancontrold")]
#[command(version)]
#[command(about = "Closed-loop PWM fan control for SoC boards")]
#[command(long_about = "Closed-loop PWM fan control for SoC boards

Polls every configured temperature source on its own schedule, turns each
reading into a cooling demand and drives one PWM channel toward the
strongest demand at a bounded rate.

SIGNALS:
    SIGINT, SIGHUP      Restore the original fan state and exit with 1
    SIGTERM, SIGQUIT    Restore the original fan state and exit with 0

ENVIRONMENT VARIABLES:
    FANCONTROL_LOG=debug   Log filter when --log-level is not given
    DEBUG=1                Shorthand for FANCONTROL_LOG=debug")]
pub struct Cli {
    /// Configuration file
    #[arg(default_value = paths::CONFIG_FILE)]
    pub config: PathBuf,

    /// Validate the configuration, print it back and exit
    #[arg(long, conflicts_with = "dump_config")]
    pub check: bool,

    /// Print the validated configuration as JSON and exit
    #[arg(long)]
    pub dump_config: bool,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[arg(long, hide = true, default_value = paths::LOCK_FILE)]
    pub lock_file: PathBuf,

    #[arg(long, hide = true, default_value = paths::PID_FILE)]
    pub pid_file: PathBuf,

    #[arg(long, hide = true, default_value = paths::STATUS_FILE)]
    pub status_file: PathBuf,
}

impl Cli {
    pub fn runtime_paths(&self) -> RuntimePaths {
        RuntimePaths {
            lock_file: self.lock_file.clone(),
            pid_file: self.pid_file.clone(),
            status_file: self.status_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["fancontrold"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(paths::CONFIG_FILE));
        assert!(!cli.check);
        assert!(!cli.dump_config);
        assert!(cli.log_level.is_none());

        let runtime = cli.runtime_paths();
        assert_eq!(runtime.lock_file, PathBuf::from(paths::LOCK_FILE));
        assert_eq!(runtime.pid_file, PathBuf::from(paths::PID_FILE));
        assert_eq!(runtime.status_file, PathBuf::from(paths::STATUS_FILE));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "fancontrold",
            "/tmp/board.conf",
            "--check",
            "--log-level",
            "debug",
            "--status-file",
            "/tmp/status.json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/tmp/board.conf"));
        assert!(cli.check);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.runtime_paths().status_file, PathBuf::from("/tmp/status.json"));
    }

    #[test]
    fn test_check_and_dump_conflict() {
        assert!(Cli::try_parse_from(["fancontrold", "--check", "--dump-config"]).is_err());
    }
}
