//! fancontrol daemon (fancontrold)
//!
//! Drives one PWM fan channel from a set of temperature sources.
//!
//! # Startup
//! 1. Parse the command line and initialise logging
//! 2. Load and validate the board configuration
//! 3. Register signal handlers, check hardware access, then acquire the
//!    ownership guards (instance lock, pid file, PWM takeover in user mode,
//!    status file)
//! 4. Start one polling worker per source
//! 5. Run the control loop until a signal or a fatal error
//!
//! # Shutdown
//! Workers are stopped and joined first, then the guards are released in
//! reverse order, which hands the fan back to its original state.

mod cli;
mod control_loop;
mod logging;
mod signals;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use fc_core::{
    check_hardware_access, BoardConfig, Controller, ExitReason, GuardStack, ShutdownSignal,
    SourceManager,
};
use tracing::{error, info};

use crate::cli::Cli;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        error!("PANIC at {}: {}", location, message);
    }));
}

/// Run the daemon; returns the process exit status
async fn run(cli: Cli) -> anyhow::Result<i32> {
    let cfg = BoardConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if cli.check {
        print!("{}", cfg.render_text());
        return Ok(0);
    }
    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(0);
    }

    info!(
        "STARTUP: {} source(s), control mode {}, interval {}s",
        cfg.sources.len(),
        cfg.control_mode.as_str(),
        cfg.interval_sec
    );

    // Handlers go in before anything is taken over so a signal always unwinds
    let signals = signals::TerminationSignals::register().context("registering signal handlers")?;

    check_hardware_access(&cfg)?;

    let paths = cli.runtime_paths();
    let guards = GuardStack::acquire(&cfg, &paths)?;
    info!("STARTUP: PID: {}", std::process::id());

    let shutdown = Arc::new(ShutdownSignal::new());
    let signal_shutdown = Arc::clone(&shutdown);
    let signal_task = tokio::spawn(signals.listen(signal_shutdown));

    let mut manager = SourceManager::from_config(&cfg);
    manager.start()?;

    let mut controller = Controller::new(cfg, guards.owns_pwm(), Some(paths.status_file.clone()));
    let loop_shutdown = Arc::clone(&shutdown);
    let outcome = tokio::task::spawn_blocking(move || {
        let result = control_loop::run(&mut controller, &manager, &loop_shutdown);
        manager.stop();
        result
    })
    .await;

    signal_task.abort();
    drop(guards);
    info!("SHUTDOWN: Ownership released");

    match outcome {
        Ok(Ok(())) => Ok(shutdown.reason().unwrap_or(ExitReason::Plain).exit_code()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow!("control loop aborted: {}", e)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    install_panic_hook();
    let level = logging::level_from_env(cli.log_level.as_deref());
    let sink = logging::init(&level);

    if !cli.check && !cli.dump_config {
        info!("STARTUP: fancontrold {} starting", VERSION);
        info!("STARTUP: Logging to {} at {}", sink.describe(), level);
    }

    match run(cli).await {
        Ok(code) => {
            info!("SHUTDOWN: Exiting with status {}", code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
