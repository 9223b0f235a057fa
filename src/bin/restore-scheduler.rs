//! Restore scheduler CLI binary
//!
//! Runs the simulator and inspects configuration.

use clap::Parser;
use restore_scheduler::cli::{map_error, Cli, RunContext};
use restore_scheduler::error::SchedulerError;
use restore_scheduler::logging::{init_logging, LoggingConfig};
use std::process::ExitCode;
use tracing::{debug, error};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(Some(&logging_for(&cli))) {
        eprintln!("Logging unavailable: {}", map_error(&e));
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(rendered) => {
            println!("{}", rendered);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "restore-scheduler failed");
            eprintln!("{}", map_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<String, SchedulerError> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())?;
    debug!(workspace = %context.workspace_root().display(), "Configuration loaded");
    context.execute(&cli.command)
}

/// Logging settings for this invocation. Flags beat the loaded file, which beats defaults.
///
/// A configuration that fails to load still gets default logging; the load error is reported
/// again by [`run`] once logging is up.
fn logging_for(cli: &Cli) -> LoggingConfig {
    let loaded = restore_scheduler::cli::load_config(&cli.workspace, cli.config.as_deref());
    let mut logging = loaded.map(|config| config.logging).unwrap_or_default();

    let level = match (&cli.log_level, cli.verbose) {
        (Some(level), _) => Some(level.clone()),
        (None, true) => Some("debug".to_string()),
        (None, false) => None,
    };
    if let Some(level) = level {
        logging.level = level;
    }
    if let Some(format) = &cli.log_format {
        logging.format = format.clone();
    }
    logging
}
