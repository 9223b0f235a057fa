//! CLI parse: clap types for the restore scheduler. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Restore scheduler CLI - coalesce concurrent package restore requests
#[derive(Parser)]
#[command(name = "restore-scheduler")]
#[command(about = "Coalescing scheduler for solution package restores")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory searched for config/config.toml and config/{env}.toml
    #[arg(long, short = 'w', global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Read this file instead of the layered configuration
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Tracing filter level: trace, debug, info, warn, error or off
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log line format: text or json
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run concurrent producers against a simulated restore and summarize the coalescing
    Simulate {
        /// Number of concurrent producers calling schedule
        #[arg(long, default_value = "4")]
        producers: usize,

        /// Schedule calls per producer
        #[arg(long, default_value = "10")]
        requests: usize,

        /// Additional restore_now calls issued while producers run
        #[arg(long, default_value = "0")]
        restore_now: usize,

        /// Simulated duration of one restore in milliseconds
        #[arg(long, default_value = "200")]
        restore_ms: u64,

        /// Fail every Nth execution (0 = never)
        #[arg(long, default_value = "0")]
        fail_every: u64,

        /// Base pause between two requests of one producer in milliseconds
        #[arg(long, default_value = "20")]
        stagger_ms: u64,

        /// Report as a table (text) or as json
        #[arg(long, short = 'f', default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}
