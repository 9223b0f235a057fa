//! CLI route: single route table and run context.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_simulation_json, format_simulation_text};
use crate::config::{ConfigLoader, RestoreSchedulerConfig};
use crate::error::SchedulerError;
use crate::progress::sink::TracingProgressSink;
use crate::scheduler::RestoreScheduler;
use crate::simulate::{run_simulation, SimulatedExecutor, SimulationPlan};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Runtime context for CLI execution: workspace and the loaded configuration.
pub struct RunContext {
    workspace_root: PathBuf,
    config: RestoreSchedulerConfig,
}

impl RunContext {
    /// Load and validate configuration. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Result<Self, SchedulerError> {
        let config = load_config(&workspace_root, config_path.as_deref())?.validated()?;
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config(&self) -> &RestoreSchedulerConfig {
        &self.config
    }

    /// Execute a command and return its rendered output.
    pub fn execute(&self, command: &Commands) -> Result<String, SchedulerError> {
        match command {
            Commands::Simulate {
                producers,
                requests,
                restore_now,
                restore_ms,
                fail_every,
                stagger_ms,
                format,
            } => {
                let plan = SimulationPlan {
                    producers: *producers,
                    requests_per_producer: *requests,
                    restore_now_calls: *restore_now,
                    stagger: Duration::from_millis(*stagger_ms),
                };
                self.handle_simulate(
                    &plan,
                    Duration::from_millis(*restore_ms),
                    Some(*fail_every),
                    format,
                )
            }
            Commands::ShowConfig => self.config.to_toml(),
        }
    }

    fn handle_simulate(
        &self,
        plan: &SimulationPlan,
        restore_time: Duration,
        fail_every: Option<u64>,
        format: &str,
    ) -> Result<String, SchedulerError> {
        if format != "text" && format != "json" {
            return Err(SchedulerError::ConfigError(format!(
                "Invalid output format: {} (must be 'text' or 'json')",
                format
            )));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let executor = Arc::new(SimulatedExecutor::new(restore_time, fail_every));
        let scheduler = Arc::new(RestoreScheduler::with_runtime(
            self.config.scheduler.clone(),
            executor.clone(),
            Arc::new(TracingProgressSink),
            runtime.handle().clone(),
        )?);

        info!(workspace = %self.workspace_root.display(), "Running restore simulation");
        let report = runtime.block_on(async {
            let report = run_simulation(Arc::clone(&scheduler), plan).await;
            scheduler.shutdown().await;
            report
        })?;

        let records = executor.records();
        if format == "json" {
            format_simulation_json(&report, &records)
        } else {
            Ok(format_simulation_text(&report, &records))
        }
    }
}

/// Explicit file wins; otherwise the layered workspace configuration.
pub fn load_config(
    workspace_root: &Path,
    config_path: Option<&Path>,
) -> Result<RestoreSchedulerConfig, SchedulerError> {
    match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(workspace_root),
    }
}
