//! Configuration loading entry point.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::RestoreSchedulerConfig;
use crate::error::SchedulerError;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "RESTORE_SCHEDULER";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the layered configuration for `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<RestoreSchedulerConfig, SchedulerError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: RestoreSchedulerConfig = builder.build()?.try_deserialize()?;
        debug!(workspace_root = %workspace_root.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load a single configuration file on top of the defaults, ignoring every other source.
    pub fn load_from_file(path: &Path) -> Result<RestoreSchedulerConfig, SchedulerError> {
        if !path.exists() {
            return Err(SchedulerError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: RestoreSchedulerConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from_str(&contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Defaults only.
    pub fn defaults() -> Result<RestoreSchedulerConfig, SchedulerError> {
        let config: Config = merge_policy::builder_with_defaults()?.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Location of the user-level config file, if one can be determined.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
