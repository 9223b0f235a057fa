//! Workspace config file source: config/config.toml and config/{env}.toml

use config::builder::{ConfigBuilder, DefaultState};
use config::{ConfigError, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selects `config/{name}.toml`
pub const ENV_SELECTOR: &str = "RESTORE_SCHEDULER_ENV";

const DEFAULT_ENV: &str = "development";

/// Workspace layers in ascending precedence: the shared base file, then the file for the
/// selected environment.
pub fn layer_paths(workspace_root: &Path) -> [PathBuf; 2] {
    let dir = workspace_root.join("config");
    let env = std::env::var(ENV_SELECTOR)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ENV.to_string());
    [dir.join("config.toml"), dir.join(format!("{}.toml", env))]
}

/// Layer every workspace file that exists onto `builder`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = layer_paths(workspace_root)
        .into_iter()
        .filter(|path| path.is_file())
        .fold(builder, |builder, path| {
            debug!(config_path = %path.display(), "Adding workspace configuration");
            builder.add_source(File::from(path).required(false))
        });
    Ok(builder)
}
