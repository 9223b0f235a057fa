//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override keys individually, so a file that only sets
/// `scheduler.idle_timeout_ms` keeps every other default.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("scheduler.queue_capacity", 150_i64)?
        .set_default("scheduler.idle_timeout_ms", 400_i64)?
        .set_default("scheduler.max_drain_window_ms", 30_000_i64)?
        .set_default("scheduler.promote_attempts_limit", 150_i64)?
        .set_default("scheduler.shutdown_timeout_ms", 5_000_i64)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
