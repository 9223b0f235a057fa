//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::SchedulerError;

/// Map scheduler errors to a string for CLI output.
pub fn map_error(e: &SchedulerError) -> String {
    match e {
        SchedulerError::ConfigError(msg) => format!("Configuration error: {}", msg),
        SchedulerError::Io(err) => format!("I/O error: {}", err),
        other => other.to_string(),
    }
}
