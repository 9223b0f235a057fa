//! Error types for the restore scheduler.

use thiserror::Error;

/// Scheduler-level errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Failed promoting pending task after {attempts} attempts")]
    PromotionExhausted { attempts: usize },

    #[error("Request queue closed")]
    QueueClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Background runner failed: {0}")]
    RunnerFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SchedulerError::Cancelled)
    }
}

impl From<config::ConfigError> for SchedulerError {
    fn from(err: config::ConfigError) -> Self {
        SchedulerError::ConfigError(err.to_string())
    }
}

/// Errors reported by a restore executor
#[derive(Debug, Clone, Error)]
pub enum RestoreError {
    #[error("Restore cancelled")]
    Cancelled,

    #[error("Restore failed: {0}")]
    Failed(String),

    #[error("Restore left {count} package(s) missing")]
    MissingPackages { count: usize },

    #[error("Restore executor panicked: {0}")]
    Panicked(String),

    #[error("Internal restore error: {0}")]
    Internal(String),
}

impl RestoreError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, RestoreError::Cancelled)
    }
}
