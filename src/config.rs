//! Configuration System
//!
//! Layered configuration for the scheduler and its logging. Sources, lowest to highest
//! precedence: built-in defaults, the global user file, the workspace files, environment
//! variables (`RESTORE_SCHEDULER__SCHEDULER__IDLE_TIMEOUT_MS=250`).

use crate::error::SchedulerError;
use crate::logging::LoggingConfig;
use crate::queue::{DrainWindow, DEFAULT_QUEUE_CAPACITY};
use crate::slot::PROMOTE_ATTEMPTS_LIMIT;
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreSchedulerConfig {
    /// Coalescing and runner settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pending request capacity; requests beyond it are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// The coalescing window closes after the queue stays empty this long
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Upper bound on a single coalescing window
    #[serde(default = "default_max_drain_window_ms")]
    pub max_drain_window_ms: u64,

    /// Compare-and-swap attempts before promotion is declared failed
    #[serde(default = "default_promote_attempts_limit")]
    pub promote_attempts_limit: usize,

    /// How long a reset waits for the runner before abandoning it
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_idle_timeout_ms() -> u64 {
    400
}

fn default_max_drain_window_ms() -> u64 {
    30_000
}

fn default_promote_attempts_limit() -> usize {
    PROMOTE_ATTEMPTS_LIMIT
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_drain_window_ms: default_max_drain_window_ms(),
            promote_attempts_limit: default_promote_attempts_limit(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn drain_window(&self) -> DrainWindow {
        DrainWindow {
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
            max_window: Duration::from_millis(self.max_drain_window_ms),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate scheduler settings, collecting every problem.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.queue_capacity == 0 {
            problems.push("queue_capacity must be greater than zero".to_string());
        }
        if self.idle_timeout_ms == 0 {
            problems.push("idle_timeout_ms must be greater than zero".to_string());
        }
        if self.max_drain_window_ms < self.idle_timeout_ms {
            problems.push(format!(
                "max_drain_window_ms ({}) must not be shorter than idle_timeout_ms ({})",
                self.max_drain_window_ms, self.idle_timeout_ms
            ));
        }
        if self.promote_attempts_limit == 0 {
            problems.push("promote_attempts_limit must be greater than zero".to_string());
        }
        problems
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Scheduler(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Scheduler(msg) => write!(f, "Scheduler: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl RestoreSchedulerConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors: Vec<ValidationError> = self
            .scheduler
            .validate()
            .into_iter()
            .map(ValidationError::Scheduler)
            .collect();

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into a single error.
    pub fn validated(self) -> Result<Self, SchedulerError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SchedulerError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> Result<String, SchedulerError> {
        toml::to_string_pretty(self)
            .map_err(|e| SchedulerError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
