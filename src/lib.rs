//! Restore Scheduler: coalescing scheduler for solution package restores
//!
//! Many uncoordinated callers ask for the solution's packages to be restored. The scheduler
//! folds their requests into as few restore runs as possible, never runs two restores at
//! once, and gives every caller the outcome of the run that covered its request.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod operation;
pub mod progress;
pub mod queue;
pub mod request;
mod runner;
pub mod scheduler;
pub mod simulate;
pub mod slot;
pub mod state;

pub use config::{RestoreSchedulerConfig, SchedulerConfig};
pub use context::{DependencyGraphCache, RestoreJobContext};
pub use error::{RestoreError, SchedulerError};
pub use executor::{RestoreExecutor, RestoreInvocation, RestoreTrackingData, RestoreTrigger};
pub use operation::{OperationFuture, OperationId, PendingOperation, RestoreOutcome};
pub use progress::{LogLevel, ProgressSink};
pub use request::{ExplicitRestoreReason, RestoreRequest, RestoreSource};
pub use scheduler::RestoreScheduler;
pub use state::{RunnerState, SchedulerStats};
