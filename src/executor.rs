//! Restore executor seam
//!
//! The scheduler never restores anything itself. It hands the accumulated request, the job
//! context and a run-scoped progress sink to a [`RestoreExecutor`] and maps whatever comes
//! back (including panics) onto a [`RestoreOutcome`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::RestoreJobContext;
use crate::error::RestoreError;
use crate::operation::{OperationId, RestoreOutcome};
use crate::progress::operation_log::RestoreOperationLogger;
use crate::progress::sink::ProgressSink;
use crate::request::{ExplicitRestoreReason, RestoreRequest, RestoreSource};

/// What closed the coalescing window of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreTrigger {
    /// The queue stayed empty for a full idle interval
    Idle,
    /// The maximum drain window elapsed
    MaxWindow,
    /// A request from a different source arrived and ended the window
    ExplicitUpgrade,
    /// The request did not allow a delayed start, so no window was opened
    Immediate,
    /// `restore_now`, no queue involved
    Direct,
}

impl RestoreTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreTrigger::Idle => "idle",
            RestoreTrigger::MaxWindow => "max_window",
            RestoreTrigger::ExplicitUpgrade => "explicit_upgrade",
            RestoreTrigger::Immediate => "immediate",
            RestoreTrigger::Direct => "direct",
        }
    }
}

/// Bookkeeping describing one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreTrackingData {
    pub operation_id: OperationId,
    /// Requests folded into this run (1 for a direct restore)
    pub request_count: usize,
    pub trigger: RestoreTrigger,
    pub explicit_reason: ExplicitRestoreReason,
    /// First implicit restore since the scheduler was created or reset
    pub is_solution_load_restore: bool,
    pub seconds_since_last_restore: Option<f64>,
    pub last_restore_source: Option<RestoreSource>,
    pub started_at: DateTime<Utc>,
}

impl RestoreTrackingData {
    pub fn new(operation_id: OperationId, request_count: usize, trigger: RestoreTrigger) -> Self {
        Self {
            operation_id,
            request_count,
            trigger,
            explicit_reason: ExplicitRestoreReason::None,
            is_solution_load_restore: false,
            seconds_since_last_restore: None,
            last_restore_source: None,
            started_at: Utc::now(),
        }
    }
}

/// Everything an executor receives for one run.
pub struct RestoreInvocation {
    pub request: RestoreRequest,
    pub job_context: Arc<RestoreJobContext>,
    pub tracking: RestoreTrackingData,
    /// Run-scoped sink; output sent after the run finished is discarded
    pub progress: Arc<dyn ProgressSink>,
}

/// Performs the actual restore.
///
/// `Ok(true)` is success, `Ok(false)` a reported failure. Implementations should observe
/// `cancel`; the scheduler also drops the future when its shutdown signal fires.
#[async_trait]
pub trait RestoreExecutor: Send + Sync {
    async fn execute(
        &self,
        invocation: RestoreInvocation,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError>;
}

/// Run `executor` once and translate the result into an outcome.
///
/// Never fails: executor errors and panics become `Faulted`, and cancellation (either the
/// executor returning [`RestoreError::Cancelled`] or `cancel` firing first) becomes
/// `Cancelled`.
pub(crate) async fn execute_guarded(
    executor: &dyn RestoreExecutor,
    request: RestoreRequest,
    job_context: Arc<RestoreJobContext>,
    tracking: RestoreTrackingData,
    sink: Arc<dyn ProgressSink>,
    cancel: &CancellationToken,
) -> RestoreOutcome {
    let operation_id = tracking.operation_id;
    let logger = Arc::new(RestoreOperationLogger::start(sink, &request, &tracking));
    let execution = job_context.record_execution();

    info!(
        operation_id = %operation_id,
        request_count = tracking.request_count,
        trigger = tracking.trigger.as_str(),
        force_restore = request.force_restore,
        execution,
        "Restore started"
    );

    let invocation = RestoreInvocation {
        request,
        job_context,
        tracking,
        progress: logger.clone(),
    };
    let run = AssertUnwindSafe(executor.execute(invocation, cancel.child_token())).catch_unwind();

    let outcome = tokio::select! {
        result = run => match result {
            Ok(Ok(success)) => RestoreOutcome::from_success(success),
            Ok(Err(err)) if err.is_cancellation() => RestoreOutcome::Cancelled,
            Ok(Err(err)) => {
                error!(operation_id = %operation_id, error = %err, "Restore executor failed");
                logger.log_exception(&err);
                RestoreOutcome::Faulted(Arc::new(err))
            }
            Err(panic) => {
                let err = RestoreError::Panicked(panic_message(panic.as_ref()));
                error!(operation_id = %operation_id, error = %err, "Restore executor panicked");
                logger.log_exception(&err);
                RestoreOutcome::Faulted(Arc::new(err))
            }
        },
        _ = cancel.cancelled() => {
            debug!(operation_id = %operation_id, "Restore execution cancelled");
            RestoreOutcome::Cancelled
        }
    };

    let duration = logger.finish(&outcome);
    info!(
        operation_id = %operation_id,
        outcome = outcome.as_str(),
        duration_ms = duration.as_millis() as u64,
        "Restore finished"
    );
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
