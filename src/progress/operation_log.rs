//! Run-scoped logger handed to a restore executor.
//!
//! Wraps the scheduler's [`ProgressSink`] for exactly one execution: writes the header and
//! the summary, forwards executor output while the run is open, and drops anything the
//! executor reports after the run finished. Sink panics are swallowed.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::RestoreError;
use crate::executor::RestoreTrackingData;
use crate::operation::{OperationId, RestoreOutcome};
use crate::progress::event::{RestoreFinishedData, RestoreStartedData};
use crate::progress::sink::{call_guarded, LogLevel, ProgressSink};
use crate::request::RestoreRequest;

pub const RESTORING_PACKAGES: &str = "Restoring packages for solution...";
pub const RESTORING_PACKAGES_OPT_OUT: &str = "Restoring packages for solution. Automatic package \
     restore can be turned off in the package manager settings.";

pub struct RestoreOperationLogger {
    sink: Arc<dyn ProgressSink>,
    operation_id: OperationId,
    request: RestoreRequest,
    started: Instant,
    closed: AtomicBool,
}

impl RestoreOperationLogger {
    /// Open the run: writes the header and emits `restore_started`.
    pub fn start(
        sink: Arc<dyn ProgressSink>,
        request: &RestoreRequest,
        tracking: &RestoreTrackingData,
    ) -> Self {
        let logger = Self {
            sink,
            operation_id: tracking.operation_id,
            request: request.clone(),
            started: Instant::now(),
            closed: AtomicBool::new(false),
        };

        let header = if request.show_opt_out_message {
            RESTORING_PACKAGES_OPT_OUT
        } else {
            RESTORING_PACKAGES
        };
        logger.guarded(|sink| sink.log(LogLevel::Information, header));
        logger.emit(
            "restore_started",
            json!(RestoreStartedData {
                operation_id: tracking.operation_id.as_u64(),
                request_count: tracking.request_count,
                trigger: tracking.trigger.as_str().to_string(),
                source: request.source,
                explicit_reason: request.explicit_reason,
                force_restore: request.force_restore,
                is_solution_load_restore: tracking.is_solution_load_restore,
            }),
        );
        logger
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Report an executor fault. Shown as an error only when the request asked for it.
    pub fn log_exception(&self, error: &RestoreError) {
        let message = error.to_string();
        self.guarded(|sink| sink.log(LogLevel::Error, &message));
        if self.request.log_error_on_failure {
            self.guarded(|sink| sink.show_error(&message));
        }
    }

    /// Close the run: writes the summary and emits `restore_finished`. Later calls are no-ops.
    pub fn finish(&self, outcome: &RestoreOutcome) -> Duration {
        let duration = self.elapsed();
        if self.closed.swap(true, Ordering::AcqRel) {
            return duration;
        }

        let seconds = duration.as_secs_f64();
        let (level, message) = match outcome {
            RestoreOutcome::Succeeded => (
                self.status_level(LogLevel::Information),
                format!("Restore finished in {:.2} sec", seconds),
            ),
            RestoreOutcome::Failed => (
                LogLevel::Error,
                format!("Restore failed in {:.2} sec", seconds),
            ),
            RestoreOutcome::Faulted(err) => (
                LogLevel::Error,
                format!("Restore failed in {:.2} sec: {}", seconds, err),
            ),
            RestoreOutcome::Cancelled => (
                self.status_level(LogLevel::Warning),
                "Restore canceled".to_string(),
            ),
        };
        self.write(level, &message);
        self.write_to_sink_event(
            "restore_finished",
            json!(RestoreFinishedData {
                operation_id: self.operation_id.as_u64(),
                outcome: outcome.as_str().to_string(),
                duration_ms: duration.as_millis(),
                error: outcome.error().map(|e| e.to_string()),
            }),
        );
        duration
    }

    /// `force_status_write` lifts the summary so it shows even at quiet verbosity.
    fn status_level(&self, level: LogLevel) -> LogLevel {
        if self.request.force_status_write {
            level.max(LogLevel::Minimal)
        } else {
            level
        }
    }

    fn write(&self, level: LogLevel, message: &str) {
        self.guarded(|sink| sink.log(level, message));
    }

    fn emit(&self, event_type: &str, data: Value) {
        if self.is_closed() {
            return;
        }
        self.write_to_sink_event(event_type, data);
    }

    fn write_to_sink_event(&self, event_type: &str, data: Value) {
        self.guarded(|sink| sink.emit_event(event_type, data));
    }

    fn guarded<F>(&self, f: F)
    where
        F: FnOnce(&dyn ProgressSink),
    {
        if !call_guarded(self.sink.as_ref(), f) {
            warn!(operation_id = %self.operation_id, "Progress sink panicked, ignoring");
        }
    }
}

impl ProgressSink for RestoreOperationLogger {
    fn report_progress(&self, message: &str, current_step: u32, total_steps: u32) {
        if self.is_closed() {
            debug!(operation_id = %self.operation_id, "Dropped progress report after run finished");
            return;
        }
        self.guarded(|sink| sink.report_progress(message, current_step, total_steps));
    }

    fn log(&self, level: LogLevel, message: &str) {
        if self.is_closed() {
            return;
        }
        self.write(level, message);
    }

    fn show_error(&self, message: &str) {
        if self.is_closed() {
            return;
        }
        self.guarded(|sink| sink.show_error(message));
    }

    fn emit_event(&self, event_type: &str, data: Value) {
        self.emit(event_type, data);
    }
}
