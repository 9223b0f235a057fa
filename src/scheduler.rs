//! Restore scheduler facade
//!
//! Entry point for hosts. `schedule` is the coalesced path: non-blocking, returns the future
//! of whichever run will cover the request. `restore_now` is the dedicated path: its own
//! operation, promoted straight into the active slot, so it still never overlaps another
//! restore.

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::context::RestoreJobContext;
use crate::error::{RestoreError, SchedulerError};
use crate::executor::{execute_guarded, RestoreExecutor, RestoreTrigger};
use crate::operation::{OperationFuture, PendingOperation, RestoreOutcome};
use crate::progress::event::{RequestDroppedData, SchedulerResetData};
use crate::progress::sink::{call_guarded, ProgressSink, TracingProgressSink};
use crate::request::RestoreRequest;
use crate::runner::run_loop;
use crate::slot::{promote, ActiveSlot};
use crate::state::{RunnerState, SchedulerState, SchedulerStats};

type RunnerHandle = JoinHandle<Result<(), SchedulerError>>;

/// One scheduler generation and its runner task.
struct Generation {
    state: Arc<SchedulerState>,
    runner: Option<RunnerHandle>,
}

pub struct RestoreScheduler {
    config: SchedulerConfig,
    executor: Arc<dyn RestoreExecutor>,
    sink: Arc<dyn ProgressSink>,
    runtime: Handle,
    generation: Mutex<Generation>,
}

impl RestoreScheduler {
    /// Create a scheduler bound to the current tokio runtime.
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<dyn RestoreExecutor>,
        sink: Arc<dyn ProgressSink>,
    ) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|e| {
            SchedulerError::RunnerFailed(format!("No tokio runtime available: {}", e))
        })?;
        Self::with_runtime(config, executor, sink, runtime)
    }

    /// Create a scheduler that spawns its tasks on `runtime`.
    pub fn with_runtime(
        config: SchedulerConfig,
        executor: Arc<dyn RestoreExecutor>,
        sink: Arc<dyn ProgressSink>,
        runtime: Handle,
    ) -> Result<Self, SchedulerError> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(SchedulerError::ConfigError(problems.join("; ")));
        }

        let state = Arc::new(SchedulerState::new(
            config.clone(),
            Arc::clone(&executor),
            Arc::clone(&sink),
        ));
        Ok(Self {
            config,
            executor,
            sink,
            runtime,
            generation: Mutex::new(Generation {
                state,
                runner: None,
            }),
        })
    }

    /// Default settings, progress logged through `tracing`.
    pub fn with_defaults(executor: Arc<dyn RestoreExecutor>) -> Result<Self, SchedulerError> {
        Self::new(
            SchedulerConfig::default(),
            executor,
            Arc::new(TracingProgressSink),
        )
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue `request` for the next coalesced restore.
    ///
    /// Never blocks. The returned future completes with the outcome of the run the request
    /// was folded into. A request that does not fit the queue is dropped, but the caller
    /// still gets the future of the upcoming run.
    pub fn schedule(&self, request: RestoreRequest) -> OperationFuture {
        let state = self.current_state();
        if state.shutdown.is_cancelled() {
            debug!("Scheduler is shutting down, request not scheduled");
            return OperationFuture::resolved(RestoreOutcome::Cancelled);
        }
        self.ensure_runner();

        // Read before enqueueing so the returned future always gets resolved: the runner
        // cannot hand off an operation before it has taken a request. A request enqueued
        // just after a hand-off still executes in the next run while this caller observes
        // the run that just left.
        let future = state.next_pending().future();
        let source = request.source;
        state.hold_request();
        if state.queue.try_enqueue(request) {
            state.record_scheduled();
            debug!(
                operation_id = %future.id(),
                queued = state.queue.len(),
                "Restore request scheduled"
            );
        } else {
            state.release_requests(1);
            state.record_dropped();
            self.emit(
                "request_dropped",
                json!(RequestDroppedData {
                    queue_capacity: state.queue.capacity(),
                    source,
                }),
            );
        }
        future
    }

    /// `schedule` for a caller with its own cancellation token.
    ///
    /// An already-cancelled token enqueues nothing. Otherwise the returned future gives up
    /// with `Cancelled` when `cancel` fires; the coalesced run itself is unaffected.
    pub async fn schedule_with_cancel(
        &self,
        request: RestoreRequest,
        cancel: &CancellationToken,
    ) -> RestoreOutcome {
        if cancel.is_cancelled() {
            return RestoreOutcome::Cancelled;
        }
        let state = self.current_state();
        let _call = state.enter_call();
        self.schedule(request).wait_or_cancel(cancel).await
    }

    /// Restore right away on a dedicated operation.
    ///
    /// Waits for whatever restore is active, then runs `request` alone. `cancel` abandons
    /// only this dedicated run. The run itself happens on a separate task, so dropping this
    /// future does not release the active slot early.
    pub async fn restore_now(
        &self,
        request: RestoreRequest,
        cancel: &CancellationToken,
    ) -> RestoreOutcome {
        let state = self.current_state();
        if state.shutdown.is_cancelled() || cancel.is_cancelled() {
            return RestoreOutcome::Cancelled;
        }
        let _call = state.enter_call();

        let pending = PendingOperation::new();
        let resolver = pending.resolver();
        let future = pending.future();
        let run_cancel = state.shutdown.child_token();

        let limit = state.config.promote_attempts_limit;
        let promoted = tokio::select! {
            result = promote(&state.slot, &future, &run_cancel, limit) => result,
            _ = cancel.cancelled() => Err(SchedulerError::Cancelled),
        };
        match promoted {
            Ok(_) => {}
            Err(SchedulerError::Cancelled) => {
                resolver.resolve_cancelled();
                return RestoreOutcome::Cancelled;
            }
            Err(err) => {
                error!(
                    operation_id = %pending.id(),
                    error = %err,
                    "Direct restore could not start"
                );
                resolver.resolve_error(RestoreError::Internal(err.to_string()));
                return future.wait().await;
            }
        }

        let task_state = Arc::clone(&state);
        let caller = cancel.clone();
        self.runtime.spawn(async move {
            let source = request.source;
            let tracking =
                task_state.begin_run(resolver.id(), &request, 1, RestoreTrigger::Direct);
            let run = execute_guarded(
                task_state.executor.as_ref(),
                request,
                task_state.job_context(),
                tracking,
                Arc::clone(&task_state.sink),
                &run_cancel,
            );
            tokio::pin!(run);

            let outcome = tokio::select! {
                outcome = &mut run => outcome,
                _ = caller.cancelled() => {
                    run_cancel.cancel();
                    run.await
                }
            };
            task_state.complete_run(source, &outcome);
            resolver.resolve_with(outcome);
        });

        future.wait().await
    }

    /// Drop cached restore state. The next run starts from an empty job context.
    pub fn clear_cache(&self) {
        let state = self.current_state();
        let context = state.replace_job_context();
        info!(context = context.id().as_u64(), "Restore cache cleared");
    }

    /// Early signal that the solution is going away: cancels the in-flight restore.
    pub fn on_solution_closing(&self) {
        let state = self.current_state();
        info!("Solution closing, cancelling restores");
        state.shutdown.cancel();
    }

    /// Tear down the current generation and start a fresh one.
    ///
    /// Everything still pending in the old generation resolves `Cancelled`. The old runner
    /// gets `shutdown_timeout_ms` to stop before it is aborted.
    pub async fn on_solution_closed(&self) {
        let fresh = Arc::new(SchedulerState::new(
            self.config.clone(),
            Arc::clone(&self.executor),
            Arc::clone(&self.sink),
        ));
        let previous = {
            let mut generation = self.generation.lock();
            std::mem::replace(
                &mut *generation,
                Generation {
                    state: fresh,
                    runner: None,
                },
            )
        };
        self.stop_generation(previous, "solution_closed").await;
    }

    /// Stop the runner without starting a new generation. Later calls see `Cancelled`.
    pub async fn shutdown(&self) {
        let (state, runner) = {
            let mut generation = self.generation.lock();
            (Arc::clone(&generation.state), generation.runner.take())
        };
        self.stop_generation(Generation { state, runner }, "shutdown")
            .await;
    }

    /// True while a restore holds the active slot.
    pub fn is_busy(&self) -> bool {
        self.current_state().slot.is_busy()
    }

    /// True while a scheduled request has not been resolved, a caller is inside the
    /// scheduler, or a restore is active.
    pub fn is_running(&self) -> bool {
        let state = self.current_state();
        state.active_calls() > 0
            || state.outstanding_requests() > 0
            || !state.queue.is_empty()
            || state.slot.is_busy()
    }

    /// Future of the operation currently holding the active slot.
    pub fn current_operation(&self) -> OperationFuture {
        self.current_state().slot.read()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.current_state().stats()
    }

    pub fn runner_state(&self) -> RunnerState {
        self.current_state().runner_state()
    }

    pub fn job_context(&self) -> Arc<RestoreJobContext> {
        self.current_state().job_context()
    }

    fn current_state(&self) -> Arc<SchedulerState> {
        Arc::clone(&self.generation.lock().state)
    }

    /// Start the runner if it is not running. A runner that terminated (fatal error or
    /// panic) is replaced, unless the generation is shutting down.
    fn ensure_runner(&self) {
        let mut generation = self.generation.lock();
        let alive = generation
            .runner
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false);
        if alive || generation.state.shutdown.is_cancelled() {
            return;
        }

        if generation.runner.is_some() {
            warn!("Restore runner terminated, restarting");
        }
        generation.state.refresh_next_pending();
        let state = Arc::clone(&generation.state);
        generation.runner = Some(self.runtime.spawn(run_loop(state)));
    }

    async fn stop_generation(&self, generation: Generation, reason: &str) {
        let Generation { state, runner } = generation;
        state.shutdown.cancel();

        let mut runner_abandoned = None;
        if let Some(mut handle) = runner {
            let abandoned =
                match tokio::time::timeout(self.config.shutdown_timeout(), &mut handle).await {
                    Ok(Ok(Ok(()))) => false,
                    Ok(Ok(Err(err))) => {
                        debug!(error = %err, "Stopped runner had already failed");
                        false
                    }
                    Ok(Err(join_err)) => {
                        warn!(error = %join_err, "Restore runner task ended abnormally");
                        false
                    }
                    Err(_) => {
                        warn!(
                            timeout_ms = self.config.shutdown_timeout_ms,
                            "Restore runner did not stop in time, abandoning it"
                        );
                        handle.abort();
                        true
                    }
                };
            runner_abandoned = Some(abandoned);
        }

        state.next_pending().resolve_cancelled();
        state.set_runner_state(RunnerState::Stopped);
        self.emit(
            "scheduler_reset",
            json!(SchedulerResetData {
                reason: reason.to_string(),
                runner_abandoned,
            }),
        );
        info!(reason, "Restore scheduler generation stopped");
    }

    /// Facade-level event. A panicking sink is logged and ignored.
    fn emit(&self, event_type: &str, data: Value) {
        if !call_guarded(self.sink.as_ref(), |sink| sink.emit_event(event_type, data)) {
            warn!(event_type, "Progress sink panicked, ignoring");
        }
    }
}

impl Drop for RestoreScheduler {
    fn drop(&mut self) {
        let generation = self.generation.lock();
        generation.state.shutdown.cancel();
    }
}
