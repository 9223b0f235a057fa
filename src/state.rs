//! Shared scheduler state
//!
//! One [`SchedulerState`] is a complete scheduler generation: queue, active slot, advertised
//! pending operation, job context, history and counters. A solution-closed reset replaces
//! the whole generation, so nothing in here is ever torn down piecemeal.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::context::RestoreJobContext;
use crate::executor::{RestoreExecutor, RestoreTrackingData, RestoreTrigger};
use crate::operation::{OperationId, PendingOperation, RestoreOutcome};
use crate::progress::sink::ProgressSink;
use crate::queue::RequestQueue;
use crate::request::{RestoreRequest, RestoreSource};
use crate::slot::ActiveOperationSlot;

/// Where the background runner currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    /// Not started, or between runs
    Idle,
    WaitingForRequest,
    Promoting,
    Draining,
    Executing,
    /// Terminal for this runner task
    Stopped,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunnerState::Idle => "idle",
            RunnerState::WaitingForRequest => "waiting_for_request",
            RunnerState::Promoting => "promoting",
            RunnerState::Draining => "draining",
            RunnerState::Executing => "executing",
            RunnerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Requests accepted by the queue
    pub scheduled: u64,
    /// Requests dropped because the queue was full
    pub dropped: u64,
    /// Executions started, queue driven and direct
    pub executed: u64,
    pub succeeded: u64,
    /// Failed or faulted executions
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug)]
struct RestoreHistory {
    awaiting_solution_load_restore: bool,
    last_completed: Option<Instant>,
    last_source: Option<RestoreSource>,
}

impl Default for RestoreHistory {
    fn default() -> Self {
        Self {
            awaiting_solution_load_restore: true,
            last_completed: None,
            last_source: None,
        }
    }
}

pub(crate) struct SchedulerState {
    pub(crate) config: SchedulerConfig,
    pub(crate) queue: RequestQueue,
    pub(crate) slot: ActiveOperationSlot,
    /// Fires on solution close or shutdown; tears down the runner and direct runs
    pub(crate) shutdown: CancellationToken,
    pub(crate) executor: Arc<dyn RestoreExecutor>,
    pub(crate) sink: Arc<dyn ProgressSink>,
    next_pending: Mutex<PendingOperation>,
    job_context: RwLock<Arc<RestoreJobContext>>,
    history: Mutex<RestoreHistory>,
    stats: RwLock<SchedulerStats>,
    runner_state: Mutex<RunnerState>,
    active_calls: AtomicUsize,
    /// Enqueued requests whose covering run has not resolved yet
    outstanding_requests: AtomicUsize,
}

impl SchedulerState {
    pub(crate) fn new(
        config: SchedulerConfig,
        executor: Arc<dyn RestoreExecutor>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            queue: RequestQueue::new(config.queue_capacity),
            slot: ActiveOperationSlot::new(),
            shutdown: CancellationToken::new(),
            executor,
            sink,
            next_pending: Mutex::new(PendingOperation::new()),
            job_context: RwLock::new(Arc::new(RestoreJobContext::new())),
            history: Mutex::new(RestoreHistory::default()),
            stats: RwLock::new(SchedulerStats::default()),
            runner_state: Mutex::new(RunnerState::Idle),
            active_calls: AtomicUsize::new(0),
            outstanding_requests: AtomicUsize::new(0),
            config,
        }
    }

    /// The operation new `schedule` callers attach to.
    pub(crate) fn next_pending(&self) -> PendingOperation {
        self.next_pending.lock().clone()
    }

    /// Hand-off point: replace `current` with a fresh advertised operation. Requests that
    /// read the advertised operation after this belong to the next run.
    pub(crate) fn advance_pending(&self, current: &PendingOperation) -> PendingOperation {
        let mut next = self.next_pending.lock();
        if *next == *current {
            *next = PendingOperation::new();
            debug!(
                operation_id = %current.id(),
                next_operation_id = %next.id(),
                "Advertised next pending operation"
            );
        }
        next.clone()
    }

    /// Replace the advertised operation if it is already resolved. Used before restarting a
    /// runner that died while owning it.
    pub(crate) fn refresh_next_pending(&self) {
        let mut next = self.next_pending.lock();
        if next.is_resolved() {
            *next = PendingOperation::new();
        }
    }

    pub(crate) fn job_context(&self) -> Arc<RestoreJobContext> {
        Arc::clone(&self.job_context.read())
    }

    /// Swap in an empty job context. A run already in progress keeps the one it was given.
    pub(crate) fn replace_job_context(&self) -> Arc<RestoreJobContext> {
        let fresh = Arc::new(RestoreJobContext::new());
        let previous = std::mem::replace(&mut *self.job_context.write(), Arc::clone(&fresh));
        debug!(
            previous_context = previous.id().as_u64(),
            context = fresh.id().as_u64(),
            "Replaced restore job context"
        );
        fresh
    }

    pub(crate) fn runner_state(&self) -> RunnerState {
        *self.runner_state.lock()
    }

    pub(crate) fn set_runner_state(&self, state: RunnerState) {
        let mut current = self.runner_state.lock();
        if *current != state {
            debug!(from = %*current, to = %state, "Runner state changed");
            *current = state;
        }
    }

    pub(crate) fn stats(&self) -> SchedulerStats {
        self.stats.read().clone()
    }

    pub(crate) fn record_scheduled(&self) {
        self.stats.write().scheduled += 1;
    }

    /// Mark a request outstanding before it is enqueued, so the runner can never release it
    /// first. It stays outstanding until [`Self::release_requests`].
    pub(crate) fn hold_request(&self) {
        self.outstanding_requests.fetch_add(1, Ordering::AcqRel);
    }

    /// `count` requests were resolved or abandoned by the runner.
    pub(crate) fn release_requests(&self, count: usize) {
        let _ = self
            .outstanding_requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
    }

    /// Nothing still queued will run; used once the runner stops for good.
    pub(crate) fn clear_outstanding_requests(&self) {
        self.outstanding_requests.store(0, Ordering::Release);
    }

    pub(crate) fn outstanding_requests(&self) -> usize {
        self.outstanding_requests.load(Ordering::Acquire)
    }

    pub(crate) fn record_dropped(&self) {
        self.stats.write().dropped += 1;
    }

    /// Tracking data for a run about to execute. Consumes the solution-load flag when the
    /// run is implicit.
    pub(crate) fn begin_run(
        &self,
        operation_id: OperationId,
        request: &RestoreRequest,
        request_count: usize,
        trigger: RestoreTrigger,
    ) -> RestoreTrackingData {
        self.stats.write().executed += 1;

        let mut history = self.history.lock();
        let is_solution_load_restore =
            !request.is_explicit() && history.awaiting_solution_load_restore;
        if is_solution_load_restore {
            history.awaiting_solution_load_restore = false;
        }

        let mut tracking = RestoreTrackingData::new(operation_id, request_count, trigger);
        tracking.explicit_reason = request.explicit_reason;
        tracking.is_solution_load_restore = is_solution_load_restore;
        tracking.seconds_since_last_restore =
            history.last_completed.map(|at| at.elapsed().as_secs_f64());
        tracking.last_restore_source = history.last_source;
        tracking
    }

    pub(crate) fn complete_run(&self, source: RestoreSource, outcome: &RestoreOutcome) {
        {
            let mut history = self.history.lock();
            history.last_completed = Some(Instant::now());
            history.last_source = Some(source);
        }

        let mut stats = self.stats.write();
        match outcome {
            RestoreOutcome::Succeeded => stats.succeeded += 1,
            RestoreOutcome::Failed | RestoreOutcome::Faulted(_) => stats.failed += 1,
            RestoreOutcome::Cancelled => stats.cancelled += 1,
        }
    }

    /// Count a facade call for `is_running`; the count drops with the guard.
    pub(crate) fn enter_call(self: &Arc<Self>) -> CallGuard {
        self.active_calls.fetch_add(1, Ordering::AcqRel);
        CallGuard {
            state: Arc::clone(self),
        }
    }

    pub(crate) fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::Acquire)
    }
}

pub(crate) struct CallGuard {
    state: Arc<SchedulerState>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::AcqRel);
    }
}
