//! Background runner
//!
//! The single consumer of the request queue. Each iteration takes one request, promotes the
//! advertised pending operation into the active slot, coalesces whatever else arrives during
//! the drain window, hands off a fresh advertised operation and executes the accumulated
//! request. The loop only ends on shutdown or on promotion exhaustion.

use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{RestoreError, SchedulerError};
use crate::executor::{execute_guarded, RestoreTrigger};
use crate::operation::OperationResolver;
use crate::queue::DrainStop;
use crate::request::RestoreRequest;
use crate::slot::promote;
use crate::state::{RunnerState, SchedulerState};

/// Runner entry point. Returns `Ok` on shutdown and the fatal error otherwise.
pub(crate) async fn run_loop(state: Arc<SchedulerState>) -> Result<(), SchedulerError> {
    info!("Restore runner started");

    let result = loop {
        match run_once(&state).await {
            Ok(()) => {}
            Err(SchedulerError::Cancelled) => break Ok(()),
            Err(err) => {
                error!(error = %err, "Restore runner stopped on an internal error");
                break Err(err);
            }
        }
    };

    if state.shutdown.is_cancelled() {
        // Nobody will pick up what is still advertised or queued
        state.next_pending().resolve_cancelled();
        state.clear_outstanding_requests();
    }
    state.set_runner_state(RunnerState::Stopped);
    info!(failed = result.is_err(), "Restore runner stopped");
    result
}

/// Outcome of the coalescing window.
struct Coalesced {
    request: RestoreRequest,
    request_count: usize,
    trigger: RestoreTrigger,
}

async fn run_once(state: &SchedulerState) -> Result<(), SchedulerError> {
    let pending = state.next_pending();
    let resolver = pending.resolver();

    state.set_runner_state(RunnerState::WaitingForRequest);
    let first = state
        .queue
        .take(&state.shutdown)
        .await
        .map_err(|err| abandon(state, &resolver, 0, err))?;

    state.set_runner_state(RunnerState::Promoting);
    promote(
        &state.slot,
        &pending.future(),
        &state.shutdown,
        state.config.promote_attempts_limit,
    )
    .await
    .map_err(|err| abandon(state, &resolver, 1, err))?;

    let coalesced = coalesce(state, first)
        .await
        .map_err(|err| abandon(state, &resolver, 1, err))?;

    state.advance_pending(&pending);
    state.set_runner_state(RunnerState::Executing);

    let Coalesced {
        request,
        request_count,
        trigger,
    } = coalesced;
    let source = request.source;
    let tracking = state.begin_run(pending.id(), &request, request_count, trigger);
    let outcome = execute_guarded(
        state.executor.as_ref(),
        request,
        state.job_context(),
        tracking,
        Arc::clone(&state.sink),
        &state.shutdown,
    )
    .await;

    state.complete_run(source, &outcome);
    resolver.resolve_with(outcome);
    state.release_requests(request_count);
    state.set_runner_state(RunnerState::Idle);

    if state.shutdown.is_cancelled() {
        return Err(SchedulerError::Cancelled);
    }
    Ok(())
}

/// Fold requests arriving during the drain window into `first`.
async fn coalesce(
    state: &SchedulerState,
    first: RestoreRequest,
) -> Result<Coalesced, SchedulerError> {
    if !first.allow_delayed_start {
        return Ok(Coalesced {
            request: first,
            request_count: 1,
            trigger: RestoreTrigger::Immediate,
        });
    }

    state.set_runner_state(RunnerState::Draining);
    let mut request = first;
    let mut request_count = 1usize;
    let mut upgraded = false;

    let summary = state
        .queue
        .drain_for(state.config.drain_window(), &state.shutdown, |next| {
            request_count += 1;
            let upgrade = request.upgrades_source(&next);
            request = request.fold(&next);
            if upgrade {
                upgraded = true;
                ControlFlow::Break(())
            } else if !request.allow_delayed_start {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await?;

    let trigger = match summary.stop {
        DrainStop::Idle => RestoreTrigger::Idle,
        DrainStop::MaxWindow => RestoreTrigger::MaxWindow,
        DrainStop::Interrupted if upgraded => RestoreTrigger::ExplicitUpgrade,
        DrainStop::Interrupted => RestoreTrigger::Immediate,
    };
    debug!(
        request_count,
        trigger = trigger.as_str(),
        source = ?request.source,
        "Coalescing window closed"
    );

    Ok(Coalesced {
        request,
        request_count,
        trigger,
    })
}

/// Resolve the owned operation for an early exit, release the `taken` requests it carried
/// and pass the error through.
fn abandon(
    state: &SchedulerState,
    resolver: &OperationResolver,
    taken: usize,
    err: SchedulerError,
) -> SchedulerError {
    state.release_requests(taken);
    if err.is_cancellation() {
        resolver.resolve_cancelled();
    } else {
        resolver.resolve_error(RestoreError::Internal(err.to_string()));
    }
    err
}
