//! Direct restores: dedicated operation, waits for the active run, own outcome

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use restore_scheduler::{
    ExplicitRestoreReason, RestoreError, RestoreExecutor, RestoreInvocation, RestoreOutcome,
    RestoreRequest, RestoreTrigger,
};
use tokio_util::sync::CancellationToken;

use crate::integration::test_utils::{scheduler_with, within, GatedExecutor, RecordingExecutor};

/// Succeeds only for explicit requests.
struct ExplicitOnlyExecutor;

#[async_trait]
impl RestoreExecutor for ExplicitOnlyExecutor {
    async fn execute(
        &self,
        invocation: RestoreInvocation,
        _cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(invocation.request.is_explicit())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_restore_runs_alone_with_direct_trigger() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(5)));
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let request = RestoreRequest::explicit(ExplicitRestoreReason::MissingPackagesBanner);
    let outcome = within(scheduler.restore_now(request, &CancellationToken::new())).await;

    assert!(outcome.is_success());
    let runs = executor.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger, RestoreTrigger::Direct);
    assert_eq!(runs[0].request_count, 1);
    assert_eq!(scheduler.stats().executed, 1);
    assert_eq!(scheduler.stats().scheduled, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_restore_waits_for_active_run() {
    let executor = Arc::new(GatedExecutor::new());
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let scheduled = scheduler.schedule(RestoreRequest::implicit());
    executor.wait_started(1).await;

    let direct = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler
                .restore_now(RestoreRequest::implicit(), &CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(executor.started(), 1);
    assert!(!direct.is_finished());

    executor.release(1);
    assert!(within(scheduled.wait()).await.is_success());
    executor.wait_started(2).await;
    executor.release(1);
    assert!(within(direct).await.unwrap().is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_outcome_is_independent_of_coalesced_outcome() {
    let (scheduler, _sink) = scheduler_with(Arc::new(ExplicitOnlyExecutor));

    let scheduled = scheduler.schedule(RestoreRequest::implicit());
    let token = CancellationToken::new();
    let direct = scheduler.restore_now(
        RestoreRequest::explicit(ExplicitRestoreReason::RestoreSolutionPackages),
        &token,
    );

    assert_eq!(within(direct).await, RestoreOutcome::Succeeded);
    assert_eq!(within(scheduled.wait()).await, RestoreOutcome::Failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_direct_restore_leaves_scheduler_usable() {
    let executor = Arc::new(GatedExecutor::new());
    let (scheduler, _sink) = scheduler_with(executor.clone());
    let cancel = CancellationToken::new();

    let direct = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            scheduler
                .restore_now(RestoreRequest::implicit(), &cancel)
                .await
        })
    };
    executor.wait_started(1).await;
    cancel.cancel();

    assert!(within(direct).await.unwrap().is_cancelled());
    assert_eq!(scheduler.stats().cancelled, 1);

    executor.release(1);
    let outcome = within(scheduler.schedule(RestoreRequest::implicit()).wait()).await;
    assert!(outcome.is_success());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn direct_restore_cancelled_while_waiting_never_executes() {
    let executor = Arc::new(GatedExecutor::new());
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let scheduled = scheduler.schedule(RestoreRequest::implicit());
    executor.wait_started(1).await;

    let cancel = CancellationToken::new();
    let direct = {
        let scheduler = Arc::clone(&scheduler);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            scheduler
                .restore_now(RestoreRequest::implicit(), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    cancel.cancel();
    assert!(within(direct).await.unwrap().is_cancelled());

    executor.release(1);
    assert!(within(scheduled.wait()).await.is_success());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(executor.started(), 1);
}
