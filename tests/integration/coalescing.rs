//! Coalescing of scheduled requests into restore runs

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use restore_scheduler::{
    ExplicitRestoreReason, RestoreOutcome, RestoreRequest, RestoreTrigger, SchedulerConfig,
};

use crate::integration::test_utils::{
    fast_config, scheduler_with, scheduler_with_config, within, GatedExecutor, RecordingExecutor,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_requests_runs_once() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(10)));
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let futures: Vec<_> = (0..10)
        .map(|_| scheduler.schedule(RestoreRequest::implicit()))
        .collect();
    let first_id = futures[0].id();
    assert!(futures.iter().all(|future| future.id() == first_id));

    let outcomes = within(join_all(futures.into_iter().map(|f| f.wait()))).await;
    assert!(outcomes.iter().all(RestoreOutcome::is_success));

    let runs = executor.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].request_count, 10);
    assert_eq!(runs[0].trigger, RestoreTrigger::Idle);
    assert_eq!(runs[0].operation_id, first_id.as_u64());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_after_hand_off_gets_its_own_run() {
    let executor = Arc::new(GatedExecutor::new());
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let first = scheduler.schedule(RestoreRequest::implicit());
    executor.wait_started(1).await;

    let second = scheduler.schedule(RestoreRequest::implicit());
    assert_ne!(first.id(), second.id());
    assert!(!second.is_completed());

    executor.release(2);
    assert!(within(first.wait()).await.is_success());
    assert!(within(second.wait()).await.is_success());
    assert_eq!(executor.started(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn folded_request_keeps_strongest_flags() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(5)));
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let futures = vec![
        scheduler.schedule(RestoreRequest::implicit()),
        scheduler.schedule(RestoreRequest::implicit().with_force(true)),
        scheduler.schedule(RestoreRequest::implicit()),
    ];
    within(join_all(futures.into_iter().map(|f| f.wait()))).await;

    let runs = executor.runs();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].request.force_restore);
    assert!(!runs[0].request.is_explicit());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn explicit_request_closes_window_early() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(5)));
    let config = SchedulerConfig {
        idle_timeout_ms: 1_000,
        max_drain_window_ms: 5_000,
        ..fast_config()
    };
    let (scheduler, _sink) = scheduler_with_config(config, executor.clone());

    let implicit = scheduler.schedule(RestoreRequest::implicit());
    let explicit = scheduler.schedule(RestoreRequest::explicit(
        ExplicitRestoreReason::RestoreSolutionPackages,
    ));

    // Well under the idle timeout: the source change must not wait for the window
    let outcome = tokio::time::timeout(Duration::from_millis(800), explicit.wait())
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert!(within(implicit.wait()).await.is_success());

    let runs = executor.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].trigger, RestoreTrigger::ExplicitUpgrade);
    assert_eq!(
        runs[0].request.explicit_reason,
        ExplicitRestoreReason::RestoreSolutionPackages
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_request_is_lost_under_load() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(15)));
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                let mut futures = Vec::new();
                for _ in 0..12 {
                    futures.push(scheduler.schedule(RestoreRequest::implicit()));
                    tokio::time::sleep(Duration::from_millis(3 * (producer + 1))).await;
                }
                join_all(futures.into_iter().map(|f| f.wait())).await
            })
        })
        .collect();

    for joined in within(join_all(producers)).await {
        let outcomes = joined.unwrap();
        assert!(outcomes.iter().all(RestoreOutcome::is_success));
    }

    let stats = scheduler.stats();
    assert_eq!(stats.scheduled, 96);
    assert_eq!(stats.dropped, 0);
    let covered: usize = executor.runs().iter().map(|run| run.request_count).sum();
    assert_eq!(covered, 96);
    assert!(executor.run_count() < 96);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_queue_drops_request_but_caller_still_observes_next_run() {
    let executor = Arc::new(GatedExecutor::new());
    let config = SchedulerConfig {
        queue_capacity: 2,
        ..fast_config()
    };
    let (scheduler, sink) = scheduler_with_config(config, executor.clone());

    let running = scheduler.schedule(RestoreRequest::implicit());
    executor.wait_started(1).await;

    let queued_a = scheduler.schedule(RestoreRequest::implicit());
    let queued_b = scheduler.schedule(RestoreRequest::implicit());
    let dropped = scheduler.schedule(RestoreRequest::implicit());

    assert_eq!(scheduler.stats().dropped, 1);
    assert_eq!(sink.events_of_type("request_dropped").len(), 1);
    assert_eq!(dropped.id(), queued_a.id());
    assert_eq!(queued_a.id(), queued_b.id());

    executor.release(2);
    assert!(within(running.wait()).await.is_success());
    assert!(within(dropped.wait()).await.is_success());
    assert_eq!(executor.started(), 2);
}
