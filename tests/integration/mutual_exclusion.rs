//! At most one restore runs at a time, whichever path started it

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use restore_scheduler::slot::{promote, ActiveSlot};
use restore_scheduler::{
    ExplicitRestoreReason, OperationFuture, PendingOperation, RestoreOutcome, RestoreRequest,
    SchedulerError,
};
use tokio_util::sync::CancellationToken;

use crate::integration::test_utils::{scheduler_with, within, RecordingExecutor};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduled_and_direct_restores_never_overlap() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(10)));
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let mut tasks = Vec::new();
    for producer in 0..4u64 {
        let scheduler = Arc::clone(&scheduler);
        tasks.push(tokio::spawn(async move {
            let mut outcomes = Vec::new();
            for _ in 0..6 {
                outcomes.push(scheduler.schedule(RestoreRequest::implicit()).wait().await);
                tokio::time::sleep(Duration::from_millis(5 + producer)).await;
            }
            outcomes
        }));
    }
    for call in 0..4u64 {
        let scheduler = Arc::clone(&scheduler);
        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20 * call)).await;
            let request = RestoreRequest::explicit(ExplicitRestoreReason::RebuildSolution);
            vec![scheduler.restore_now(request, &CancellationToken::new()).await]
        }));
    }

    for joined in within(join_all(tasks)).await {
        assert!(joined.unwrap().iter().all(RestoreOutcome::is_success));
    }
    assert_eq!(executor.max_concurrent(), 1);
    assert!(executor.run_count() >= 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_direct_restores_run_one_after_another() {
    let executor = Arc::new(RecordingExecutor::new(Duration::from_millis(20)));
    let (scheduler, _sink) = scheduler_with(executor.clone());

    let calls: Vec<_> = (0..5)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler
                    .restore_now(RestoreRequest::implicit(), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    for joined in within(join_all(calls)).await {
        assert!(joined.unwrap().is_success());
    }
    assert_eq!(executor.run_count(), 5);
    assert_eq!(executor.max_concurrent(), 1);
    assert!(!scheduler.is_busy());
}

/// Every swap loses against a competitor that keeps replacing the occupant.
struct AlwaysContended {
    occupant: OperationFuture,
    swaps: AtomicUsize,
}

impl ActiveSlot for AlwaysContended {
    fn read(&self) -> OperationFuture {
        self.occupant.clone()
    }

    fn compare_and_swap(&self, _expected: &OperationFuture, _new: OperationFuture) -> bool {
        self.swaps.fetch_add(1, Ordering::SeqCst);
        false
    }
}

#[tokio::test]
async fn promotion_gives_up_after_attempt_limit() {
    let slot = AlwaysContended {
        occupant: OperationFuture::resolved(RestoreOutcome::Succeeded),
        swaps: AtomicUsize::new(0),
    };
    let pending = PendingOperation::new();

    let result = promote(&slot, &pending.future(), &CancellationToken::new(), 150).await;

    assert!(matches!(
        result,
        Err(SchedulerError::PromotionExhausted { attempts: 150 })
    ));
    assert_eq!(slot.swaps.load(Ordering::SeqCst), 150);
}
