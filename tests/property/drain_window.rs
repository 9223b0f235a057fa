//! Queue capacity and drain window accounting

use std::ops::ControlFlow;
use std::time::Duration;

use proptest::prelude::*;
use restore_scheduler::queue::{DrainStop, DrainWindow, RequestQueue};
use restore_scheduler::RestoreRequest;
use tokio_util::sync::CancellationToken;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

fn window() -> DrainWindow {
    DrainWindow {
        idle_timeout: Duration::from_millis(50),
        max_window: Duration::from_secs(5),
    }
}

proptest! {
    #[test]
    fn queue_accepts_up_to_capacity(capacity in 1usize..64, offered in 0usize..128) {
        let queue = RequestQueue::new(capacity);
        let accepted = (0..offered)
            .filter(|_| queue.try_enqueue(RestoreRequest::implicit()))
            .count();

        prop_assert_eq!(accepted, offered.min(capacity));
        prop_assert_eq!(queue.len(), accepted);
    }

    #[test]
    fn drain_absorbs_every_queued_request(queued in 0usize..40) {
        let runtime = paused_runtime();
        let queue = RequestQueue::new(64);
        for _ in 0..queued {
            prop_assert!(queue.try_enqueue(RestoreRequest::implicit()));
        }

        let mut seen = 0usize;
        let summary = runtime
            .block_on(queue.drain_for(window(), &CancellationToken::new(), |_| {
                seen += 1;
                ControlFlow::Continue(())
            }))
            .unwrap();

        prop_assert_eq!(summary.absorbed, queued);
        prop_assert_eq!(seen, queued);
        prop_assert_eq!(summary.stop, DrainStop::Idle);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn interrupted_drain_leaves_the_rest_queued(queued in 1usize..40, stop_at in 1usize..40) {
        prop_assume!(stop_at <= queued);
        let runtime = paused_runtime();
        let queue = RequestQueue::new(64);
        for _ in 0..queued {
            queue.try_enqueue(RestoreRequest::implicit());
        }

        let mut seen = 0usize;
        let summary = runtime
            .block_on(queue.drain_for(window(), &CancellationToken::new(), |_| {
                seen += 1;
                if seen == stop_at {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }))
            .unwrap();

        prop_assert_eq!(summary.absorbed, stop_at);
        prop_assert_eq!(summary.stop, DrainStop::Interrupted);
        prop_assert_eq!(queue.len(), queued - stop_at);
    }
}
