//! Restore request queue
//!
//! Bounded multi-producer queue with a single consumer (the background runner). Producers
//! never block: a full queue drops the request, which is acceptable because a full queue
//! means a restore is already on its way.

use crate::error::SchedulerError;
use crate::request::RestoreRequest;
use flume::TrySendError;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub const DEFAULT_QUEUE_CAPACITY: usize = 150;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(400);
pub const DEFAULT_MAX_DRAIN_WINDOW: Duration = Duration::from_secs(30);

/// Bounds of a coalescing window.
#[derive(Debug, Clone, Copy)]
pub struct DrainWindow {
    /// The window closes once the queue stays empty this long
    pub idle_timeout: Duration,
    /// The window never stays open longer than this
    pub max_window: Duration,
}

impl Default for DrainWindow {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_window: DEFAULT_MAX_DRAIN_WINDOW,
        }
    }
}

/// Why a drain window closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStop {
    /// No request arrived for a full idle interval
    Idle,
    /// The maximum window elapsed
    MaxWindow,
    /// The item callback asked to stop
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSummary {
    pub absorbed: usize,
    pub stop: DrainStop,
}

pub struct RequestQueue {
    tx: flume::Sender<RestoreRequest>,
    rx: flume::Receiver<RestoreRequest>,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Enqueue without blocking. Returns false when the queue is full.
    pub fn try_enqueue(&self, request: RestoreRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(capacity = self.capacity, "Restore request queue is full, dropping request");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait for the next request or for cancellation.
    pub async fn take(&self, cancel: &CancellationToken) -> Result<RestoreRequest, SchedulerError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SchedulerError::Cancelled),
            received = self.rx.recv_async() => received.map_err(|_| SchedulerError::QueueClosed),
        }
    }

    /// Absorb requests until the queue stays empty for `window.idle_timeout`, the maximum
    /// window elapses, or `on_item` breaks. Every absorbed request is handed to `on_item`.
    pub async fn drain_for<F>(
        &self,
        window: DrainWindow,
        cancel: &CancellationToken,
        mut on_item: F,
    ) -> Result<DrainSummary, SchedulerError>
    where
        F: FnMut(RestoreRequest) -> ControlFlow<()>,
    {
        let deadline = Instant::now() + window.max_window;
        let mut absorbed = 0usize;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(DrainSummary {
                    absorbed,
                    stop: DrainStop::MaxWindow,
                });
            }
            let wait = window.idle_timeout.min(deadline - now);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                received = tokio::time::timeout(wait, self.rx.recv_async()) => match received {
                    Ok(Ok(request)) => {
                        absorbed += 1;
                        trace!(absorbed, "Absorbed restore request into coalescing window");
                        if on_item(request).is_break() {
                            return Ok(DrainSummary {
                                absorbed,
                                stop: DrainStop::Interrupted,
                            });
                        }
                    }
                    Ok(Err(_)) => return Err(SchedulerError::QueueClosed),
                    Err(_) => {
                        let stop = if wait < window.idle_timeout {
                            DrainStop::MaxWindow
                        } else {
                            DrainStop::Idle
                        };
                        return Ok(DrainSummary { absorbed, stop });
                    }
                },
            }
        }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
