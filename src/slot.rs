//! Active operation slot and promotion
//!
//! The slot holds the future of the operation currently treated as in-flight. Whoever wants
//! to run a restore must first promote its own operation into the slot, which means waiting
//! for the current occupant to finish and then swapping itself in. Contention between the
//! background runner and direct restores is resolved with an optimistic compare-and-swap
//! retry loop capped at a fixed number of attempts.

use crate::error::SchedulerError;
use crate::operation::{OperationFuture, RestoreOutcome};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Default cap on compare-and-swap attempts during promotion.
pub const PROMOTE_ATTEMPTS_LIMIT: usize = 150;

/// A single cell holding the in-flight operation's future.
pub trait ActiveSlot: Send + Sync {
    /// Snapshot of the current occupant.
    fn read(&self) -> OperationFuture;

    /// Replace the occupant with `new` only if it is still `expected`.
    fn compare_and_swap(&self, expected: &OperationFuture, new: OperationFuture) -> bool;
}

pub struct ActiveOperationSlot {
    current: Mutex<OperationFuture>,
}

impl ActiveOperationSlot {
    /// Empty slot: the occupant is an already-completed operation.
    pub fn new() -> Self {
        Self {
            current: Mutex::new(OperationFuture::resolved(RestoreOutcome::Succeeded)),
        }
    }

    /// True while the occupant has not been resolved.
    pub fn is_busy(&self) -> bool {
        !self.current.lock().is_completed()
    }
}

impl Default for ActiveOperationSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveSlot for ActiveOperationSlot {
    fn read(&self) -> OperationFuture {
        self.current.lock().clone()
    }

    fn compare_and_swap(&self, expected: &OperationFuture, new: OperationFuture) -> bool {
        let mut current = self.current.lock();
        if current.id() != expected.id() {
            return false;
        }
        *current = new;
        true
    }
}

/// Promote `pending` into `slot`.
///
/// Waits for the current occupant to finish (its outcome is ignored) or for `cancel`, then
/// tries to swap `pending` in. Returns the number of attempts used. Fails with
/// [`SchedulerError::Cancelled`] when cancelled and with
/// [`SchedulerError::PromotionExhausted`] after `max_attempts` failed swaps.
pub async fn promote<S>(
    slot: &S,
    pending: &OperationFuture,
    cancel: &CancellationToken,
    max_attempts: usize,
) -> Result<usize, SchedulerError>
where
    S: ActiveSlot + ?Sized,
{
    let mut attempt = 0usize;
    loop {
        let active = slot.read();

        tokio::select! {
            _ = active.clone().wait() => {}
            _ = cancel.cancelled() => {}
        }
        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }

        if slot.compare_and_swap(&active, pending.clone()) {
            debug!(
                operation_id = %pending.id(),
                previous_operation_id = %active.id(),
                attempts = attempt + 1,
                "Promoted operation to active"
            );
            return Ok(attempt + 1);
        }

        attempt += 1;
        debug!(
            operation_id = %pending.id(),
            attempt,
            "Active operation changed during promotion, retrying"
        );
        if attempt >= max_attempts {
            error!(
                operation_id = %pending.id(),
                attempts = attempt,
                "Failed promoting pending task"
            );
            return Err(SchedulerError::PromotionExhausted { attempts: attempt });
        }
    }
}
