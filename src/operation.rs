//! Pending restore operations
//!
//! A [`PendingOperation`] is a single-assignment completion signal shared by every caller
//! whose request was folded into the same restore run. Callers observe it through
//! [`OperationFuture`]; the run that owns it resolves it through an [`OperationResolver`],
//! which resolves the operation as cancelled if it is dropped unresolved.

use crate::error::RestoreError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identity of a pending operation (diagnostics only, never used for ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(u64);

impl OperationId {
    pub fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OperationId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Final state of a restore operation.
#[derive(Debug, Clone)]
pub enum RestoreOutcome {
    /// The restore ran and succeeded (or had nothing to do)
    Succeeded,
    /// The restore ran and reported failure
    Failed,
    /// The executor returned an error or panicked
    Faulted(Arc<RestoreError>),
    /// The restore never ran to completion because it was cancelled
    Cancelled,
}

impl RestoreOutcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            RestoreOutcome::Succeeded
        } else {
            RestoreOutcome::Failed
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RestoreOutcome::Succeeded)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RestoreOutcome::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreOutcome::Succeeded => "succeeded",
            RestoreOutcome::Failed => "failed",
            RestoreOutcome::Faulted(_) => "faulted",
            RestoreOutcome::Cancelled => "cancelled",
        }
    }

    pub fn error(&self) -> Option<&RestoreError> {
        match self {
            RestoreOutcome::Faulted(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl PartialEq for RestoreOutcome {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RestoreOutcome::Faulted(a), RestoreOutcome::Faulted(b)) => {
                Arc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            _ => self.as_str() == other.as_str(),
        }
    }
}

impl Eq for RestoreOutcome {}

type OutcomeCell = Option<RestoreOutcome>;

struct OperationState {
    id: OperationId,
    outcome: watch::Sender<OutcomeCell>,
}

/// Handle to a not-yet-resolved restore operation.
#[derive(Clone)]
pub struct PendingOperation {
    state: Arc<OperationState>,
}

impl PendingOperation {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            state: Arc::new(OperationState {
                id: OperationId::next(),
                outcome,
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.state.id
    }

    /// Future completing when this operation is resolved.
    pub fn future(&self) -> OperationFuture {
        OperationFuture {
            id: self.state.id,
            outcome: self.state.outcome.subscribe(),
        }
    }

    /// Scoped resolver that resolves the operation as cancelled when dropped unresolved.
    pub fn resolver(&self) -> OperationResolver {
        OperationResolver {
            operation: self.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state.outcome.borrow().is_some()
    }

    pub fn outcome(&self) -> Option<RestoreOutcome> {
        self.state.outcome.borrow().clone()
    }

    pub fn resolve(&self, success: bool) -> bool {
        self.resolve_with(RestoreOutcome::from_success(success))
    }

    pub fn resolve_error(&self, error: RestoreError) -> bool {
        self.resolve_with(RestoreOutcome::Faulted(Arc::new(error)))
    }

    pub fn resolve_cancelled(&self) -> bool {
        self.resolve_with(RestoreOutcome::Cancelled)
    }

    /// Resolve the operation. Only the first call has an effect; returns whether it did.
    pub fn resolve_with(&self, outcome: RestoreOutcome) -> bool {
        let label = outcome.as_str();
        let applied = self.state.outcome.send_if_modified(|cell| {
            if cell.is_some() {
                return false;
            }
            *cell = Some(outcome);
            true
        });

        if applied {
            debug!(operation_id = %self.id(), outcome = label, "Resolved pending operation");
        } else {
            debug!(
                operation_id = %self.id(),
                outcome = label,
                "Ignored resolution of already resolved operation"
            );
        }
        applied
    }
}

impl Default for PendingOperation {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PendingOperation {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for PendingOperation {}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("id", &self.id())
            .field("outcome", &self.outcome())
            .finish()
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id(), f)
    }
}

/// Owner-side guard of a [`PendingOperation`].
///
/// Dropping the guard without resolving resolves the operation as cancelled, so an early
/// return or panic at the resolution site can never leave waiters hanging.
pub struct OperationResolver {
    operation: PendingOperation,
}

impl OperationResolver {
    pub fn operation(&self) -> &PendingOperation {
        &self.operation
    }

    pub fn id(&self) -> OperationId {
        self.operation.id()
    }

    pub fn resolve(&self, success: bool) -> bool {
        self.operation.resolve(success)
    }

    pub fn resolve_error(&self, error: RestoreError) -> bool {
        self.operation.resolve_error(error)
    }

    pub fn resolve_cancelled(&self) -> bool {
        self.operation.resolve_cancelled()
    }

    pub fn resolve_with(&self, outcome: RestoreOutcome) -> bool {
        self.operation.resolve_with(outcome)
    }
}

impl Drop for OperationResolver {
    fn drop(&mut self) {
        if !self.operation.is_resolved() && self.operation.resolve_cancelled() {
            warn!(
                operation_id = %self.operation.id(),
                "Pending operation abandoned before resolution, resolved as cancelled"
            );
        }
    }
}

/// Observer side of a pending operation. Cheap to clone; every clone sees the same outcome.
#[derive(Clone)]
pub struct OperationFuture {
    id: OperationId,
    outcome: watch::Receiver<OutcomeCell>,
}

impl OperationFuture {
    /// A future that is already resolved with `outcome`.
    pub fn resolved(outcome: RestoreOutcome) -> Self {
        let operation = PendingOperation::new();
        operation.resolve_with(outcome);
        operation.future()
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn is_completed(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    pub fn peek(&self) -> Option<RestoreOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for resolution. If every owner vanished without resolving, the outcome is
    /// `Cancelled`.
    pub async fn wait(mut self) -> RestoreOutcome {
        match self.outcome.wait_for(Option::is_some).await {
            Ok(cell) => (*cell).clone().unwrap_or(RestoreOutcome::Cancelled),
            Err(_) => RestoreOutcome::Cancelled,
        }
    }

    /// Wait for resolution, giving up with `Cancelled` when `token` fires.
    ///
    /// Giving up only abandons this caller's interest; the operation itself keeps running.
    pub async fn wait_or_cancel(self, token: &CancellationToken) -> RestoreOutcome {
        tokio::select! {
            outcome = self.wait() => outcome,
            _ = token.cancelled() => RestoreOutcome::Cancelled,
        }
    }
}

impl IntoFuture for OperationFuture {
    type Output = RestoreOutcome;
    type IntoFuture = BoxFuture<'static, RestoreOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

impl PartialEq for OperationFuture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OperationFuture {}

impl fmt::Debug for OperationFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFuture")
            .field("id", &self.id)
            .field("outcome", &self.peek())
            .finish()
    }
}
