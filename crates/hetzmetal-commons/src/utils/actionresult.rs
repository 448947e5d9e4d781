use std::time::Duration;

use crate::models::host::ErrorType;
use crate::utils::backoff::calculate_backoff;

/// Outcome of one reconcile step, shared by the bare-metal and cloud-VM
/// machines. Errors are values; the harness turns each variant into a requeue
/// directive.
#[derive(Debug)]
pub enum ActionResult<E> {
    /// Stay in the current phase and requeue after the given delay. A zero
    /// delay means "immediately, but yield".
    Continue { requeue_after: Duration },
    /// The phase succeeded; the machine moves on and requeues immediately.
    Complete,
    /// The object has been finalized; do not requeue.
    DeleteComplete,
    /// Permanent stop without a surfaced error.
    Stop,
    /// Transient failure; the harness retries with its own backoff.
    Error(E),
    /// A recorded, counted failure; requeued on the exponential backoff.
    Failed {
        error_type: ErrorType,
        error_count: u32,
    },
}

impl<E> ActionResult<E> {
    pub fn continue_after(requeue_after: Duration) -> Self {
        ActionResult::Continue { requeue_after }
    }

    /// Requeue delay for the harness. `None` means no requeue (done, stopped,
    /// or harness-driven retry for `Error`).
    pub fn requeue(&self) -> Option<Duration> {
        match self {
            ActionResult::Continue { requeue_after } => Some(*requeue_after),
            ActionResult::Complete => Some(Duration::ZERO),
            ActionResult::DeleteComplete | ActionResult::Stop => None,
            ActionResult::Error(_) => None,
            ActionResult::Failed { error_count, .. } => Some(calculate_backoff(*error_count)),
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ActionResult::Complete)
    }
}
