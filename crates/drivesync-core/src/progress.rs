//! Progress reporting, cancellation and exactly-once completion
//!
//! Every adapter operation returns immediately with an [`Operation`] handle
//! and finishes later on a spawned task. Three pieces cooperate:
//!
//! - [`Progress`] - units-completed / units-total counter shared by every
//!   concurrent leg of the operation, plus the single cancellation trigger.
//! - [`Completion`] - the `Pending -> {Completed | Cancelled}` state machine.
//!   The transition is one atomic compare-and-swap, so the result handler runs
//!   exactly once no matter how a late network result races a cancellation.
//! - [`Operation`] - the caller-facing handle: progress plus an awaitable result.
//!
//! ## Cancellation
//!
//! [`Progress::cancel`] fires the shared [`CancellationToken`] (outstanding
//! queries observe it and stop) and immediately delivers the operation's
//! cancellation error through the [`Completion`]. A result that arrives
//! afterwards loses the race and is handed back to the worker by
//! [`Completion::try_complete`], which lets the worker undo local side effects.
//!
//! Workers that write local state before their outcome is known call
//! [`OperationContext::defer_cancellation`] first. Cancelling then only fires
//! the token, and the worker delivers the cancellation error itself once its
//! writes are undone, so a caller never sees `Cancelled` while they remain.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::errors::SyncError;

// ============================================================================
// Progress
// ============================================================================

type CancellationHandler = Box<dyn FnOnce() + Send>;

/// Shared units-of-work counter with a single cancellation trigger
pub struct Progress {
    total_units: AtomicU64,
    completed_units: AtomicU64,
    token: CancellationToken,
    cancellation_handler: Mutex<Option<CancellationHandler>>,
}

impl Progress {
    /// Creates a progress handle expecting `total_units` units of work
    pub fn new(total_units: u64) -> Arc<Self> {
        Arc::new(Self {
            total_units: AtomicU64::new(total_units),
            completed_units: AtomicU64::new(0),
            token: CancellationToken::new(),
            cancellation_handler: Mutex::new(None),
        })
    }

    pub fn total_units(&self) -> u64 {
        self.total_units.load(Ordering::Acquire)
    }

    pub fn completed_units(&self) -> u64 {
        self.completed_units.load(Ordering::Acquire)
    }

    /// Replaces the expected total (e.g. once a transfer size is known)
    pub fn set_total_units(&self, total: u64) {
        self.total_units.store(total, Ordering::Release);
    }

    /// Records `units` more units of completed work and returns the new count
    pub fn complete_units(&self, units: u64) -> u64 {
        self.completed_units.fetch_add(units, Ordering::AcqRel) + units
    }

    /// Overwrites the completed count (byte-level transfer progress)
    pub fn set_completed_units(&self, completed: u64) {
        self.completed_units.store(completed, Ordering::Release);
    }

    /// Fraction of work completed, in `0.0..=1.0`
    pub fn fraction_completed(&self) -> f64 {
        let total = self.total_units();
        if total == 0 {
            return 0.0;
        }
        (self.completed_units() as f64 / total as f64).min(1.0)
    }

    /// True once every expected unit has been reported
    pub fn is_finished(&self) -> bool {
        let total = self.total_units();
        total > 0 && self.completed_units() >= total
    }

    /// Requests cancellation of the whole operation
    ///
    /// Never blocks. Outstanding queries observe the token; the operation's
    /// completion receives its cancellation error unless a result already won.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            debug!(
                completed = self.completed_units(),
                total = self.total_units(),
                "Cancellation requested"
            );
        }
        self.token.cancel();

        if let Some(handler) = self.take_cancellation_handler() {
            handler();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token observed by every query issued on behalf of this operation
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn take_cancellation_handler(&self) -> Option<CancellationHandler> {
        self.cancellation_handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Installs the callback run once when [`cancel`](Self::cancel) is invoked
    ///
    /// If cancellation was already requested the handler runs immediately.
    pub fn set_cancellation_handler(&self, handler: impl FnOnce() + Send + 'static) {
        let mut slot = self
            .cancellation_handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.token.is_cancelled() {
            drop(slot);
            handler();
        } else {
            *slot = Some(Box::new(handler));
        }
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("completed_units", &self.completed_units())
            .field("total_units", &self.total_units())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Completion
// ============================================================================

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const CANCELLED: u8 = 2;

/// Terminal state reached by a [`Completion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Pending,
    Completed,
    Cancelled,
}

type ResultHandler<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

/// Exactly-once result delivery for one operation
///
/// `Pending -> Completed` (a result was delivered) and `Pending -> Cancelled`
/// (the cancellation error was delivered) are mutually exclusive and guarded
/// by a single compare-and-swap.
pub struct Completion<T, E = SyncError> {
    state: AtomicU8,
    handler: Mutex<Option<ResultHandler<T, E>>>,
}

impl<T, E> Completion<T, E> {
    /// Creates a pending completion that will invoke `handler` exactly once
    pub fn new(handler: impl FnOnce(Result<T, E>) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(PENDING),
            handler: Mutex::new(Some(Box::new(handler))),
        })
    }

    /// Delivers `result` if the completion is still pending
    ///
    /// # Errors
    /// Hands `result` back when cancellation already won the race, so the
    /// caller can revert whatever the result represents.
    pub fn try_complete(&self, result: Result<T, E>) -> Result<(), Result<T, E>> {
        match self
            .state
            .compare_exchange(PENDING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.deliver(result);
                Ok(())
            }
            Err(_) => {
                debug!("Result arrived after the operation was cancelled");
                Err(result)
            }
        }
    }

    /// Delivers `result` if still pending; returns whether it was delivered
    pub fn complete(&self, result: Result<T, E>) -> bool {
        self.try_complete(result).is_ok()
    }

    /// Delivers `error` as the cancellation outcome if still pending
    pub fn cancel_with(&self, error: E) -> bool {
        match self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.deliver(Err(error));
                true
            }
            Err(_) => false,
        }
    }

    pub fn state(&self) -> CompletionState {
        match self.state.load(Ordering::Acquire) {
            PENDING => CompletionState::Pending,
            COMPLETED => CompletionState::Completed,
            _ => CompletionState::Cancelled,
        }
    }

    fn deliver(&self, result: Result<T, E>) {
        let handler = self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(handler) = handler {
            handler(result);
        }
    }
}

// ============================================================================
// Operation
// ============================================================================

/// Maps a classified [`SyncError`] into an operation's error type
pub type ErrorMapper<E> = Arc<dyn Fn(SyncError) -> E + Send + Sync>;

/// Everything a spawned operation body needs to report back
pub struct OperationContext<T, E = SyncError> {
    pub progress: Arc<Progress>,
    pub completion: Arc<Completion<T, E>>,
    map_error: ErrorMapper<E>,
}

impl<T, E> OperationContext<T, E> {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.progress.cancellation_token()
    }

    /// Maps a classified error into this operation's error type
    pub fn error(&self, error: SyncError) -> E {
        (self.map_error)(error)
    }

    /// Delivers the operation result; see [`Completion::try_complete`]
    pub fn try_complete(&self, result: Result<T, E>) -> Result<(), Result<T, E>> {
        self.completion.try_complete(result)
    }

    pub fn complete(&self, result: Result<T, E>) -> bool {
        self.completion.complete(result)
    }

    /// Makes this worker responsible for delivering the cancellation error
    ///
    /// After this call [`Progress::cancel`] only fires the token. The worker
    /// must observe it and call [`complete_cancelled`](Self::complete_cancelled)
    /// once it has undone its local writes.
    pub fn defer_cancellation(&self) {
        drop(self.progress.take_cancellation_handler());
    }

    /// Delivers the mapped `Cancelled` error if still pending
    pub fn complete_cancelled(&self) -> bool {
        self.completion.cancel_with(self.error(SyncError::Cancelled))
    }
}

/// Handle to an in-flight adapter operation
///
/// Returned immediately by every adapter call. Await [`result`](Self::result)
/// for the outcome, or call [`cancel`](Self::cancel) to request cancellation.
pub struct Operation<T, E = SyncError> {
    progress: Arc<Progress>,
    receiver: oneshot::Receiver<Result<T, E>>,
    map_error: ErrorMapper<E>,
}

impl<T: Send + 'static, E: Send + 'static> Operation<T, E> {
    /// Creates an operation whose cancellation delivers `map_error(Cancelled)`
    pub fn new(total_units: u64, map_error: ErrorMapper<E>) -> (Self, OperationContext<T, E>) {
        let progress = Progress::new(total_units);
        let (tx, rx) = oneshot::channel();

        let completion = Completion::new(move |result| {
            // The receiver may already be gone if the caller dropped the handle.
            let _ = tx.send(result);
        });

        let on_cancel = completion.clone();
        let cancel_error = map_error.clone();
        progress.set_cancellation_handler(move || {
            on_cancel.cancel_with(cancel_error(SyncError::Cancelled));
        });

        let operation = Self {
            progress: progress.clone(),
            receiver: rx,
            map_error: map_error.clone(),
        };
        let context = OperationContext {
            progress,
            completion,
            map_error,
        };

        (operation, context)
    }

    /// Spawns `body` on the current Tokio runtime and returns its handle
    pub fn spawn<F, Fut>(total_units: u64, map_error: ErrorMapper<E>, body: F) -> Self
    where
        F: FnOnce(OperationContext<T, E>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (operation, context) = Self::new(total_units, map_error);
        tokio::spawn(body(context));
        operation
    }

    /// An operation that failed before any work was issued
    pub fn failed(total_units: u64, map_error: ErrorMapper<E>, error: E) -> Self {
        let (operation, context) = Self::new(total_units, map_error);
        context.complete(Err(error));
        operation
    }

    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    /// Requests cancellation; equivalent to `self.progress().cancel()`
    pub fn cancel(&self) {
        self.progress.cancel();
    }

    /// Waits for the single outcome of this operation
    pub async fn result(self) -> Result<T, E> {
        match self.receiver.await {
            Ok(result) => result,
            // The worker went away without reporting (panicked or runtime shut down).
            Err(_) => Err((self.map_error)(SyncError::Unknown)),
        }
    }
}

impl<T: Send + 'static> Operation<T, SyncError> {
    /// Error mapper for operations that report [`SyncError`] directly
    pub fn sync_errors() -> ErrorMapper<SyncError> {
        Arc::new(|error| error)
    }
}
