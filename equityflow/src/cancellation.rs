//! One-shot cancellation tokens for in-flight stage calls.
//!
//! Every remote stage call is guarded by a [`CancellationToken`] owned by the
//! invocation that created it. A token transitions exactly once from active to
//! cancelled; the transition is irreversible and idempotent, and registered
//! abort callbacks are notified synchronously exactly once. Cancelling a token
//! after its guarded call has already settled is a no-op.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why a token was cancelled.
///
/// The stage invoker uses this to decide whether a `Cancelled` failure is
/// surfaced to the caller: only [`CancelReason::UserRequested`] cancellations
/// that are still current become visible errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// A newer invocation replaced this one.
    Superseded,
    /// The caller explicitly aborted the in-flight work.
    UserRequested,
    /// The retry controller is restarting the chain from scratch.
    Retry,
    /// The owning pipeline is being torn down.
    Teardown,
}

/// Token for asking an in-flight remote call to abort.
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    callbacks: Mutex<Vec<Box<dyn FnOnce(CancelReason) + Send>>>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .field("reason", &self.reason.lock())
            .finish()
    }
}

impl CancellationToken {
    /// Creates a new active token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        *self.reason.lock()
    }

    /// Requests cancellation.
    ///
    /// Idempotent: only the first reason is stored and callbacks run once.
    pub fn cancel(&self, reason: CancelReason) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.reason.lock() = Some(reason);

            let callbacks: Vec<_> = {
                let mut lock = self.callbacks.lock();
                std::mem::take(&mut *lock)
            };

            for callback in callbacks {
                // Suppress panics in abort hooks
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(reason);
                }))
                .ok();
            }
        }
    }

    /// Registers an abort hook to run when cancellation is requested.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(CancelReason) + Send + 'static,
    {
        if self.is_cancelled() {
            let reason = self.reason().unwrap_or(CancelReason::Superseded);
            callback(reason);
        } else {
            self.callbacks.lock().push(Box::new(callback));
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_initial_state() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_token_cancel() {
        let token = CancellationToken::new();

        token.cancel(CancelReason::UserRequested);

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::UserRequested));
    }

    #[test]
    fn test_token_idempotent() {
        let token = CancellationToken::new();

        token.cancel(CancelReason::Superseded);
        token.cancel(CancelReason::UserRequested);

        // First reason wins
        assert_eq!(token.reason(), Some(CancelReason::Superseded));
    }

    #[test]
    fn test_token_callback() {
        let token = CancellationToken::new();
        let seen = Arc::new(Mutex::new(None));

        let seen_clone = seen.clone();
        token.on_cancel(move |reason| {
            *seen_clone.lock() = Some(reason);
        });

        assert!(seen.lock().is_none());

        token.cancel(CancelReason::Teardown);

        assert_eq!(*seen.lock(), Some(CancelReason::Teardown));
    }

    #[test]
    fn test_token_callback_runs_once() {
        let token = CancellationToken::new();
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let count_clone = count.clone();
        token.on_cancel(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        token.cancel(CancelReason::Retry);
        token.cancel(CancelReason::Retry);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_callback_immediate_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel(CancelReason::UserRequested);

        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();

        token.on_cancel(move |reason| {
            *seen_clone.lock() = Some(reason);
        });

        assert_eq!(*seen.lock(), Some(CancelReason::UserRequested));
    }
}
