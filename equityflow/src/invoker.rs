//! The stage invoker: one guarded remote call.
//!
//! Wraps a single stage call with cancellation-token management, version
//! stamping, bounded retry, and error classification. The invoker is the only
//! writer of its stage's [`StageState`], and it only writes while its
//! invocation version is still current; everything else is discarded
//! silently.

use crate::cancellation::{CancelReason, CancellationToken};
use crate::errors::{ErrorKind, StageFailure};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::state::StageState;
use crate::version::{InvocationVersion, InvocationVersioner};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;

/// How a guarded stage invocation ended.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The call settled while still current; `data` was stored.
    Completed(T),
    /// The call failed while still current; `error` was surfaced.
    Failed(ErrorKind),
    /// The call belonged to a superseded invocation; nothing was mutated.
    Discarded,
}

/// Per-stage invocation machinery: the active token slot and retry policy.
pub struct StageInvoker {
    name: &'static str,
    retry: RetryPolicy,
    active: Mutex<Option<Arc<CancellationToken>>>,
}

impl std::fmt::Debug for StageInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageInvoker")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("active", &self.active.lock().is_some())
            .finish()
    }
}

impl StageInvoker {
    /// Creates an invoker for a named stage.
    #[must_use]
    pub fn new(name: &'static str, retry: RetryPolicy) -> Self {
        Self {
            name,
            retry,
            active: Mutex::new(None),
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cancels the active token for this stage, if any.
    pub fn cancel_active(&self, reason: CancelReason) {
        let token = self.active.lock().clone();
        if let Some(token) = token {
            token.cancel(reason);
        }
    }

    /// Drops the active slot if it still holds `token`.
    fn clear_active(&self, token: &Arc<CancellationToken>) {
        let mut slot = self.active.lock();
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, token)) {
            *slot = None;
        }
    }

    /// Runs one guarded invocation of the stage function.
    ///
    /// `version` is the invocation version of the owning pipeline run,
    /// stamped before the call; the settled result is compared against
    /// `versions.current()` and discarded when stale. `call` is invoked once
    /// per attempt with the invocation's token.
    pub async fn invoke<T, F>(
        &self,
        versions: &InvocationVersioner,
        version: InvocationVersion,
        state: &Mutex<StageState<T>>,
        call: F,
    ) -> StageOutcome<T>
    where
        T: Clone,
        F: Fn(Arc<CancellationToken>) -> BoxFuture<'static, Result<T, StageFailure>>,
    {
        // A previous invocation of this stage is now irrelevant.
        self.cancel_active(CancelReason::Superseded);

        let token = CancellationToken::new();
        *self.active.lock() = Some(token.clone());

        {
            let mut slot = state.lock();
            if !versions.is_current(version) {
                tracing::trace!(stage = self.name, %version, "superseded before call start");
                self.clear_active(&token);
                return StageOutcome::Discarded;
            }
            slot.begin();
        }

        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            tracing::debug!(stage = self.name, %version, attempt, "invoking stage");

            match call(token.clone()).await {
                Ok(value) => {
                    let mut slot = state.lock();
                    if !versions.is_current(version) {
                        tracing::debug!(
                            stage = self.name,
                            %version,
                            "discarding stale completion"
                        );
                        self.clear_active(&token);
                        return StageOutcome::Discarded;
                    }
                    slot.complete(value.clone());
                    drop(slot);
                    self.clear_active(&token);
                    return StageOutcome::Completed(value);
                }
                Err(failure) => {
                    let kind = ErrorKind::classify(&failure);

                    if kind == ErrorKind::Cancelled {
                        // A manual cancel that no newer invocation has
                        // superseded is the one cancellation the caller gets
                        // to see; every other cancel is silent.
                        let manual = token.reason() == Some(CancelReason::UserRequested);
                        let mut slot = state.lock();
                        if manual && versions.is_current(version) {
                            slot.fail(ErrorKind::Cancelled);
                            drop(slot);
                            self.clear_active(&token);
                            return StageOutcome::Failed(ErrorKind::Cancelled);
                        }
                        tracing::debug!(stage = self.name, %version, "cancelled, discarding");
                        self.clear_active(&token);
                        return StageOutcome::Discarded;
                    }

                    if !versions.is_current(version) {
                        tracing::debug!(stage = self.name, %version, "discarding stale failure");
                        self.clear_active(&token);
                        return StageOutcome::Discarded;
                    }

                    if self.retry.decide(kind, attempt) == RetryDecision::Retry {
                        tracing::debug!(
                            stage = self.name,
                            %version,
                            attempt,
                            error = %failure,
                            "retrying after failure"
                        );
                        continue;
                    }

                    let mut slot = state.lock();
                    if !versions.is_current(version) {
                        self.clear_active(&token);
                        return StageOutcome::Discarded;
                    }
                    slot.fail(kind);
                    drop(slot);
                    self.clear_active(&token);
                    return StageOutcome::Failed(kind);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ok_call(
        value: u32,
    ) -> impl Fn(Arc<CancellationToken>) -> BoxFuture<'static, Result<u32, StageFailure>> {
        move |_token| async move { Ok(value) }.boxed()
    }

    #[tokio::test]
    async fn test_invoke_success_stores_data() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::none());

        let version = versions.next();
        let outcome = invoker.invoke(&versions, version, &state, ok_call(42)).await;

        assert!(matches!(outcome, StageOutcome::Completed(42)));
        let slot = state.lock();
        assert_eq!(slot.data, Some(42));
        assert!(!slot.in_flight());
    }

    #[tokio::test]
    async fn test_invoke_stale_success_discarded() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::none());

        let version = versions.next();
        versions.next(); // a newer run supersedes before the call settles

        let outcome = invoker.invoke(&versions, version, &state, ok_call(1)).await;

        assert!(matches!(outcome, StageOutcome::Discarded));
        assert!(state.lock().data.is_none());
    }

    #[tokio::test]
    async fn test_invoke_failure_classified_and_surfaced() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::none());

        let version = versions.next();
        let outcome = invoker
            .invoke(&versions, version, &state, |_token| {
                async { Err::<u32, _>(StageFailure::remote("network down")) }.boxed()
            })
            .await;

        assert!(matches!(outcome, StageOutcome::Failed(ErrorKind::Network)));
        assert_eq!(state.lock().error, Some(ErrorKind::Network));
    }

    #[tokio::test]
    async fn test_invoke_retries_then_succeeds() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::retrying());
        let calls = Arc::new(AtomicUsize::new(0));

        let version = versions.next();
        let calls_clone = calls.clone();
        let outcome = invoker
            .invoke(&versions, version, &state, move |_token| {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(StageFailure::remote("flaky"))
                    } else {
                        Ok(99_u32)
                    }
                }
                .boxed()
            })
            .await;

        assert!(matches!(outcome, StageOutcome::Completed(99)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invoke_no_retry_policy_single_call() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::none());
        let calls = Arc::new(AtomicUsize::new(0));

        let version = versions.next();
        let calls_clone = calls.clone();
        let outcome = invoker
            .invoke(&versions, version, &state, move |_token| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { Err::<u32, _>(StageFailure::remote("boom")) }.boxed()
            })
            .await;

        assert!(matches!(outcome, StageOutcome::Failed(ErrorKind::Generic)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_cancelled_never_retried() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::attempts(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let version = versions.next();
        let calls_clone = calls.clone();
        let outcome = invoker
            .invoke(&versions, version, &state, move |token| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                token.cancel(CancelReason::Superseded);
                async { Err::<u32, _>(StageFailure::Aborted) }.boxed()
            })
            .await;

        assert!(matches!(outcome, StageOutcome::Discarded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invoke_manual_cancel_surfaces() {
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::retrying());

        let version = versions.next();
        let outcome = invoker
            .invoke(&versions, version, &state, |token| {
                token.cancel(CancelReason::UserRequested);
                async { Err::<u32, _>(StageFailure::Aborted) }.boxed()
            })
            .await;

        assert!(matches!(outcome, StageOutcome::Failed(ErrorKind::Cancelled)));
        let slot = state.lock();
        assert_eq!(slot.error, Some(ErrorKind::Cancelled));
        assert!(!slot.in_flight());
    }

    #[tokio::test]
    async fn test_invoke_superseded_manual_cancel_is_silent() {
        let versions = Arc::new(InvocationVersioner::new());
        let state = Mutex::new(StageState::new());
        let invoker = StageInvoker::new("projection", RetryPolicy::none());

        let version = versions.next();
        let versions_clone = versions.clone();
        let outcome = invoker
            .invoke(&versions, version, &state, move |token| {
                // A manual cancel races with a newer invocation: the newer
                // version wins and the cancel is not surfaced.
                token.cancel(CancelReason::UserRequested);
                versions_clone.next();
                async { Err::<u32, _>(StageFailure::Aborted) }.boxed()
            })
            .await;

        assert!(matches!(outcome, StageOutcome::Discarded));
        assert!(state.lock().error.is_none());
    }

    #[tokio::test]
    async fn test_new_invoke_cancels_previous_token() {
        let invoker = StageInvoker::new("projection", RetryPolicy::none());
        let versions = InvocationVersioner::new();
        let state = Mutex::new(StageState::new());

        let first = CancellationToken::new();
        *invoker.active.lock() = Some(first.clone());

        let version = versions.next();
        let _ = invoker.invoke(&versions, version, &state, ok_call(1)).await;

        assert!(first.is_cancelled());
        assert_eq!(first.reason(), Some(CancelReason::Superseded));
    }
}
