//! Bounded retry policy for stage invocations.
//!
//! Deliberately minimal: a bounded number of immediate attempts, no backoff
//! or jitter. `Cancelled` failures are never retried regardless of policy.

use crate::errors::ErrorKind;
use serde::{Deserialize, Serialize};

/// Retry bound for a single stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per invocation, including the initial call.
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// One attempt, no retries.
    #[must_use]
    pub fn none() -> Self {
        Self { max_attempts: 1 }
    }

    /// The standard retrying policy: up to three attempts.
    #[must_use]
    pub fn retrying() -> Self {
        Self { max_attempts: 3 }
    }

    /// A policy with an explicit attempt bound (at least one).
    #[must_use]
    pub fn attempts(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Decides what to do after a failed attempt.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    #[must_use]
    pub fn decide(&self, kind: ErrorKind, attempt: usize) -> RetryDecision {
        if kind == ErrorKind::Cancelled {
            RetryDecision::NotRetryable
        } else if attempt < self.max_attempts {
            RetryDecision::Retry
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl From<bool> for RetryPolicy {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::retrying()
        } else {
            Self::none()
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try the call again immediately.
    Retry,
    /// Attempts exhausted; surface the failure.
    GiveUp,
    /// The failure kind is never retried.
    NotRetryable,
}
