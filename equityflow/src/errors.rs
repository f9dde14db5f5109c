//! Error types and the failure classifier.
//!
//! [`StageFailure`] is the raw error shape at the remote-call boundary: a
//! stage function either reports an explicit abort or an opaque message from
//! the remote service. [`ErrorKind`] is the coarse four-way taxonomy the rest
//! of the crate works with; it selects user-facing messaging and retry
//! eligibility and never changes correctness semantics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw failure reported by an external stage function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageFailure {
    /// The call observed its cancellation token and aborted.
    #[error("stage call aborted")]
    Aborted,

    /// The remote service rejected or failed the call with a message.
    #[error("{0}")]
    Remote(String),
}

impl StageFailure {
    /// Creates a remote failure from a message.
    #[must_use]
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }
}

/// Classified failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The call was aborted via its cancellation token.
    Cancelled,
    /// Transport or connectivity failure.
    Network,
    /// The remote service rejected the payload.
    Validation,
    /// Anything that did not match a more specific kind.
    Generic,
}

impl ErrorKind {
    /// Classifies a raw stage failure.
    ///
    /// Deterministic and total: every failure maps to exactly one kind.
    /// The substring rules ("network", "fetch", "invalid", matched
    /// case-insensitively) reproduce observed remote-service messages; they
    /// are documented historical behavior, not a stable contract.
    #[must_use]
    pub fn classify(failure: &StageFailure) -> Self {
        match failure {
            StageFailure::Aborted => Self::Cancelled,
            StageFailure::Remote(message) => {
                let lower = message.to_lowercase();
                if lower.contains("network") || lower.contains("fetch") {
                    Self::Network
                } else if lower.contains("invalid") {
                    Self::Validation
                } else {
                    Self::Generic
                }
            }
        }
    }

    /// Returns the user-facing error type string, if any.
    ///
    /// `Cancelled` has no user-facing type: it is only ever shown as the
    /// final outcome of an explicit manual cancel, not as a failure category.
    #[must_use]
    pub fn user_facing_type(self) -> Option<&'static str> {
        match self {
            Self::Cancelled => None,
            Self::Network => Some("network"),
            Self::Validation => Some("validation"),
            Self::Generic => Some("generic"),
        }
    }

    /// Returns true if a `retry()` is worth attempting for this kind.
    ///
    /// `Validation` means the input itself must change first; `Cancelled` is
    /// not a failure category at all.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Generic)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Cancelled => "cancelled",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Generic => "generic",
        };
        f.write_str(label)
    }
}

/// Errors raised while assembling a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required stage implementation was not supplied to the builder.
    #[error("missing stage implementation: {0}")]
    MissingStage(&'static str),
}
