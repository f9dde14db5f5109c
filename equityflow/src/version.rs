//! Invocation versioning for stale-response arbitration.
//!
//! Every logical pipeline run is stamped with a strictly increasing
//! [`InvocationVersion`]. A completion (success or failure) is only allowed to
//! mutate stage state if its version still equals [`InvocationVersioner::current`]
//! at settle time. This is the authoritative staleness test: a cancellation
//! signal and a network response can race, so cancellation alone is never
//! trusted to keep stale results out.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A strictly increasing sequence number identifying one logical pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvocationVersion(u64);

impl InvocationVersion {
    /// Returns the raw sequence number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for InvocationVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Issues invocation versions for a single orchestrator instance.
///
/// Exactly one version is "current" at any time: the highest issued so far.
/// The versioner is owned by one orchestrator and never shared across
/// instances.
#[derive(Debug, Default)]
pub struct InvocationVersioner {
    counter: AtomicU64,
}

impl InvocationVersioner {
    /// Creates a new versioner starting below the first issued version.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically increments and returns a new version.
    pub fn next(&self) -> InvocationVersion {
        InvocationVersion(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Returns the latest issued version.
    #[must_use]
    pub fn current(&self) -> InvocationVersion {
        InvocationVersion(self.counter.load(Ordering::SeqCst))
    }

    /// Returns true if `version` is still the latest issued.
    #[must_use]
    pub fn is_current(&self, version: InvocationVersion) -> bool {
        self.current() == version
    }
}
