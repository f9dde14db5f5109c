//! Per-stage observable state.
//!
//! Each stage owns one [`StageState`]. The pending/fetching split gives
//! callers the stale-while-revalidate distinction: `is_pending` means the
//! stage is awaiting its first-ever result, `is_fetching` means it is
//! refreshing while a previous result is still displayable. The two flags are
//! mutually exclusive by construction.

use crate::errors::ErrorKind;
use serde::Serialize;

/// Observable state of a single stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageState<T> {
    /// The last accepted output, if any.
    pub data: Option<T>,
    /// A call is outstanding and no previous data exists (first load).
    pub is_pending: bool,
    /// A call is outstanding while previous data is still held.
    pub is_fetching: bool,
    /// The surfaced error, if the last current invocation failed.
    pub error: Option<ErrorKind>,
}

impl<T> Default for StageState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_pending: false,
            is_fetching: false,
            error: None,
        }
    }
}

impl<T> StageState<T> {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a call as outstanding.
    ///
    /// Sets exactly one of the pending/fetching flags depending on whether
    /// previous data exists, and clears any stale error.
    pub fn begin(&mut self) {
        if self.data.is_some() {
            self.is_pending = false;
            self.is_fetching = true;
        } else {
            self.is_pending = true;
            self.is_fetching = false;
        }
        self.error = None;
    }

    /// Accepts a completion: stores the output, clears flags and error.
    pub fn complete(&mut self, value: T) {
        self.data = Some(value);
        self.is_pending = false;
        self.is_fetching = false;
        self.error = None;
    }

    /// Records a surfaced failure: clears flags, keeps any previous data.
    pub fn fail(&mut self, kind: ErrorKind) {
        self.is_pending = false;
        self.is_fetching = false;
        self.error = Some(kind);
    }

    /// Clears in-flight flags and error while retaining data.
    ///
    /// Used when a newer invocation supersedes this stage before it settles,
    /// so a halted chain never leaves a stage looking busy.
    pub fn interrupt(&mut self) {
        self.is_pending = false;
        self.is_fetching = false;
        self.error = None;
    }

    /// Resets the state to empty.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns true if a call is outstanding.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.is_pending || self.is_fetching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_begin_without_data_is_pending() {
        let mut state: StageState<u32> = StageState::new();
        state.begin();

        assert!(state.is_pending);
        assert!(!state.is_fetching);
        assert!(state.in_flight());
    }

    #[test]
    fn test_begin_with_data_is_fetching() {
        let mut state = StageState::new();
        state.complete(7_u32);
        state.begin();

        assert!(!state.is_pending);
        assert!(state.is_fetching);
        assert_eq!(state.data, Some(7));
    }

    #[test]
    fn test_flags_mutually_exclusive() {
        let mut state: StageState<u32> = StageState::new();

        state.begin();
        assert!(state.is_pending != state.is_fetching);

        state.complete(1);
        state.begin();
        assert!(state.is_pending != state.is_fetching);
    }

    #[test]
    fn test_complete_clears_flags_and_error() {
        let mut state: StageState<u32> = StageState::new();
        state.begin();
        state.fail(ErrorKind::Network);
        state.begin();
        state.complete(3);

        assert_eq!(state.data, Some(3));
        assert!(!state.in_flight());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_fail_keeps_previous_data() {
        let mut state = StageState::new();
        state.complete(5_u32);
        state.begin();
        state.fail(ErrorKind::Generic);

        assert_eq!(state.data, Some(5));
        assert_eq!(state.error, Some(ErrorKind::Generic));
        assert!(!state.in_flight());
    }

    #[test]
    fn test_begin_clears_stale_error() {
        let mut state: StageState<u32> = StageState::new();
        state.begin();
        state.fail(ErrorKind::Validation);
        state.begin();

        assert!(state.error.is_none());
    }

    #[test]
    fn test_interrupt_retains_data() {
        let mut state = StageState::new();
        state.complete(9_u32);
        state.begin();
        state.interrupt();

        assert_eq!(state.data, Some(9));
        assert!(!state.in_flight());
        assert!(state.error.is_none());
    }

    #[test]
    fn test_clear() {
        let mut state = StageState::new();
        state.complete(2_u32);
        state.begin();
        state.clear();

        assert!(state.data.is_none());
        assert!(!state.in_flight());
    }
}
