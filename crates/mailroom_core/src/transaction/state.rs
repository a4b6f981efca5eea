//! Per-root commit state machine.

use std::fmt;
use tracing::trace;

/// Where one root's commit currently stands.
///
/// ```text
///  Applying ──► Writing ──► Committed
///     ▲  │        │  ▲
///     │  │        │  └── TransientFailure
///     │  │        ▼            │
///     └──┼─ VersionConflict    │
///        ▼        │            │
///      Failed ◄───┴────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitState {
    /// Building working copies from the cached root value.
    Applying,
    /// A conditional write is in flight.
    Writing,
    /// The store rejected the write's version token.
    VersionConflict,
    /// The write failed in a way that may succeed on retry.
    TransientFailure,
    /// The write was acknowledged.
    Committed,
    /// The root gave up for this call.
    Failed,
}

impl CommitState {
    /// Returns true for `Committed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, CommitState::Committed | CommitState::Failed)
    }

    /// Returns true if the engine may move from `self` to `next`.
    pub fn can_transition_to(self, next: CommitState) -> bool {
        use CommitState::*;
        matches!(
            (self, next),
            (Applying, Writing)
                | (Applying, Failed)
                | (Writing, Committed)
                | (Writing, VersionConflict)
                | (Writing, TransientFailure)
                | (Writing, Failed)
                | (VersionConflict, Applying)
                | (VersionConflict, Failed)
                | (TransientFailure, Writing)
                | (TransientFailure, Failed)
        )
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitState::Applying => "applying",
            CommitState::Writing => "writing",
            CommitState::VersionConflict => "version-conflict",
            CommitState::TransientFailure => "transient-failure",
            CommitState::Committed => "committed",
            CommitState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for one root's pass through the commit engine.
#[derive(Debug)]
pub(crate) struct CommitAttempt {
    state: CommitState,
    pub(crate) write_attempts: u32,
    pub(crate) conflicts: u32,
}

impl CommitAttempt {
    pub(crate) fn new() -> Self {
        Self {
            state: CommitState::Applying,
            write_attempts: 0,
            conflicts: 0,
        }
    }

    pub(crate) fn state(&self) -> CommitState {
        self.state
    }

    pub(crate) fn transition(&mut self, key: &str, next: CommitState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal commit transition {} -> {}",
            self.state,
            next
        );
        trace!(key, from = %self.state, to = %next, "commit state");
        self.state = next;
    }
}
