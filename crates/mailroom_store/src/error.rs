//! Error types for store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a backing store can report.
///
/// The three variants map onto the three outcomes Mailroom reacts to:
/// the write lost an optimistic-concurrency race, the call failed in a way
/// that may succeed if repeated, or the store refused the call outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The expected version token did not match the stored one.
    #[error("version conflict on key {key}")]
    VersionConflict {
        /// The key whose version moved.
        key: String,
    },

    /// Network or timeout failure; the call may be retried.
    #[error("transient store failure: {message}")]
    Transient {
        /// Error message.
        message: String,
    },

    /// The store rejected the call; retrying will not help.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
    },
}

impl StoreError {
    /// Creates a version conflict error.
    pub fn version_conflict(key: impl Into<String>) -> Self {
        Self::VersionConflict { key: key.into() }
    }

    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a non-retryable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Returns true if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }

    /// Returns true if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
