//! Error types for Mailroom.

use crate::types::SnapshotId;
use mailroom_store::StoreError;
use thiserror::Error;

/// Result type for Mailroom operations.
pub type MailroomResult<T> = Result<T, MailroomError>;

/// Errors that can occur while loading, mutating, or committing documents.
///
/// Errors raised while committing one root of a transaction are reported in
/// that root's [`RootFailure`](crate::RootFailure); they never abort the
/// other roots of the same call.
#[derive(Debug, Error)]
pub enum MailroomError {
    /// The store could not be read while acquiring or reloading a document.
    #[error("failed to load key {key}: {source}")]
    LoadFailed {
        /// The key being loaded.
        key: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// A load or save transform rejected a value.
    #[error("transform failed for key {key}: {message}")]
    TransformFailed {
        /// The key being transformed.
        key: String,
        /// Description of the failure.
        message: String,
    },

    /// The key does not exist and the collection rejects missing keys.
    #[error("key {key} does not exist in collection {collection}")]
    DocumentAbsent {
        /// Collection name.
        collection: String,
        /// The missing key.
        key: String,
    },

    /// An action raised an error while being applied.
    #[error("action #{index} ({label}) failed: {message}")]
    ActionFailed {
        /// The action's label.
        label: String,
        /// Position of the action in its list.
        index: usize,
        /// The action's error message.
        message: String,
    },

    /// The write kept losing the version race.
    #[error("gave up on key {key} after {attempts} version conflicts")]
    ConflictRetriesExhausted {
        /// The contended key.
        key: String,
        /// Number of conflicts observed.
        attempts: u32,
    },

    /// The write kept failing transiently.
    #[error("gave up writing key {key} after {attempts} attempts: {message}")]
    TransientRetriesExhausted {
        /// The key being written.
        key: String,
        /// Number of write attempts made.
        attempts: u32,
        /// The last transient error.
        message: String,
    },

    /// The store refused the write.
    #[error("store rejected write to key {key}: {source}")]
    StoreFailed {
        /// The key being written.
        key: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The snapshot handle refers to a discarded snapshot.
    #[error("snapshot {id} has been discarded")]
    SnapshotDiscarded {
        /// The discarded snapshot.
        id: SnapshotId,
    },

    /// Only leaf snapshots may be transaction targets.
    #[error("snapshot {id} has child snapshots and cannot be a transaction target")]
    NotALeaf {
        /// The non-leaf snapshot.
        id: SnapshotId,
    },

    /// A handle created by another Mailroom instance was passed in.
    #[error("handle belongs to a different mailroom")]
    ForeignHandle,

    /// A required argument was missing or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl MailroomError {
    /// Creates a transform failure.
    pub fn transform_failed(key: impl Into<String>, error: TransformError) -> Self {
        Self::TransformFailed {
            key: key.into(),
            message: error.to_string(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if re-submitting the same work may succeed.
    ///
    /// Action and transform failures are deterministic and are never
    /// considered retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            MailroomError::ConflictRetriesExhausted { .. }
            | MailroomError::TransientRetriesExhausted { .. } => true,
            MailroomError::LoadFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Error raised by an [`Action`](crate::Action).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    message: String,
}

impl ActionError {
    /// Creates an action error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error raised by a collection's load or save transform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    message: String,
}

impl TransformError {
    /// Creates a transform error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
