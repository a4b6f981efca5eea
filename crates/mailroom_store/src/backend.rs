//! Data store trait definition.

use crate::error::StoreResult;
use crate::version::{StoredValue, VersionToken};
use async_trait::async_trait;
use bytes::Bytes;

/// A remote, versioned key-value store.
///
/// Data stores are **opaque byte stores** with optimistic concurrency:
/// every successful write returns a fresh [`VersionToken`], and every write
/// names the token it expects to replace.
///
/// # Invariants
///
/// - `get` returns the latest acknowledged revision, or `None`
/// - `set` succeeds only if the stored version equals `expected`
///   (`expected = None` means the key must not exist yet)
/// - A conflicting `set` leaves the stored revision untouched
/// - Implementations must be `Send + Sync`; calls may suspend
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Returns a display name for logging.
    fn name(&self) -> &str;

    /// Fetches the current raw value and version of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Transient`](crate::StoreError::Transient) on
    /// network failure and [`StoreError::Unavailable`](crate::StoreError::Unavailable)
    /// if the store refuses the call.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredValue>>;

    /// Writes `raw` under `key` if the stored version equals `expected`.
    ///
    /// Returns the version token of the new revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`](crate::StoreError::VersionConflict)
    /// if another writer got there first, [`StoreError::Transient`](crate::StoreError::Transient)
    /// on network failure, and [`StoreError::Unavailable`](crate::StoreError::Unavailable)
    /// if the store refuses the call.
    async fn set(
        &self,
        key: &str,
        raw: Bytes,
        expected: Option<VersionToken>,
    ) -> StoreResult<VersionToken>;
}
