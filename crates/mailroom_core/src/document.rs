//! Documents: cached values of single store keys.

use crate::collection::{CollectionCore, Loaded};
use crate::config::RetryConfig;
use crate::error::{MailroomError, MailroomResult};
use crate::snapshot::SnapshotArena;
use crate::transaction::retry_transient;
use crate::types::{DocumentId, DocumentValue, SnapshotId};
use bytes::Bytes;
use mailroom_store::VersionToken;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

struct DocumentState<T> {
    value: T,
    version: Option<VersionToken>,
    /// Stored bytes behind `value`, if the key existed.
    raw: Option<Bytes>,
    /// Set when a write is issued, cleared by an acknowledged write or a
    /// reload. A dirty cache may not match the store.
    dirty: bool,
}

pub(crate) struct DocumentCore<T> {
    pub(crate) id: DocumentId,
    pub(crate) key: String,
    pub(crate) collection: Arc<CollectionCore<T>>,
    state: RwLock<DocumentState<T>>,
    pub(crate) snapshots: RwLock<SnapshotArena<T>>,
    /// Serializes commits, reloads, and local snapshot edits on this root.
    pub(crate) commit_lock: tokio::sync::Mutex<()>,
}

impl<T: DocumentValue> DocumentCore<T> {
    pub(crate) fn new(
        id: DocumentId,
        key: String,
        collection: Arc<CollectionCore<T>>,
        loaded: Loaded<T>,
    ) -> Self {
        Self {
            id,
            key,
            collection,
            state: RwLock::new(DocumentState {
                value: loaded.value,
                version: loaded.version,
                raw: loaded.raw,
                dirty: false,
            }),
            snapshots: RwLock::new(SnapshotArena::new()),
            commit_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns a copy of the cached value and its version.
    pub(crate) fn current(&self) -> (T, Option<VersionToken>) {
        let state = self.state.read();
        (state.value.clone(), state.version)
    }

    pub(crate) fn version(&self) -> Option<VersionToken> {
        self.state.read().version
    }

    pub(crate) fn raw(&self) -> Option<Bytes> {
        self.state.read().raw.clone()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    pub(crate) fn mark_dirty(&self) {
        self.state.write().dirty = true;
    }

    /// Replaces the cached root value and writes back any snapshot working
    /// copies. Returns true if the stored bytes changed.
    pub(crate) fn install(
        &self,
        value: T,
        version: Option<VersionToken>,
        raw: Option<Bytes>,
        snapshot_values: BTreeMap<SnapshotId, T>,
    ) -> bool {
        let changed = {
            let mut state = self.state.write();
            let changed = state.raw != raw;
            state.value = value;
            state.version = version;
            state.raw = raw;
            state.dirty = false;
            changed
        };

        if !snapshot_values.is_empty() {
            let mut arena = self.snapshots.write();
            for (id, value) in snapshot_values {
                arena.set_value(id, value);
            }
        }
        changed
    }

    /// Calls the update callback of every live snapshot of this root.
    ///
    /// Runs with no arena lock held, so callbacks may read the document and
    /// its snapshots.
    pub(crate) fn notify(&self) {
        let callbacks = self.snapshots.read().callbacks();
        for callback in &callbacks {
            callback();
        }
    }

    /// Re-reads the key and installs the result without notifying. Returns
    /// true if the stored bytes changed. The caller must hold `commit_lock`.
    pub(crate) async fn reload_locked(&self, retry: &RetryConfig) -> MailroomResult<bool> {
        let store = &self.collection.store;
        let stored = retry_transient(retry, || store.get(&self.key))
            .await
            .map_err(|source| MailroomError::LoadFailed {
                key: self.key.clone(),
                source,
            })?;
        let loaded = self.collection.decode(&self.key, stored)?;

        debug!(key = %self.key, document = %self.id, version = ?loaded.version, "document reloaded");
        self.collection.shared.stats.record_reload();
        Ok(self.install(loaded.value, loaded.version, loaded.raw, BTreeMap::new()))
    }
}

/// The in-memory image of one store key.
///
/// A document holds the last value it loaded or committed together with the
/// version token the store returned for it. Only commits and reloads change
/// that value; direct edits go through a [`Transaction`](crate::Transaction)
/// or a [`Snapshot`](crate::Snapshot).
///
/// Handles are cheap to clone and all refer to the same document.
pub struct Document<T> {
    pub(crate) core: Arc<DocumentCore<T>>,
}

impl<T> Clone for Document<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Document<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.core.id)
            .field("collection", &self.core.collection.name)
            .field("key", &self.core.key)
            .finish()
    }
}

impl<T: DocumentValue> Document<T> {
    /// Returns the document ID.
    pub fn id(&self) -> DocumentId {
        self.core.id
    }

    /// Returns the store key.
    pub fn key(&self) -> &str {
        &self.core.key
    }

    /// Returns the owning collection's name.
    pub fn collection_name(&self) -> &str {
        &self.core.collection.name
    }

    /// Returns a copy of the cached value.
    pub fn value(&self) -> T {
        self.core.current().0
    }

    /// Reads the cached value without copying it.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.core.state.read().value)
    }

    /// Returns the version token of the cached value, or `None` if the key
    /// did not exist when last read.
    pub fn version(&self) -> Option<VersionToken> {
        self.core.version()
    }

    /// Returns true if a write was issued whose outcome is unknown.
    ///
    /// A dirty document is reloaded before its next transaction applies.
    pub fn is_dirty(&self) -> bool {
        self.core.is_dirty()
    }

    /// Returns the number of snapshots below this document, at any depth,
    /// that still have a live handle.
    pub fn snapshot_count(&self) -> usize {
        self.core.snapshots.read().len()
    }

    /// Re-reads the key from the store and replaces the cached value.
    ///
    /// Waits for any in-flight commit on this document. Snapshot update
    /// callbacks fire afterwards if the stored bytes changed.
    ///
    /// # Errors
    ///
    /// Returns `LoadFailed` once transient read retries are exhausted, or a
    /// decode error from the collection.
    pub async fn reload(&self) -> MailroomResult<()> {
        let _guard = self.core.commit_lock.lock().await;
        let retry = self.core.collection.shared.options.write_retry.clone();
        if self.core.reload_locked(&retry).await? {
            self.core.notify();
        }
        Ok(())
    }
}
