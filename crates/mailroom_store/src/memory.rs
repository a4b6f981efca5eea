//! In-memory data store for testing.

use crate::backend::DataStore;
use crate::error::{StoreError, StoreResult};
use crate::version::{StoredValue, VersionToken};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Pending injected faults, consumed one call at a time.
#[derive(Debug, Default)]
struct Faults {
    transient_reads: u32,
    transient_writes: u32,
    interfering_writes: u32,
    unavailable: bool,
}

/// What the next write should run into.
enum WriteFault {
    None,
    Interference,
}

/// An in-memory versioned key-value store.
///
/// This store keeps every key in a map guarded by a lock and is suitable for:
/// - Unit and integration tests
/// - Stress runs that need a controllable "remote" store
///
/// Beyond the [`DataStore`] contract it can simulate the things a real
/// remote store does to its callers: latency, transient failures, outages,
/// and other writers racing on the same key.
///
/// Versions are allocated from a single counter starting at 1, so the
/// first write anywhere in the store produces `v1`.
///
/// # Example
///
/// ```rust
/// use mailroom_store::{DataStore, InMemoryStore, StoreError};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let store = InMemoryStore::new();
/// let v1 = store.put_external("counter", b"0".to_vec());
///
/// // Another writer moves the key; our write with the stale token conflicts.
/// store.put_external("counter", b"7".to_vec());
/// let result = store.set("counter", b"1".to_vec().into(), Some(v1)).await;
/// assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
/// # });
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    name: String,
    entries: RwLock<HashMap<String, StoredValue>>,
    next_version: AtomicU64,
    faults: Mutex<Faults>,
    latency: Option<Duration>,
    reads: AtomicU64,
    writes: AtomicU64,
    conflicts: AtomicU64,
    failures: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Creates a new empty store with a display name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            faults: Mutex::new(Faults::default()),
            latency: None,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Makes every `get` and `set` sleep for `latency` before running.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Writes `raw` unconditionally, as another client of the store would.
    ///
    /// Used to seed keys and to simulate concurrent writers.
    pub fn put_external(&self, key: &str, raw: impl Into<Bytes>) -> VersionToken {
        let version = self.allocate_version();
        self.entries
            .write()
            .insert(key.to_string(), StoredValue::new(raw, version));
        version
    }

    /// Removes a key, as another client of the store would.
    pub fn remove_external(&self, key: &str) -> Option<StoredValue> {
        self.entries.write().remove(key)
    }

    /// Returns the current revision of `key` without counting a read.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<StoredValue> {
        self.entries.read().get(key).cloned()
    }

    /// Returns the number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Makes the next `count` reads fail transiently.
    pub fn fail_next_reads(&self, count: u32) {
        self.faults.lock().transient_reads = count;
    }

    /// Makes the next `count` writes fail transiently without writing.
    pub fn fail_next_writes(&self, count: u32) {
        self.faults.lock().transient_writes = count;
    }

    /// Makes another writer touch the key right before each of the next
    /// `count` writes, so those writes lose the version race.
    ///
    /// The interfering writer rewrites the currently stored bytes under a new
    /// version (or, for a missing key, stores the incoming bytes).
    pub fn interfere_next_writes(&self, count: u32) {
        self.faults.lock().interfering_writes = count;
    }

    /// Makes every call fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.lock().unavailable = unavailable;
    }

    /// Returns the number of successful reads.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the number of successful conditional writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the number of writes rejected with a version conflict.
    pub fn conflict_count(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of calls failed by injected faults.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn allocate_version(&self) -> VersionToken {
        VersionToken::new(self.next_version.fetch_add(1, Ordering::SeqCst))
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_read_fault(&self) -> StoreResult<()> {
        let mut faults = self.faults.lock();
        if faults.unavailable {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::unavailable("store offline"));
        }
        if faults.transient_reads > 0 {
            faults.transient_reads -= 1;
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::transient("injected read failure"));
        }
        Ok(())
    }

    fn take_write_fault(&self) -> StoreResult<WriteFault> {
        let mut faults = self.faults.lock();
        if faults.unavailable {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::unavailable("store offline"));
        }
        if faults.transient_writes > 0 {
            faults.transient_writes -= 1;
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::transient("injected write failure"));
        }
        if faults.interfering_writes > 0 {
            faults.interfering_writes -= 1;
            return Ok(WriteFault::Interference);
        }
        Ok(WriteFault::None)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> StoreResult<Option<StoredValue>> {
        self.simulate_latency().await;
        self.take_read_fault()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        raw: Bytes,
        expected: Option<VersionToken>,
    ) -> StoreResult<VersionToken> {
        self.simulate_latency().await;
        let fault = self.take_write_fault()?;

        let mut entries = self.entries.write();

        if let WriteFault::Interference = fault {
            let interfering = entries
                .get(key)
                .map(|current| current.raw.clone())
                .unwrap_or_else(|| raw.clone());
            let version = self.allocate_version();
            entries.insert(key.to_string(), StoredValue::new(interfering, version));
        }

        let current = entries.get(key).map(|stored| stored.version);
        if current != expected {
            self.conflicts.fetch_add(1, Ordering::Relaxed);
            return Err(StoreError::version_conflict(key));
        }

        let version = self.allocate_version();
        entries.insert(key.to_string(), StoredValue::new(raw, version));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(version)
    }
}
