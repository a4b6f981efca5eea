//! The Mailroom coordinator.

use crate::collection::{Collection, CollectionBuilder, MissingKeyPolicy};
use crate::config::MailroomOptions;
use crate::error::{MailroomError, MailroomResult, TransformError};
use crate::snapshot::{Snapshot, SnapshotOptions};
use crate::stats::{MailroomStats, StatsSnapshot};
use crate::transaction::{Transaction, TransactionReport};
use crate::types::{CollectionId, DocumentValue, NodeRef, SnapshotId, Target, TransactionId};
use bytes::Bytes;
use mailroom_store::DataStore;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// State shared by a Mailroom and every handle it hands out.
pub(crate) struct Shared {
    pub(crate) options: MailroomOptions,
    pub(crate) stats: MailroomStats,
    next_collection: AtomicU32,
    next_document: AtomicU64,
    next_snapshot: AtomicU64,
    next_transaction: AtomicU64,
}

impl Shared {
    fn new(options: MailroomOptions) -> Self {
        Self {
            options,
            stats: MailroomStats::new(),
            next_collection: AtomicU32::new(1),
            next_document: AtomicU64::new(1),
            next_snapshot: AtomicU64::new(1),
            next_transaction: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_collection_id(&self) -> CollectionId {
        CollectionId::new(self.next_collection.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn next_document_id(&self) -> u64 {
        self.next_document.fetch_add(1, Ordering::Relaxed)
    }

    fn next_snapshot_id(&self) -> SnapshotId {
        SnapshotId::new(self.next_snapshot.fetch_add(1, Ordering::Relaxed))
    }

    fn next_transaction_id(&self) -> TransactionId {
        TransactionId::new(self.next_transaction.fetch_add(1, Ordering::Relaxed))
    }
}

/// Entry point: creates collections and snapshots and runs transactions.
///
/// A `Mailroom` is an explicit value with no global state. Clones share the
/// same options, ID counters, and statistics. Handles from one instance
/// are rejected by every other instance with
/// [`MailroomError::ForeignHandle`].
///
/// # Example
///
/// ```rust
/// use mailroom_core::codec::{cbor_load, cbor_save};
/// use mailroom_core::{Action, Mailroom, MailroomOptions, SnapshotOptions, Transaction};
/// use mailroom_store::InMemoryStore;
/// use std::sync::Arc;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mailroom = Mailroom::new(MailroomOptions::default());
/// let wallets = mailroom.create_collection::<u64, _, _>(
///     Arc::new(InMemoryStore::new()),
///     cbor_load::<u64>,
///     cbor_save::<u64>,
/// );
///
/// let wallet = wallets.document("bob").await.unwrap();
/// let draft = mailroom.create_snapshot(&wallet, SnapshotOptions::new()).unwrap();
///
/// let deposit = Action::infallible("deposit", |w: &mut u64| *w += 40);
/// let txn = Transaction::new().with(&draft, [deposit]);
/// mailroom.run_transaction(txn).await.unwrap();
///
/// assert_eq!(draft.value().unwrap(), 40);
/// assert_eq!(wallet.value(), 40);
/// # });
/// ```
#[derive(Clone)]
pub struct Mailroom {
    shared: Arc<Shared>,
}

impl Mailroom {
    /// Creates a Mailroom with the given options.
    pub fn new(options: MailroomOptions) -> Self {
        Self {
            shared: Arc::new(Shared::new(options)),
        }
    }

    /// Returns the options this instance was created with.
    pub fn options(&self) -> &MailroomOptions {
        &self.shared.options
    }

    /// Returns a copy of the engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Binds `store` to a value type through load and save transforms.
    ///
    /// Keys that do not exist yet start from `T::default()`. Use
    /// [`collection_builder`](Self::collection_builder) for other defaults or
    /// to reject missing keys.
    pub fn create_collection<T, L, S>(
        &self,
        store: Arc<dyn DataStore>,
        load_transform: L,
        save_transform: S,
    ) -> Collection<T>
    where
        T: DocumentValue + Default,
        L: Fn(&[u8]) -> Result<T, TransformError> + Send + Sync + 'static,
        S: Fn(&T) -> Result<Bytes, TransformError> + Send + Sync + 'static,
    {
        let name = store.name().to_string();
        Collection::from_parts(
            Arc::clone(&self.shared),
            name,
            store,
            Arc::new(load_transform),
            Arc::new(save_transform),
            MissingKeyPolicy::UseDefault(T::default()),
        )
    }

    /// Starts building a collection with explicit settings.
    pub fn collection_builder<T: DocumentValue>(&self) -> CollectionBuilder<T> {
        CollectionBuilder::new(Arc::clone(&self.shared))
    }

    /// Creates a snapshot of `parent`, which may be a document or another
    /// snapshot of the same root.
    ///
    /// The snapshot starts as a deep copy of the parent's current value.
    ///
    /// # Errors
    ///
    /// Returns `ForeignHandle` if `parent` belongs to another Mailroom, or
    /// `SnapshotDiscarded` if `parent` is a discarded snapshot.
    pub fn create_snapshot<T, P>(
        &self,
        parent: &P,
        options: SnapshotOptions,
    ) -> MailroomResult<Snapshot<T>>
    where
        T: DocumentValue,
        P: Target<T>,
    {
        let document = parent.document();
        let core = &document.core;
        if !Arc::ptr_eq(&core.collection.shared, &self.shared) {
            return Err(MailroomError::ForeignHandle);
        }

        let parent_node = parent.node();
        let value = match parent_node {
            NodeRef::Document(_) => core.current().0,
            NodeRef::Snapshot(id) => core.snapshots.read().value(id)?.clone(),
        };

        let id = self.shared.next_snapshot_id();
        let depth = core
            .snapshots
            .write()
            .insert(id, parent_node, value, options.update_callback)?;

        self.shared.stats.record_snapshot_created();
        debug!(snapshot = %id, parent = %parent_node, depth, key = %core.key, "snapshot created");

        Ok(Snapshot::new(id, document.clone()))
    }

    /// Applies every queued action list and commits each touched root.
    ///
    /// The call fails as a whole only when validation fails, before any lock
    /// is taken or any write issued. After that, each root commits or fails
    /// on its own and the report says which; roots that committed are never
    /// rolled back because another root failed.
    ///
    /// # Errors
    ///
    /// `ForeignHandle`, `SnapshotDiscarded`, or `NotALeaf` when validation
    /// fails.
    pub async fn run_transaction(
        &self,
        transaction: Transaction,
    ) -> MailroomResult<TransactionReport> {
        let roots = transaction.into_roots();
        for root in &roots {
            root.validate(&self.shared)?;
        }

        let id = self.shared.next_transaction_id();
        let started = Instant::now();
        self.shared.stats.record_transaction();
        debug!(txn = %id, roots = roots.len(), "transaction started");

        let mut report = TransactionReport::new(id);
        for root in roots {
            match root.commit(Arc::clone(&self.shared)).await {
                Ok(commit) => report.committed.push(commit),
                Err(failure) => report.failed.push(failure),
            }
        }
        report.duration = started.elapsed();

        info!(
            txn = %id,
            committed = report.committed_count(),
            failed = report.failed_count(),
            elapsed_ms = report.duration.as_millis() as u64,
            "transaction finished"
        );
        Ok(report)
    }
}

impl Default for Mailroom {
    fn default() -> Self {
        Self::new(MailroomOptions::default())
    }
}

impl fmt::Debug for Mailroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailroom")
            .field("options", &self.shared.options)
            .finish()
    }
}
