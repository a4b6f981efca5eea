//! Building transactions.

use super::report::{RootCommit, RootFailure, RootRef};
use crate::action::Action;
use crate::document::Document;
use crate::error::{MailroomError, MailroomResult};
use crate::mailroom::Shared;
use crate::snapshot::Snapshot;
use crate::types::{DocumentId, DocumentValue, NodeRef, Target};
use async_trait::async_trait;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Work queued against one target.
pub(super) struct TargetBatch<T> {
    pub(super) node: NodeRef,
    pub(super) actions: Vec<Action<T>>,
    /// Keeps a snapshot target from being released while queued.
    _retained: Option<Snapshot<T>>,
}

/// Every target of one transaction that shares a root document.
pub(crate) struct RootBatch<T> {
    pub(super) document: Document<T>,
    pub(super) targets: Vec<TargetBatch<T>>,
}

impl<T: DocumentValue> RootBatch<T> {
    fn new(document: Document<T>) -> Self {
        Self {
            document,
            targets: Vec::new(),
        }
    }

    fn push<H: Target<T>>(&mut self, target: &H, actions: impl IntoIterator<Item = Action<T>>) {
        let node = target.node();
        match self.targets.iter_mut().find(|queued| queued.node == node) {
            Some(queued) => queued.actions.extend(actions),
            None => self.targets.push(TargetBatch {
                node,
                actions: actions.into_iter().collect(),
                _retained: target.retain(),
            }),
        }
    }

    pub(super) fn root_ref(&self) -> RootRef {
        let core = &self.document.core;
        RootRef {
            document: core.id,
            collection: core.collection.name.clone(),
            key: core.key.clone(),
        }
    }
}

/// A type-erased [`RootBatch`], so one transaction can span collections of
/// different value types.
#[async_trait]
pub(crate) trait PendingRoot: Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn document_id(&self) -> DocumentId;

    fn target_count(&self) -> usize;

    /// Checks ownership and snapshot liveness without side effects.
    fn validate(&self, shared: &Arc<Shared>) -> MailroomResult<()>;

    /// Runs the commit engine for this root.
    async fn commit(self: Box<Self>, shared: Arc<Shared>) -> Result<RootCommit, RootFailure>;
}

impl<T: DocumentValue> RootBatch<T> {
    pub(super) fn check(&self, shared: &Arc<Shared>) -> MailroomResult<()> {
        if !Arc::ptr_eq(&self.document.core.collection.shared, shared) {
            return Err(MailroomError::ForeignHandle);
        }

        let arena = self.document.core.snapshots.read();
        for target in &self.targets {
            if let NodeRef::Snapshot(id) = target.node {
                if !arena.is_leaf(id)? {
                    return Err(MailroomError::NotALeaf { id });
                }
            }
        }
        Ok(())
    }

    pub(super) fn len(&self) -> usize {
        self.targets.len()
    }
}

type RootKey = (DocumentId, usize);

/// A set of action lists keyed by target.
///
/// Targets may be documents or leaf snapshots from any collection of the
/// same [`Mailroom`](crate::Mailroom). Pushing to a target that already has
/// actions appends to its list.
///
/// ```rust
/// use mailroom_core::{Action, Mailroom, Transaction};
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// # use mailroom_core::codec::{cbor_load, cbor_save};
/// # use mailroom_store::InMemoryStore;
/// # use std::sync::Arc;
/// let mailroom = Mailroom::default();
/// let scores = mailroom.create_collection::<i64, _, _>(
///     Arc::new(InMemoryStore::new()),
///     cbor_load::<i64>,
///     cbor_save::<i64>,
/// );
/// let doc = scores.document("alice").await.unwrap();
///
/// let mut txn = Transaction::new();
/// txn.push(&doc, [Action::infallible("add 5", |n: &mut i64| *n += 5)]);
/// txn.push(&doc, [Action::infallible("add 3", |n: &mut i64| *n += 3)]);
///
/// let report = mailroom.run_transaction(txn).await.unwrap();
/// assert_eq!(report.committed_count(), 1);
/// assert_eq!(doc.value(), 8);
/// # });
/// ```
#[derive(Default)]
pub struct Transaction {
    roots: BTreeMap<RootKey, Box<dyn PendingRoot>>,
}

impl Transaction {
    /// Creates an empty transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `actions` against `target`.
    pub fn push<T, H>(
        &mut self,
        target: &H,
        actions: impl IntoIterator<Item = Action<T>>,
    ) -> &mut Self
    where
        T: DocumentValue,
        H: Target<T>,
    {
        let document = target.document();
        // The allocation address tells apart documents of different
        // Mailroom instances that happen to share an ID.
        let key = (document.id(), Arc::as_ptr(&document.core) as usize);

        let root = self
            .roots
            .entry(key)
            .or_insert_with(|| Box::new(RootBatch::new(document.clone())));

        // The key pins the document's allocation, so its value type is fixed.
        let batch = root.as_any_mut().downcast_mut::<RootBatch<T>>();
        debug_assert!(batch.is_some(), "root batch value type mismatch");
        if let Some(batch) = batch {
            batch.push(target, actions);
        }
        self
    }

    /// Builder-style [`push`](Self::push).
    #[must_use]
    pub fn with<T, H>(mut self, target: &H, actions: impl IntoIterator<Item = Action<T>>) -> Self
    where
        T: DocumentValue,
        H: Target<T>,
    {
        self.push(target, actions);
        self
    }

    /// Returns the number of distinct root documents touched.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Returns the number of distinct targets.
    pub fn target_count(&self) -> usize {
        self.roots.values().map(|root| root.target_count()).sum()
    }

    /// Returns true if nothing was pushed.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Splits into per-root batches in commit order.
    pub(crate) fn into_roots(self) -> Vec<Box<dyn PendingRoot>> {
        self.roots.into_values().collect()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("roots", &self.root_count())
            .field("targets", &self.target_count())
            .finish()
    }
}
