//! Snapshots: local working copies branching off a document.
//!
//! Every document keeps an arena of the snapshots below it. A snapshot's
//! parent is either the document itself or another snapshot of the same
//! document, so each root forms a tree. Snapshots are never written to the
//! store; a transaction that targets a snapshot folds its actions into every
//! ancestor up to the document, and only the document is committed.
//!
//! The arena does not keep snapshots alive. When the last handle to a
//! snapshot drops, its slot is released: it stops receiving callbacks and is
//! removed as soon as no live descendant needs it for folding.

use crate::action::{apply_actions, Action};
use crate::document::{Document, DocumentCore};
use crate::error::{MailroomError, MailroomResult};
use crate::types::{DocumentValue, NodeRef, SnapshotId};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback fired when a snapshot's root document receives a new value.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Options for [`Mailroom::create_snapshot`](crate::Mailroom::create_snapshot).
#[derive(Clone, Default)]
pub struct SnapshotOptions {
    pub(crate) update_callback: Option<UpdateCallback>,
}

impl SnapshotOptions {
    /// Creates options with no callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls `callback` when a commit or an explicit
    /// [`Document::reload`] changes the root document's stored bytes.
    ///
    /// The callback lives as long as the snapshot's slot. Capture a
    /// [`WeakSnapshot`] rather than a [`Snapshot`], or the snapshot stays
    /// alive until it is discarded.
    #[must_use]
    pub fn on_update<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.update_callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for SnapshotOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotOptions")
            .field("update_callback", &self.update_callback.is_some())
            .finish()
    }
}

pub(crate) struct SnapshotSlot<T> {
    parent: NodeRef,
    depth: usize,
    value: T,
    children: Vec<SnapshotId>,
    update_callback: Option<UpdateCallback>,
    /// Set once every handle has dropped.
    released: bool,
}

/// Slots taken out of an arena. Dropping them may drop user callbacks and
/// the handles those captured, so callers drop them after unlocking.
pub(crate) type Evicted<T> = Vec<SnapshotSlot<T>>;

/// The snapshots of one document, keyed by creation order.
pub(crate) struct SnapshotArena<T> {
    slots: BTreeMap<SnapshotId, SnapshotSlot<T>>,
    roots: Vec<SnapshotId>,
}

impl<T> SnapshotArena<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            roots: Vec::new(),
        }
    }

    /// Adds a snapshot below `parent` and returns its depth.
    pub(crate) fn insert(
        &mut self,
        id: SnapshotId,
        parent: NodeRef,
        value: T,
        update_callback: Option<UpdateCallback>,
    ) -> MailroomResult<usize> {
        let depth = match parent {
            NodeRef::Document(_) => {
                self.roots.push(id);
                1
            }
            NodeRef::Snapshot(parent_id) => {
                let slot = self
                    .slots
                    .get_mut(&parent_id)
                    .ok_or(MailroomError::SnapshotDiscarded { id: parent_id })?;
                slot.children.push(id);
                slot.depth + 1
            }
        };

        self.slots.insert(
            id,
            SnapshotSlot {
                parent,
                depth,
                value,
                children: Vec::new(),
                update_callback,
                released: false,
            },
        );
        Ok(depth)
    }

    fn slot(&self, id: SnapshotId) -> MailroomResult<&SnapshotSlot<T>> {
        self.slots
            .get(&id)
            .ok_or(MailroomError::SnapshotDiscarded { id })
    }

    pub(crate) fn contains(&self, id: SnapshotId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Counts snapshots that still have a handle.
    pub(crate) fn len(&self) -> usize {
        self.slots.values().filter(|slot| !slot.released).count()
    }

    pub(crate) fn value(&self, id: SnapshotId) -> MailroomResult<&T> {
        self.slot(id).map(|slot| &slot.value)
    }

    pub(crate) fn parent(&self, id: SnapshotId) -> MailroomResult<NodeRef> {
        self.slot(id).map(|slot| slot.parent)
    }

    pub(crate) fn depth(&self, id: SnapshotId) -> MailroomResult<usize> {
        self.slot(id).map(|slot| slot.depth)
    }

    pub(crate) fn is_leaf(&self, id: SnapshotId) -> MailroomResult<bool> {
        self.slot(id).map(|slot| slot.children.is_empty())
    }

    /// Replaces a snapshot's value. Returns false if it was discarded.
    pub(crate) fn set_value(&mut self, id: SnapshotId, value: T) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    /// Returns `id` followed by its snapshot ancestors, nearest first. The
    /// document itself is not included.
    pub(crate) fn chain(&self, id: SnapshotId) -> MailroomResult<Vec<SnapshotId>> {
        let mut chain = Vec::new();
        let mut current = id;
        loop {
            let slot = self.slot(current)?;
            chain.push(current);
            match slot.parent {
                NodeRef::Snapshot(parent) => current = parent,
                NodeRef::Document(_) => return Ok(chain),
            }
        }
    }

    /// Removes a snapshot and all its descendants. Returns how many of the
    /// removed snapshots still had handles, and the evicted slots.
    pub(crate) fn remove_subtree(&mut self, id: SnapshotId) -> (usize, Evicted<T>) {
        let Some(slot) = self.detach(id) else {
            return (0, Vec::new());
        };

        let parent = slot.parent;
        let mut pending = slot.children.clone();
        let mut evicted = vec![slot];
        while let Some(child) = pending.pop() {
            if let Some(slot) = self.slots.remove(&child) {
                pending.extend(slot.children.iter().copied());
                evicted.push(slot);
            }
        }
        let removed = evicted.iter().filter(|slot| !slot.released).count();

        if let NodeRef::Snapshot(parent) = parent {
            evicted.extend(self.prune(parent));
        }
        (removed, evicted)
    }

    /// Marks a snapshot as having no handles left, then removes it and any
    /// released ancestors that no longer have children.
    pub(crate) fn release(&mut self, id: SnapshotId) -> Evicted<T> {
        match self.slots.get_mut(&id) {
            Some(slot) => slot.released = true,
            None => return Vec::new(),
        }
        self.prune(id)
    }

    fn prune(&mut self, mut id: SnapshotId) -> Evicted<T> {
        let mut evicted = Vec::new();
        loop {
            let prunable = self
                .slots
                .get(&id)
                .is_some_and(|slot| slot.released && slot.children.is_empty());
            if !prunable {
                return evicted;
            }
            let Some(slot) = self.detach(id) else {
                return evicted;
            };
            let parent = slot.parent;
            evicted.push(slot);
            match parent {
                NodeRef::Snapshot(parent) => id = parent,
                NodeRef::Document(_) => return evicted,
            }
        }
    }

    /// Takes a slot out and unlinks it from its parent.
    fn detach(&mut self, id: SnapshotId) -> Option<SnapshotSlot<T>> {
        let slot = self.slots.remove(&id)?;
        match slot.parent {
            NodeRef::Document(_) => self.roots.retain(|child| *child != id),
            NodeRef::Snapshot(parent) => {
                if let Some(parent) = self.slots.get_mut(&parent) {
                    parent.children.retain(|child| *child != id);
                }
            }
        }
        Some(slot)
    }

    /// Returns the callbacks of snapshots with live handles, in creation
    /// order.
    pub(crate) fn callbacks(&self) -> Vec<UpdateCallback> {
        self.slots
            .values()
            .filter(|slot| !slot.released)
            .filter_map(|slot| slot.update_callback.clone())
            .collect()
    }
}

/// A local working copy of a document or of another snapshot.
///
/// Snapshot values change only through [`Snapshot::apply`],
/// [`Snapshot::refresh`], and transactions. Discarding a snapshot removes
/// its descendants too; every later call on a discarded handle fails with
/// [`MailroomError::SnapshotDiscarded`].
///
/// Clones share one handle. Dropping the last clone releases the snapshot:
/// its callback stops firing and it no longer counts as a child of its
/// parent, though any live descendants keep folding through it.
pub struct Snapshot<T> {
    handle: Arc<SnapshotHandle<T>>,
}

struct SnapshotHandle<T> {
    id: SnapshotId,
    document: Document<T>,
}

impl<T> Drop for SnapshotHandle<T> {
    fn drop(&mut self) {
        let evicted = self.document.core.snapshots.write().release(self.id);
        drop(evicted);
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.handle.id)
            .field("document", &self.core().id)
            .finish()
    }
}

impl<T> Snapshot<T> {
    pub(crate) fn new(id: SnapshotId, document: Document<T>) -> Self {
        Self {
            handle: Arc::new(SnapshotHandle { id, document }),
        }
    }

    /// Returns the snapshot ID.
    pub fn id(&self) -> SnapshotId {
        self.handle.id
    }

    /// Returns the root document.
    pub fn document(&self) -> &Document<T> {
        &self.handle.document
    }

    fn core(&self) -> &DocumentCore<T> {
        &self.handle.document.core
    }

    /// Creates a handle that does not keep the snapshot alive.
    pub fn downgrade(&self) -> WeakSnapshot<T> {
        WeakSnapshot {
            handle: Arc::downgrade(&self.handle),
        }
    }
}

/// A non-owning [`Snapshot`] handle, for use inside update callbacks.
pub struct WeakSnapshot<T> {
    handle: Weak<SnapshotHandle<T>>,
}

impl<T> WeakSnapshot<T> {
    /// Returns the snapshot if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<Snapshot<T>> {
        self.handle.upgrade().map(|handle| Snapshot { handle })
    }
}

impl<T> Clone for WeakSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            handle: Weak::clone(&self.handle),
        }
    }
}

impl<T> fmt::Debug for WeakSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakSnapshot")
            .field("alive", &(self.handle.strong_count() > 0))
            .finish()
    }
}

impl<T: DocumentValue> Snapshot<T> {
    /// Returns the parent node.
    pub fn parent(&self) -> MailroomResult<NodeRef> {
        self.core().snapshots.read().parent(self.handle.id)
    }

    /// Returns the number of hops to the root document (1 for a direct
    /// child).
    pub fn depth(&self) -> MailroomResult<usize> {
        self.core().snapshots.read().depth(self.handle.id)
    }

    /// Returns a copy of the snapshot's value.
    pub fn value(&self) -> MailroomResult<T> {
        self.core()
            .snapshots
            .read()
            .value(self.handle.id)
            .map(Clone::clone)
    }

    /// Returns true once this snapshot or one of its ancestors was
    /// discarded.
    pub fn is_discarded(&self) -> bool {
        !self.core().snapshots.read().contains(self.handle.id)
    }

    /// Returns true if no snapshot descends from this one.
    pub fn is_leaf(&self) -> MailroomResult<bool> {
        self.core().snapshots.read().is_leaf(self.handle.id)
    }

    /// Removes this snapshot and all its descendants from the root.
    ///
    /// Returns how many snapshots were removed; zero if already discarded.
    pub fn discard(&self) -> usize {
        let core = self.core();
        let (removed, evicted) = core.snapshots.write().remove_subtree(self.handle.id);
        drop(evicted);
        if removed > 0 {
            let shared = &core.collection.shared;
            shared.stats.record_snapshots_discarded(removed as u64);
            debug!(snapshot = %self.handle.id, removed, "snapshot discarded");
        }
        removed
    }

    /// Applies `actions` to this snapshot only.
    ///
    /// Nothing is written to the store and ancestors are untouched. If any
    /// action fails the snapshot keeps its previous value.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotDiscarded` or the failing action's `ActionFailed`.
    pub async fn apply(&self, actions: impl IntoIterator<Item = Action<T>>) -> MailroomResult<()> {
        let actions: Vec<Action<T>> = actions.into_iter().collect();
        let _guard = self.core().commit_lock.lock().await;

        let mut working = self.value()?;
        apply_actions(&mut working, &actions)?;

        if self
            .core()
            .snapshots
            .write()
            .set_value(self.handle.id, working)
        {
            Ok(())
        } else {
            Err(MailroomError::SnapshotDiscarded { id: self.handle.id })
        }
    }

    /// Re-copies the parent's current value into this snapshot, dropping
    /// any local edits.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotDiscarded` if this snapshot is gone.
    pub async fn refresh(&self) -> MailroomResult<()> {
        let _guard = self.core().commit_lock.lock().await;

        let parent = self.parent()?;
        let value = match parent {
            NodeRef::Document(_) => self.handle.document.value(),
            NodeRef::Snapshot(parent_id) => self
                .core()
                .snapshots
                .read()
                .value(parent_id)
                .map(Clone::clone)?,
        };

        if self
            .core()
            .snapshots
            .write()
            .set_value(self.handle.id, value)
        {
            Ok(())
        } else {
            Err(MailroomError::SnapshotDiscarded { id: self.handle.id })
        }
    }
}
