//! Core type definitions for Mailroom.

use crate::document::Document;
use crate::snapshot::Snapshot;
use std::fmt;

/// Values a collection can hold.
///
/// Snapshots deep-copy their parent's value with `Clone`, and values cross
/// task boundaries while commits are in flight.
pub trait DocumentValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> DocumentValue for T {}

/// Identifier for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionId(pub u32);

impl CollectionId {
    /// Creates a new collection ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col:{}", self.0)
    }
}

/// Identifier for a document, unique within one [`Mailroom`](crate::Mailroom).
///
/// Document IDs are allocated in acquisition order; roots touched by one
/// transaction commit in ascending ID order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// Creates a new document ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Identifier for a snapshot.
///
/// Snapshot IDs are monotonically increasing and never reused, so they
/// double as the creation sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(pub u64);

impl SnapshotId {
    /// Creates a new snapshot ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snap:{}", self.0)
    }
}

/// Identifier for a transaction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// A node of the document/snapshot forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// A document root.
    Document(DocumentId),
    /// A snapshot below some document root.
    Snapshot(SnapshotId),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Document(id) => id.fmt(f),
            NodeRef::Snapshot(id) => id.fmt(f),
        }
    }
}

pub(crate) mod sealed {
    use crate::snapshot::Snapshot;

    pub trait Sealed<T> {
        /// The snapshot handle a queued transaction keeps alive, if any.
        fn retain(&self) -> Option<Snapshot<T>>;
    }
}

impl<T> sealed::Sealed<T> for Document<T> {
    fn retain(&self) -> Option<Snapshot<T>> {
        None
    }
}

impl<T> sealed::Sealed<T> for Snapshot<T> {
    fn retain(&self) -> Option<Snapshot<T>> {
        Some(self.clone())
    }
}

/// Something actions can be queued against and snapshots can descend from:
/// a [`Document`] or a [`Snapshot`].
pub trait Target<T>: sealed::Sealed<T> {
    /// Returns the document at the root of this node's chain.
    fn document(&self) -> &Document<T>;

    /// Returns this node's position in the forest.
    fn node(&self) -> NodeRef;
}

impl<T> Target<T> for Document<T> {
    fn document(&self) -> &Document<T> {
        self
    }

    fn node(&self) -> NodeRef {
        NodeRef::Document(self.core.id)
    }
}

impl<T> Target<T> for Snapshot<T> {
    fn document(&self) -> &Document<T> {
        Snapshot::document(self)
    }

    fn node(&self) -> NodeRef {
        NodeRef::Snapshot(self.id())
    }
}
