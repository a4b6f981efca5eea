//! Engine statistics.
//!
//! Counters are updated by the commit engine and by document acquisition and
//! can be read at any time through [`Mailroom::stats`](crate::Mailroom::stats).
//!
//! ```rust
//! use mailroom_core::Mailroom;
//!
//! let mailroom = Mailroom::default();
//! let stats = mailroom.stats();
//! assert_eq!(stats.transactions, 0);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live engine counters.
#[derive(Debug, Default)]
pub struct MailroomStats {
    transactions: AtomicU64,
    roots_committed: AtomicU64,
    roots_failed: AtomicU64,
    version_conflicts: AtomicU64,
    transient_retries: AtomicU64,
    documents_loaded: AtomicU64,
    document_reloads: AtomicU64,
    snapshots_created: AtomicU64,
    snapshots_discarded: AtomicU64,
}

impl MailroomStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transaction(&self) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_root_committed(&self) {
        self.roots_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_root_failed(&self) {
        self.roots_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.version_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transient_retry(&self) {
        self.transient_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_document_loaded(&self) {
        self.documents_loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reload(&self) {
        self.document_reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot_created(&self) {
        self.snapshots_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshots_discarded(&self, count: u64) {
        self.snapshots_discarded.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of `run_transaction` calls that passed validation.
    pub fn transactions(&self) -> u64 {
        self.transactions.load(Ordering::Relaxed)
    }

    /// Returns the number of roots written successfully.
    pub fn roots_committed(&self) -> u64 {
        self.roots_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of roots reported as failed.
    pub fn roots_failed(&self) -> u64 {
        self.roots_failed.load(Ordering::Relaxed)
    }

    /// Returns the number of version conflicts observed.
    ///
    /// Each conflict triggers a reload and a fresh application of the
    /// root's actions.
    pub fn version_conflicts(&self) -> u64 {
        self.version_conflicts.load(Ordering::Relaxed)
    }

    /// Returns the number of transient write failures that were retried or
    /// exhausted.
    pub fn transient_retries(&self) -> u64 {
        self.transient_retries.load(Ordering::Relaxed)
    }

    /// Returns the number of documents created from a store read.
    pub fn documents_loaded(&self) -> u64 {
        self.documents_loaded.load(Ordering::Relaxed)
    }

    /// Returns the number of document reloads.
    pub fn document_reloads(&self) -> u64 {
        self.document_reloads.load(Ordering::Relaxed)
    }

    /// Returns the number of snapshots created.
    pub fn snapshots_created(&self) -> u64 {
        self.snapshots_created.load(Ordering::Relaxed)
    }

    /// Returns the number of snapshots removed, descendants included.
    pub fn snapshots_discarded(&self) -> u64 {
        self.snapshots_discarded.load(Ordering::Relaxed)
    }

    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions: self.transactions(),
            roots_committed: self.roots_committed(),
            roots_failed: self.roots_failed(),
            version_conflicts: self.version_conflicts(),
            transient_retries: self.transient_retries(),
            documents_loaded: self.documents_loaded(),
            document_reloads: self.document_reloads(),
            snapshots_created: self.snapshots_created(),
            snapshots_discarded: self.snapshots_discarded(),
        }
    }
}

/// Plain copy of [`MailroomStats`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Transactions run.
    pub transactions: u64,
    /// Roots committed.
    pub roots_committed: u64,
    /// Roots failed.
    pub roots_failed: u64,
    /// Version conflicts observed.
    pub version_conflicts: u64,
    /// Transient write failures.
    pub transient_retries: u64,
    /// Documents loaded.
    pub documents_loaded: u64,
    /// Document reloads.
    pub document_reloads: u64,
    /// Snapshots created.
    pub snapshots_created: u64,
    /// Snapshots discarded.
    pub snapshots_discarded: u64,
}
