//! Transaction outcomes.

use crate::error::MailroomError;
use crate::types::{DocumentId, TransactionId};
use mailroom_store::VersionToken;
use std::fmt;
use std::time::Duration;

/// Identifies a root document in a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootRef {
    /// The document.
    pub document: DocumentId,
    /// Name of the document's collection.
    pub collection: String,
    /// The document's store key.
    pub key: String,
}

impl fmt::Display for RootRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}

/// A root that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCommit {
    /// Which root.
    pub root: RootRef,
    /// Version token returned by the store.
    pub version: VersionToken,
    /// Conditional writes issued, including transient failures and
    /// conflicts.
    pub write_attempts: u32,
    /// Version conflicts that forced a reload.
    pub conflicts: u32,
}

/// A root that gave up.
///
/// Its cached value is whatever it was before the call, or the freshly
/// reloaded value if a conflict forced a reload.
#[derive(Debug)]
pub struct RootFailure {
    /// Which root.
    pub root: RootRef,
    /// Why it failed.
    pub error: MailroomError,
}

/// Result of [`Mailroom::run_transaction`](crate::Mailroom::run_transaction).
#[derive(Debug)]
pub struct TransactionReport {
    /// Transaction ID, for correlating logs.
    pub id: TransactionId,
    /// Roots written, in commit order.
    pub committed: Vec<RootCommit>,
    /// Roots that failed, in commit order.
    pub failed: Vec<RootFailure>,
    /// Wall time spent committing.
    pub duration: Duration,
}

impl TransactionReport {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            committed: Vec::new(),
            failed: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Number of roots that committed.
    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }

    /// Number of roots that failed.
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Returns true if every root committed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns the commit record for `document`, if it committed.
    pub fn commit_for(&self, document: DocumentId) -> Option<&RootCommit> {
        self.committed.iter().find(|c| c.root.document == document)
    }

    /// Returns the failure record for `document`, if it failed.
    pub fn failure_for(&self, document: DocumentId) -> Option<&RootFailure> {
        self.failed.iter().find(|f| f.root.document == document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(id: u64, key: &str) -> RootRef {
        RootRef {
            document: DocumentId::new(id),
            collection: "players".into(),
            key: key.into(),
        }
    }

    #[test]
    fn report_lookup() {
        let mut report = TransactionReport::new(TransactionId::new(1));
        report.committed.push(RootCommit {
            root: root(1, "a"),
            version: VersionToken::new(4),
            write_attempts: 1,
            conflicts: 0,
        });
        report.failed.push(RootFailure {
            root: root(2, "b"),
            error: MailroomError::ForeignHandle,
        });

        assert_eq!(report.committed_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.is_complete());
        assert!(report.commit_for(DocumentId::new(1)).is_some());
        assert!(report.failure_for(DocumentId::new(1)).is_none());
        assert!(report.failure_for(DocumentId::new(2)).is_some());
    }

    #[test]
    fn root_display() {
        assert_eq!(root(1, "alice").to_string(), "players/alice");
    }
}
