//! # Mailroom Core
//!
//! Transactional mutation layer over remote, versioned key-value stores.
//!
//! This crate provides:
//! - Collections binding a [`DataStore`] to load/save transforms
//! - Documents caching one key's value and version token
//! - Snapshots: local working copies that chain off documents
//! - Labelled actions and the transaction engine that commits them
//!
//! ## Commit model
//!
//! Every transaction is split by root document. Each root commits on its
//! own, under its own async lock:
//! 1. Actions are applied to working copies, never to cached values
//! 2. The root is written conditioned on its cached version token
//! 3. A version conflict reloads the root and re-applies the actions
//! 4. A transient failure backs off and retries the same write
//!
//! ## Key Invariants
//!
//! - Actions on one target run in the order they were pushed
//! - Snapshot actions fold into every ancestor and into the root
//! - Only roots are persisted; snapshots are local
//! - A failed root never rolls back a committed one
//! - Two commits on the same root never overlap

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
pub mod codec;
mod collection;
mod config;
mod document;
mod error;
mod mailroom;
mod snapshot;
mod stats;
mod transaction;
mod types;

pub use action::{apply_actions, Action};
pub use collection::{
    Collection, CollectionBuilder, LoadTransform, MissingKeyPolicy, SaveTransform,
};
pub use config::{MailroomOptions, RetryConfig, DEFAULT_MAX_CONFLICT_RETRIES};
pub use document::Document;
pub use error::{ActionError, MailroomError, MailroomResult, TransformError};
pub use mailroom::Mailroom;
pub use snapshot::{Snapshot, SnapshotOptions, UpdateCallback, WeakSnapshot};
pub use stats::{MailroomStats, StatsSnapshot};
pub use transaction::{
    CommitState, RootCommit, RootFailure, RootRef, Transaction, TransactionReport,
};
pub use types::{CollectionId, DocumentId, DocumentValue, NodeRef, SnapshotId, Target, TransactionId};

pub use mailroom_store::{DataStore, StoreError, StoreResult, VersionToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
