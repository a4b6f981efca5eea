//! # Mailroom Store
//!
//! Backing-store contract for Mailroom.
//!
//! Mailroom never talks to a concrete database. It talks to a [`DataStore`]:
//! a remote, eventually-consistent key-value service that stores **opaque
//! bytes** under string keys and stamps every write with a [`VersionToken`].
//!
//! ## Design Principles
//!
//! - Stores do not interpret the bytes they hold; collections own the
//!   load/save transforms
//! - Writes are conditional on the caller's last-known version token
//! - Every call may suspend for network latency and may fail transiently
//! - Stores must be `Send + Sync` so one handle can serve many transactions
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing, with latency and fault injection
//!
//! ## Example
//!
//! ```rust
//! use mailroom_store::{DataStore, InMemoryStore};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = InMemoryStore::new();
//! let v1 = store.set("player:1", b"hello".to_vec().into(), None).await.unwrap();
//! let stored = store.get("player:1").await.unwrap().unwrap();
//! assert_eq!(stored.version, v1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod version;

pub use backend::DataStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use version::{StoredValue, VersionToken};
