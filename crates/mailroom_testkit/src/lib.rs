//! # Mailroom Testkit
//!
//! Test utilities for Mailroom.
//!
//! This crate provides:
//! - The `Tally` fixture value with ready-made actions
//! - `TestMailroom`, a Mailroom wired to an in-memory store
//! - Property-based generators using proptest
//! - A concurrent contention stress runner
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mailroom_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn adds_up() {
//!     let env = TestMailroom::new();
//!     let doc = env.document("alice").await;
//!     env.commit(&doc, vec![add(5), add(3)]).await;
//!     assert_eq!(env.stored("alice").unwrap().count, 8);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
