//! Transactions and the commit engine.
//!
//! A [`Transaction`] groups action lists by target. Running it groups the
//! targets by root document, then commits each root independently:
//!
//! 1. Take the root's commit lock.
//! 2. Reload the root if an earlier write left it dirty.
//! 3. Apply every target's actions to fresh working copies of the target,
//!    its snapshot ancestors, and the root.
//! 4. Write the root conditioned on the cached version token.
//! 5. On a version conflict, reload and go back to 3. On a transient
//!    failure, back off and repeat 4. Both loops are bounded.
//! 6. On success install the new root value and snapshot copies. Update
//!    callbacks fire if the written bytes differ from the cached ones the
//!    commit started from. Reloads inside the loop stay silent.
//!
//! A root's outcome never affects another root's commit. The caller learns
//! about each one through the returned [`TransactionReport`].

mod builder;
mod commit;
mod report;
mod state;

pub use builder::Transaction;
pub use report::{RootCommit, RootFailure, RootRef, TransactionReport};
pub use state::CommitState;

use crate::config::RetryConfig;
use mailroom_store::StoreResult;
use std::future::Future;
use tracing::warn;

/// Runs `op` until it succeeds, fails with a non-retryable error, or uses up
/// the policy's attempts.
pub(crate) async fn retry_transient<F, Fut, R>(retry: &RetryConfig, mut op: F) -> StoreResult<R>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<R>>,
{
    let attempts = retry.attempts();
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                attempt += 1;
                warn!(attempt, error = %e, "transient store failure, retrying");
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
