//! Test fixtures and Mailroom helpers.
//!
//! `Tally` is a small serde value used throughout the test suites: a counter
//! plus a log of the actions applied to it, so tests can assert both the
//! result and the order that produced it.

use mailroom_core::codec::{cbor_load, cbor_save};
use mailroom_core::{
    Action, ActionError, Collection, Document, Mailroom, MailroomOptions, RetryConfig, Target,
    Transaction, TransactionReport, VersionToken,
};
use mailroom_store::InMemoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Counter value with an action log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Running count.
    pub count: i64,
    /// Labels of applied actions, oldest first.
    pub log: Vec<String>,
}

impl Tally {
    /// Creates a tally with the given count and an empty log.
    pub fn new(count: i64) -> Self {
        Self {
            count,
            log: Vec::new(),
        }
    }
}

/// Adds `n` and logs `+n`.
pub fn add(n: i64) -> Action<Tally> {
    Action::infallible(format!("add {n}"), move |t: &mut Tally| {
        t.count += n;
        t.log.push(format!("+{n}"));
    })
}

/// Overwrites the count and logs `=n`.
pub fn set(n: i64) -> Action<Tally> {
    Action::infallible(format!("set {n}"), move |t: &mut Tally| {
        t.count = n;
        t.log.push(format!("={n}"));
    })
}

/// Logs `tag` without touching the count.
pub fn note(tag: &str) -> Action<Tally> {
    let tag = tag.to_string();
    Action::infallible(format!("note {tag}"), move |t: &mut Tally| {
        t.log.push(tag.clone());
    })
}

/// Always fails with `message`.
pub fn fail(message: &str) -> Action<Tally> {
    let message = message.to_string();
    Action::new("fail", move |_: &mut Tally| Err(ActionError::new(message.clone())))
}

/// Subtracts `n`, refusing to go below zero.
pub fn withdraw(n: i64) -> Action<Tally> {
    Action::new(format!("withdraw {n}"), move |t: &mut Tally| {
        if t.count < n {
            return Err(ActionError::new(format!("insufficient: {} < {n}", t.count)));
        }
        t.count -= n;
        t.log.push(format!("-{n}"));
        Ok(())
    })
}

/// Options with millisecond backoff and no jitter, for fast tests.
pub fn fast_options() -> MailroomOptions {
    MailroomOptions::new().with_write_retry(
        RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
            .with_jitter(false),
    )
}

/// A Mailroom wired to one in-memory store holding `Tally` values.
pub struct TestMailroom {
    /// The Mailroom under test.
    pub mailroom: Mailroom,
    /// The backing store, for fault injection and inspection.
    pub store: Arc<InMemoryStore>,
    /// The `tallies` collection.
    pub tallies: Collection<Tally>,
}

impl TestMailroom {
    /// Creates an environment with [`fast_options`].
    pub fn new() -> Self {
        Self::with_parts(fast_options(), InMemoryStore::named("tallies"))
    }

    /// Creates an environment with custom options.
    pub fn with_options(options: MailroomOptions) -> Self {
        Self::with_parts(options, InMemoryStore::named("tallies"))
    }

    /// Creates an environment over a preconfigured store.
    pub fn with_store(store: InMemoryStore) -> Self {
        Self::with_parts(fast_options(), store)
    }

    /// Creates an environment from options and a store.
    pub fn with_parts(options: MailroomOptions, store: InMemoryStore) -> Self {
        let mailroom = Mailroom::new(options);
        let store = Arc::new(store);
        let tallies = mailroom.create_collection(
            Arc::clone(&store) as Arc<dyn mailroom_core::DataStore>,
            cbor_load::<Tally>,
            cbor_save::<Tally>,
        );
        Self {
            mailroom,
            store,
            tallies,
        }
    }

    /// Acquires the document for `key`, panicking on failure.
    pub async fn document(&self, key: &str) -> Document<Tally> {
        self.tallies
            .document(key)
            .await
            .expect("Failed to acquire document")
    }

    /// Writes `tally` directly into the store, as another client would.
    pub fn seed(&self, key: &str, tally: &Tally) -> VersionToken {
        let raw = cbor_save(tally).expect("Failed to encode tally");
        self.store.put_external(key, raw)
    }

    /// Decodes the stored value of `key`, if any.
    pub fn stored(&self, key: &str) -> Option<Tally> {
        self.store
            .peek(key)
            .map(|stored| cbor_load(&stored.raw).expect("Failed to decode stored tally"))
    }

    /// Runs a single-target transaction, panicking if validation fails.
    pub async fn commit<H: Target<Tally>>(
        &self,
        target: &H,
        actions: Vec<Action<Tally>>,
    ) -> TransactionReport {
        self.mailroom
            .run_transaction(Transaction::new().with(target, actions))
            .await
            .expect("Transaction failed validation")
    }
}

impl Default for TestMailroom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestMailroom {
    type Target = Mailroom;

    fn deref(&self) -> &Self::Target {
        &self.mailroom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailroom_core::apply_actions;

    #[test]
    fn fixture_actions() {
        let mut tally = Tally::new(10);
        apply_actions(&mut tally, &[add(5), note("x"), set(2), withdraw(1)]).unwrap();
        assert_eq!(tally.count, 1);
        assert_eq!(tally.log, vec!["+5", "x", "=2", "-1"]);
    }

    #[test]
    fn withdraw_refuses_overdraft() {
        let mut tally = Tally::new(3);
        let err = apply_actions(&mut tally, &[withdraw(5)]).unwrap_err();
        assert!(err.to_string().contains("insufficient"));
    }

    #[tokio::test]
    async fn seed_and_read_back() {
        let env = TestMailroom::new();
        env.seed("k", &Tally::new(4));
        let doc = env.document("k").await;
        assert_eq!(doc.value().count, 4);
        assert_eq!(env.stored("k"), Some(Tally::new(4)));
        assert_eq!(env.tallies.name(), "tallies");
    }

    #[tokio::test]
    async fn commit_helper() {
        let env = TestMailroom::new();
        let doc = env.document("k").await;
        let report = env.commit(&doc, vec![add(1)]).await;
        assert!(report.is_complete());
        assert_eq!(env.stored("k").unwrap().count, 1);
        assert_eq!(env.stats().roots_committed, 1);
    }
}
