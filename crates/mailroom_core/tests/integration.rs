//! Integration tests for the transaction engine against the in-memory store.

use mailroom_core::codec::{cbor_load, cbor_save};
use mailroom_core::{
    CommitState, DataStore, Mailroom, MailroomError, NodeRef, SnapshotOptions, Transaction,
    WeakSnapshot,
};
use mailroom_store::InMemoryStore;
use mailroom_testkit::prelude::*;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn actions_apply_in_queue_order() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;

    let mut txn = Transaction::new();
    txn.push(&doc, [note("a"), add(5)]);
    txn.push(&doc, [note("b"), add(3)]);
    assert_eq!(txn.root_count(), 1);

    let report = env.run_transaction(txn).await.unwrap();
    assert!(report.is_complete());

    let stored = env.stored("k").unwrap();
    assert_eq!(stored.count, 8);
    assert_eq!(stored.log, vec!["a", "+5", "b", "+3"]);
    assert_eq!(doc.value(), stored);
}

#[tokio::test]
async fn snapshot_targets_apply_before_the_document() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let snap = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();

    let txn = Transaction::new()
        .with(&doc, [note("doc")])
        .with(&snap, [note("snap")]);
    let report = env.run_transaction(txn).await.unwrap();
    assert!(report.is_complete());

    assert_eq!(env.stored("k").unwrap().log, vec!["snap", "doc"]);
    assert_eq!(snap.value().unwrap().log, vec!["snap"]);
}

#[tokio::test]
async fn sibling_snapshots_fold_in_creation_order() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let shared = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();
    let older = env.create_snapshot(&shared, SnapshotOptions::new()).unwrap();
    let newer = env.create_snapshot(&shared, SnapshotOptions::new()).unwrap();

    let txn = Transaction::new()
        .with(&newer, [note("newer")])
        .with(&doc, [note("doc")])
        .with(&older, [note("older")]);
    assert!(env.run_transaction(txn).await.unwrap().is_complete());

    assert_eq!(env.stored("k").unwrap().log, vec!["older", "newer", "doc"]);
    assert_eq!(shared.value().unwrap().log, vec!["older", "newer"]);
    assert_eq!(older.value().unwrap().log, vec!["older"]);
    assert_eq!(newer.value().unwrap().log, vec!["newer"]);
}

#[tokio::test]
async fn roots_commit_in_document_order() {
    let env = TestMailroom::new();
    let first = env.document("first").await;
    let second = env.document("second").await;

    let txn = Transaction::new()
        .with(&second, [add(2)])
        .with(&first, [add(1)]);
    let report = env.run_transaction(txn).await.unwrap();

    let order: Vec<_> = report.committed.iter().map(|c| c.root.document).collect();
    assert_eq!(order, vec![first.id(), second.id()]);
    assert_eq!(report.committed[0].root.to_string(), "tallies/first");
}

// ============================================================================
// Worked example and conflicts
// ============================================================================

#[tokio::test]
async fn commits_the_folded_value() {
    let env = TestMailroom::new();
    let v1 = env.seed("d", &Tally::new(0));
    let doc = env.document("d").await;
    assert_eq!(doc.version(), Some(v1));

    let report = env.commit(&doc, vec![add(5), add(3)]).await;
    let commit = report.commit_for(doc.id()).unwrap();
    assert!(commit.version > v1);
    assert_eq!(commit.conflicts, 0);
    assert_eq!(commit.write_attempts, 1);

    assert_eq!(env.stored("d").unwrap().count, 8);
    assert_eq!(doc.version(), Some(commit.version));
    assert!(!doc.is_dirty());
}

#[tokio::test]
async fn concurrent_bump_reapplies_against_fresh_base() {
    let env = TestMailroom::new();
    env.seed("d", &Tally::new(0));
    let doc = env.document("d").await;

    // Another client writes after we loaded.
    env.seed("d", &Tally::new(10));

    let report = env.commit(&doc, vec![add(5), add(3)]).await;
    let commit = report.commit_for(doc.id()).unwrap();
    assert_eq!(commit.conflicts, 1);
    assert_eq!(commit.write_attempts, 2);

    let stored = env.stored("d").unwrap();
    assert_eq!(stored.count, 18);
    // Reapplied once against the fresh base, not stacked on the stale one.
    assert_eq!(stored.log, vec!["+5", "+3"]);
    assert_eq!(doc.value(), stored);

    let stats = env.stats();
    assert_eq!(stats.version_conflicts, 1);
    assert_eq!(stats.document_reloads, 1);
}

#[tokio::test]
async fn conflicts_within_bound_eventually_commit() {
    let env = TestMailroom::new();
    env.seed("k", &Tally::new(1));
    let doc = env.document("k").await;
    env.store.interfere_next_writes(2);

    let report = env.commit(&doc, vec![add(1)]).await;
    assert!(report.is_complete());
    assert_eq!(report.committed[0].conflicts, 2);
    assert_eq!(env.stored("k").unwrap().count, 2);
    assert_eq!(env.stats().document_reloads, 2);
}

#[tokio::test]
async fn conflict_bound_exhausted() {
    let env = TestMailroom::with_options(fast_options().with_max_conflict_retries(2));
    env.seed("k", &Tally::new(7));
    let doc = env.document("k").await;
    env.store.interfere_next_writes(10);

    let report = env.commit(&doc, vec![add(1)]).await;
    assert_eq!(report.committed_count(), 0);
    let failure = report.failure_for(doc.id()).unwrap();
    assert!(matches!(
        failure.error,
        MailroomError::ConflictRetriesExhausted { attempts: 3, .. }
    ));
    assert!(failure.error.is_retryable());

    // One reload per retried conflict; the final conflict is not retried.
    let stats = env.stats();
    assert_eq!(stats.version_conflicts, 3);
    assert_eq!(stats.document_reloads, 2);
    assert_eq!(stats.roots_failed, 1);

    assert_eq!(env.stored("k").unwrap(), Tally::new(7));
    assert_eq!(env.store.write_count(), 0);
    assert!(doc.is_dirty());
}

#[tokio::test]
async fn same_root_transactions_serialize() {
    let env = TestMailroom::with_store(
        InMemoryStore::named("tallies").with_latency(Duration::from_millis(20)),
    );
    let doc = env.document("k").await;

    let first = env.run_transaction(Transaction::new().with(&doc, [note("one"), add(1)]));
    let second = env.run_transaction(Transaction::new().with(&doc, [note("two"), add(2)]));
    let (first, second) = tokio::join!(first, second);
    assert!(first.unwrap().is_complete());
    assert!(second.unwrap().is_complete());

    let stored = env.stored("k").unwrap();
    assert_eq!(stored.count, 3);
    // The later commit built on the earlier one's value.
    assert_eq!(stored.log.len(), 4);
    assert_eq!(env.stats().version_conflicts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disjoint_roots_do_not_block_each_other() {
    let env = TestMailroom::new();
    let slow_store: Arc<dyn DataStore> =
        Arc::new(InMemoryStore::named("slow").with_latency(Duration::from_millis(500)));
    let slow = env.create_collection(slow_store, cbor_load::<Tally>, cbor_save::<Tally>);

    let slow_doc = slow.document("held").await.unwrap();
    let fast_doc = env.document("free").await;

    let mailroom = env.mailroom.clone();
    let handle = tokio::spawn(async move {
        mailroom
            .run_transaction(Transaction::new().with(&slow_doc, [add(1)]))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast = tokio::time::timeout(
        Duration::from_millis(250),
        env.commit(&fast_doc, vec![add(1)]),
    )
    .await
    .expect("commit on an unrelated root waited for the slow one");
    assert!(fast.is_complete());

    assert!(handle.await.unwrap().unwrap().is_complete());
}

// ============================================================================
// Transient failures
// ============================================================================

#[tokio::test]
async fn transient_write_failures_are_retried() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    env.store.fail_next_writes(2);

    let report = env.commit(&doc, vec![add(4)]).await;
    let commit = report.commit_for(doc.id()).unwrap();
    assert_eq!(commit.write_attempts, 3);
    assert_eq!(commit.conflicts, 0);
    assert_eq!(env.stored("k").unwrap().count, 4);
    assert_eq!(env.stats().transient_retries, 2);
}

#[tokio::test]
async fn transient_exhaustion_leaves_document_dirty() {
    let env = TestMailroom::new();
    env.seed("k", &Tally::new(1));
    let doc = env.document("k").await;
    env.store.fail_next_writes(3);

    let report = env.commit(&doc, vec![add(4)]).await;
    let failure = report.failure_for(doc.id()).unwrap();
    assert!(matches!(
        failure.error,
        MailroomError::TransientRetriesExhausted { attempts: 3, .. }
    ));
    assert!(doc.is_dirty());
    assert_eq!(env.stored("k").unwrap(), Tally::new(1));

    // The next transaction reloads before applying.
    env.seed("k", &Tally::new(40));
    let report = env.commit(&doc, vec![add(2)]).await;
    assert!(report.is_complete());
    assert_eq!(report.committed[0].conflicts, 0);
    assert_eq!(env.stored("k").unwrap().count, 42);
    assert_eq!(env.stats().document_reloads, 1);
    assert!(!doc.is_dirty());
}

#[tokio::test]
async fn unavailable_store_fails_without_retrying() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    env.store.set_unavailable(true);

    let report = env.commit(&doc, vec![add(1)]).await;
    let failure = report.failure_for(doc.id()).unwrap();
    assert!(matches!(failure.error, MailroomError::StoreFailed { .. }));
    assert_eq!(env.store.failure_count(), 1);
    assert_eq!(env.stats().transient_retries, 0);

    env.store.set_unavailable(false);
    assert!(env.commit(&doc, vec![add(1)]).await.is_complete());
    assert_eq!(env.stored("k").unwrap().count, 1);
}

#[tokio::test]
async fn acquisition_surfaces_read_failures() {
    let env = TestMailroom::new();
    env.store.fail_next_reads(1);

    let err = env.tallies.document("k").await.unwrap_err();
    assert!(matches!(err, MailroomError::LoadFailed { .. }));
    assert!(err.is_retryable());
    assert_eq!(env.tallies.cached_count(), 0);

    assert!(env.tallies.document("k").await.is_ok());
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn failing_action_aborts_only_its_root() {
    let env = TestMailroom::new();
    let a = env.document("a").await;
    let b = env.document("b").await;

    let txn = Transaction::new()
        .with(&a, [add(1), fail("boom")])
        .with(&b, [add(2)]);
    let report = env.run_transaction(txn).await.unwrap();
    assert_eq!(report.committed_count(), 1);
    assert_eq!(report.failed_count(), 1);

    let failure = report.failure_for(a.id()).unwrap();
    match &failure.error {
        MailroomError::ActionFailed { label, index, message } => {
            assert_eq!(label, "fail");
            assert_eq!(*index, 1);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!failure.error.is_retryable());

    assert_eq!(env.stored("a"), None);
    assert_eq!(a.value(), Tally::default());
    assert!(!a.is_dirty());
    assert_eq!(env.stored("b").unwrap().count, 2);
}

#[tokio::test]
async fn action_failure_after_conflict_reload() {
    let env = TestMailroom::new();
    env.seed("acct", &Tally::new(10));
    let doc = env.document("acct").await;

    // The fresh base no longer covers the withdrawal.
    env.seed("acct", &Tally::new(2));
    let report = env.commit(&doc, vec![withdraw(5)]).await;

    let failure = report.failure_for(doc.id()).unwrap();
    assert!(matches!(failure.error, MailroomError::ActionFailed { .. }));
    assert_eq!(env.stored("acct").unwrap(), Tally::new(2));
    assert_eq!(doc.value(), Tally::new(2));
}

#[tokio::test]
async fn empty_action_list_still_commits() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;

    let report = env.commit(&doc, Vec::new()).await;
    assert!(report.is_complete());
    assert_eq!(env.stored("k"), Some(Tally::default()));
}

// ============================================================================
// Snapshots
// ============================================================================

#[tokio::test]
async fn snapshot_edits_stay_local() {
    let env = TestMailroom::new();
    env.seed("k", &Tally::new(3));
    let doc = env.document("k").await;
    let snap = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();

    snap.apply([add(10)]).await.unwrap();
    assert_eq!(snap.value().unwrap().count, 13);
    assert_eq!(doc.value().count, 3);
    assert_eq!(env.stored("k").unwrap().count, 3);
    assert_eq!(env.store.write_count(), 0);

    snap.refresh().await.unwrap();
    assert_eq!(snap.value().unwrap().count, 3);
}

#[tokio::test]
async fn failed_snapshot_edit_keeps_previous_value() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let snap = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();

    let err = snap.apply([add(1), fail("nope")]).await.unwrap_err();
    assert!(matches!(err, MailroomError::ActionFailed { index: 1, .. }));
    assert_eq!(snap.value().unwrap(), Tally::default());
}

#[tokio::test]
async fn nested_snapshot_commit_folds_to_the_root() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let s1 = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();
    let s2 = env.create_snapshot(&s1, SnapshotOptions::new()).unwrap();
    let s3 = env.create_snapshot(&s2, SnapshotOptions::new()).unwrap();
    assert_eq!(s3.depth().unwrap(), 3);
    assert_eq!(s3.parent().unwrap(), NodeRef::Snapshot(s2.id()));
    assert_eq!(doc.snapshot_count(), 3);

    // Local-only edit on the leaf never reaches the store.
    s3.apply([add(100)]).await.unwrap();

    let report = env.commit(&s3, vec![add(7)]).await;
    assert!(report.is_complete());
    assert_eq!(env.store.write_count(), 1);

    assert_eq!(env.stored("k").unwrap().count, 7);
    assert_eq!(doc.value().count, 7);
    assert_eq!(s1.value().unwrap().count, 7);
    assert_eq!(s2.value().unwrap().count, 7);
    assert_eq!(s3.value().unwrap().count, 107);
}

#[tokio::test]
async fn snapshot_working_copies_survive_a_conflict() {
    let env = TestMailroom::new();
    env.seed("k", &Tally::new(1));
    let doc = env.document("k").await;
    let snap = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();

    env.seed("k", &Tally::new(50));
    let report = env.commit(&snap, vec![add(1)]).await;
    assert_eq!(report.committed[0].conflicts, 1);

    assert_eq!(env.stored("k").unwrap().count, 51);
    // The snapshot received the actions once, on its own base.
    assert_eq!(snap.value().unwrap().count, 2);
    assert_eq!(snap.value().unwrap().log, vec!["+1"]);
}

#[tokio::test]
async fn non_leaf_target_is_rejected_without_side_effects() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let other = env.document("other").await;
    let parent = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();
    let child = env.create_snapshot(&parent, SnapshotOptions::new()).unwrap();

    let txn = Transaction::new()
        .with(&other, [add(1)])
        .with(&parent, [add(1)]);
    let err = env.run_transaction(txn).await.unwrap_err();
    assert!(matches!(err, MailroomError::NotALeaf { id } if id == parent.id()));

    assert_eq!(env.store.write_count(), 0);
    assert_eq!(env.stats().transactions, 0);
    assert_eq!(parent.value().unwrap(), Tally::default());

    // Discarding the child makes the parent a leaf again.
    assert_eq!(child.discard(), 1);
    assert!(parent.is_leaf().unwrap());
    assert!(env.commit(&parent, vec![add(1)]).await.is_complete());
}

#[tokio::test]
async fn discarded_target_is_rejected() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let s1 = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();
    let s2 = env.create_snapshot(&s1, SnapshotOptions::new()).unwrap();

    assert_eq!(s1.discard(), 2);
    assert!(s2.is_discarded());
    assert_eq!(doc.snapshot_count(), 0);
    assert_eq!(env.stats().snapshots_discarded, 2);

    let err = env
        .run_transaction(Transaction::new().with(&s2, [add(1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, MailroomError::SnapshotDiscarded { id } if id == s2.id()));
    assert!(matches!(
        env.create_snapshot(&s2, SnapshotOptions::new()),
        Err(MailroomError::SnapshotDiscarded { .. })
    ));
    assert!(matches!(
        s2.apply([add(1)]).await,
        Err(MailroomError::SnapshotDiscarded { .. })
    ));
    assert_eq!(env.store.write_count(), 0);
}

#[tokio::test]
async fn foreign_handles_are_rejected() {
    let env = TestMailroom::new();
    let stranger = Mailroom::new(fast_options());
    let doc = env.document("k").await;

    let err = stranger
        .run_transaction(Transaction::new().with(&doc, [add(1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, MailroomError::ForeignHandle));
    assert!(matches!(
        stranger.create_snapshot(&doc, SnapshotOptions::new()),
        Err(MailroomError::ForeignHandle)
    ));
    assert_eq!(env.store.write_count(), 0);
}

#[tokio::test]
async fn update_callbacks_fire_on_commit_and_reload() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    let snap = env
        .create_snapshot(
            &doc,
            SnapshotOptions::new().on_update(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

    env.commit(&doc, vec![add(1)]).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    env.seed("k", &Tally::new(9));
    doc.reload().await.unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(doc.value().count, 9);

    // Unchanged bytes notify nobody.
    doc.reload().await.unwrap();
    assert_eq!(env.commit(&doc, Vec::new()).await.committed_count(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    // Reloads forced by conflicts stay silent; only the commit notifies.
    env.store.interfere_next_writes(2);
    let report = env.commit(&doc, vec![add(1)]).await;
    assert_eq!(report.committed[0].conflicts, 2);
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    // A root that fails after a conflict reload notifies nobody.
    env.seed("k", &Tally::new(0));
    let report = env.commit(&doc, vec![withdraw(5)]).await;
    assert_eq!(report.failed_count(), 1);
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    snap.discard();
    env.commit(&doc, vec![add(1)]).await;
    assert_eq!(fired.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn dropped_snapshots_leave_the_document() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let fired = Arc::new(AtomicUsize::new(0));

    for _ in 0..100 {
        let counter = Arc::clone(&fired);
        let snap = env
            .create_snapshot(
                &doc,
                SnapshotOptions::new().on_update(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        snap.apply([add(1)]).await.unwrap();
    }
    assert_eq!(doc.snapshot_count(), 0);
    // Every callback went with its slot.
    assert_eq!(Arc::strong_count(&fired), 1);

    env.commit(&doc, vec![add(1)]).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dropped_child_leaves_parent_committable() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let parent = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();

    let child = env.create_snapshot(&parent, SnapshotOptions::new()).unwrap();
    assert!(!parent.is_leaf().unwrap());
    drop(child);

    assert!(parent.is_leaf().unwrap());
    assert_eq!(doc.snapshot_count(), 1);
    assert!(env.commit(&parent, vec![add(1)]).await.is_complete());
    assert_eq!(env.stored("k").unwrap().count, 1);
}

#[tokio::test]
async fn released_ancestor_still_folds() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let s1 = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();
    let s2 = env.create_snapshot(&s1, SnapshotOptions::new()).unwrap();
    let s3 = env.create_snapshot(&s2, SnapshotOptions::new()).unwrap();
    drop(s2);

    assert_eq!(doc.snapshot_count(), 2);
    assert!(!s1.is_leaf().unwrap());
    assert_eq!(s3.depth().unwrap(), 3);

    assert!(env.commit(&s3, vec![add(4)]).await.is_complete());
    assert_eq!(env.stored("k").unwrap().count, 4);
    assert_eq!(s1.value().unwrap().count, 4);
    assert_eq!(s3.value().unwrap().count, 4);

    // The last descendant takes the released middle snapshot with it.
    drop(s3);
    assert_eq!(doc.snapshot_count(), 1);
    assert!(s1.is_leaf().unwrap());
}

#[tokio::test]
async fn queued_snapshot_target_outlives_its_handle() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let snap = env.create_snapshot(&doc, SnapshotOptions::new()).unwrap();

    let txn = Transaction::new().with(&snap, [add(2)]);
    drop(snap);
    assert_eq!(doc.snapshot_count(), 1);

    assert!(env.run_transaction(txn).await.unwrap().is_complete());
    assert_eq!(env.stored("k").unwrap().count, 2);
    assert_eq!(doc.snapshot_count(), 0);
}

#[tokio::test]
async fn weak_handles_in_callbacks_do_not_leak() {
    let env = TestMailroom::new();
    let doc = env.document("k").await;
    let cell: Arc<OnceLock<WeakSnapshot<Tally>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(AtomicI64::new(-1));

    let (callback_cell, callback_seen) = (Arc::clone(&cell), Arc::clone(&seen));
    let snap = env
        .create_snapshot(
            &doc,
            SnapshotOptions::new().on_update(move || {
                if let Some(snap) = callback_cell.get().and_then(WeakSnapshot::upgrade) {
                    callback_seen.store(snap.document().value().count, Ordering::SeqCst);
                }
            }),
        )
        .unwrap();
    cell.set(snap.downgrade()).unwrap();

    env.commit(&doc, vec![add(6)]).await;
    assert_eq!(seen.load(Ordering::SeqCst), 6);

    drop(snap);
    assert_eq!(doc.snapshot_count(), 0);
    assert!(cell.get().unwrap().upgrade().is_none());
}

// ============================================================================
// Collections
// ============================================================================

#[tokio::test]
async fn documents_are_cached_per_key() {
    let env = TestMailroom::new();
    let a = env.document("k").await;
    let b = env.document("k").await;
    assert_eq!(a.id(), b.id());
    assert_eq!(env.tallies.cached_count(), 1);
    assert_eq!(env.store.read_count(), 1);
    assert_eq!(env.stats().documents_loaded, 1);

    drop(a);
    drop(b);
    assert!(env.tallies.cached("k").is_none());
}

#[tokio::test]
async fn rejecting_collection_reports_absent_keys() {
    let env = TestMailroom::new();
    let strict = env
        .collection_builder::<Tally>()
        .name("strict")
        .store(Arc::clone(&env.store) as Arc<dyn DataStore>)
        .load_transform(cbor_load::<Tally>)
        .save_transform(cbor_save::<Tally>)
        .reject_missing()
        .build()
        .unwrap();

    let err = strict.document("ghost").await.unwrap_err();
    assert!(matches!(err, MailroomError::DocumentAbsent { .. }));

    env.seed("ghost", &Tally::new(1));
    let doc = strict.document("ghost").await.unwrap();
    assert_eq!(doc.collection_name(), "strict");
    assert_eq!(doc.value().count, 1);
}

#[tokio::test]
async fn undecodable_value_is_a_transform_failure() {
    let env = TestMailroom::new();
    env.store.put_external("junk", &b"\xff\xff"[..]);

    let err = env.tallies.document("junk").await.unwrap_err();
    assert!(matches!(err, MailroomError::TransformFailed { .. }));
}

#[test]
fn commit_states_move_forward() {
    assert!(CommitState::Applying.can_transition_to(CommitState::Writing));
    assert!(CommitState::Writing.can_transition_to(CommitState::VersionConflict));
    assert!(!CommitState::Committed.can_transition_to(CommitState::Writing));
    assert!(CommitState::Failed.is_terminal());
}
