//! The per-root commit engine.

use super::builder::{PendingRoot, RootBatch};
use super::report::{RootCommit, RootFailure};
use super::state::{CommitAttempt, CommitState};
use crate::action::{apply_actions, Action};
use crate::error::{MailroomError, MailroomResult};
use crate::mailroom::Shared;
use crate::types::{DocumentId, DocumentValue, NodeRef, SnapshotId};
use async_trait::async_trait;
use bytes::Bytes;
use mailroom_store::VersionToken;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snapshot targets first in creation order, the document last.
fn apply_order(node: NodeRef) -> (u8, u64) {
    match node {
        NodeRef::Snapshot(id) => (0, id.as_u64()),
        NodeRef::Document(id) => (1, id.as_u64()),
    }
}

struct Step<'a, T> {
    /// The target and its snapshot ancestors, nearest first.
    chain: Vec<SnapshotId>,
    actions: &'a [Action<T>],
}

/// Everything needed to rebuild the working copies from a root value.
///
/// Snapshot bases are captured once under the commit lock; only the root
/// base changes between conflict rounds.
struct Plan<'a, T> {
    steps: Vec<Step<'a, T>>,
    snapshot_bases: BTreeMap<SnapshotId, T>,
}

impl<T: DocumentValue> Plan<'_, T> {
    /// Folds every step into fresh copies of the snapshots and of `root`.
    fn apply(&self, mut root: T) -> MailroomResult<(T, BTreeMap<SnapshotId, T>)> {
        let mut snapshots = self.snapshot_bases.clone();
        for step in &self.steps {
            for id in &step.chain {
                if let Some(value) = snapshots.get_mut(id) {
                    apply_actions(value, step.actions)?;
                }
            }
            apply_actions(&mut root, step.actions)?;
        }
        Ok((root, snapshots))
    }
}

enum WriteOutcome {
    Written(VersionToken),
    Conflict,
}

impl<T: DocumentValue> RootBatch<T> {
    fn plan(&self) -> MailroomResult<Plan<'_, T>> {
        let arena = self.document.core.snapshots.read();

        let mut targets: Vec<_> = self.targets.iter().collect();
        targets.sort_by_key(|target| apply_order(target.node));

        let mut steps = Vec::with_capacity(targets.len());
        let mut snapshot_bases = BTreeMap::new();
        for target in targets {
            let chain = match target.node {
                NodeRef::Document(_) => Vec::new(),
                NodeRef::Snapshot(id) => arena.chain(id)?,
            };
            for id in &chain {
                if !snapshot_bases.contains_key(id) {
                    snapshot_bases.insert(*id, arena.value(*id)?.clone());
                }
            }
            steps.push(Step {
                chain,
                actions: &target.actions,
            });
        }

        Ok(Plan {
            steps,
            snapshot_bases,
        })
    }

    async fn run(
        &self,
        shared: &Shared,
        attempt: &mut CommitAttempt,
    ) -> MailroomResult<VersionToken> {
        let core = &self.document.core;
        let key = core.key.as_str();
        let _guard = core.commit_lock.lock().await;

        // Snapshots may have been discarded between validation and locking.
        let plan = self.plan()?;

        // Observers last heard about these bytes.
        let before = core.raw();
        if core.is_dirty() {
            debug!(key, "last write unacknowledged, reloading first");
            core.reload_locked(&shared.options.write_retry).await?;
        }

        loop {
            let (base, expected) = core.current();
            let (root, snapshots) = plan.apply(base)?;
            let raw = core.collection.encode(key, &root)?;

            attempt.transition(key, CommitState::Writing);
            core.mark_dirty();

            match self.write(shared, raw.clone(), expected, attempt).await? {
                WriteOutcome::Written(version) => {
                    attempt.transition(key, CommitState::Committed);
                    let changed = before.as_ref() != Some(&raw);
                    core.install(root, Some(version), Some(raw), snapshots);
                    if changed {
                        core.notify();
                    }
                    return Ok(version);
                }
                WriteOutcome::Conflict => {
                    attempt.transition(key, CommitState::VersionConflict);
                    attempt.conflicts += 1;
                    shared.stats.record_conflict();

                    if attempt.conflicts > shared.options.max_conflict_retries {
                        return Err(MailroomError::ConflictRetriesExhausted {
                            key: key.to_string(),
                            attempts: attempt.conflicts,
                        });
                    }

                    warn!(
                        key,
                        conflicts = attempt.conflicts,
                        "version conflict, reloading and re-applying"
                    );
                    core.reload_locked(&shared.options.write_retry).await?;
                    attempt.transition(key, CommitState::Applying);
                }
            }
        }
    }

    /// Issues the conditional write, retrying transient failures with
    /// backoff. Version conflicts are handed back to the caller.
    async fn write(
        &self,
        shared: &Shared,
        raw: Bytes,
        expected: Option<VersionToken>,
        attempt: &mut CommitAttempt,
    ) -> MailroomResult<WriteOutcome> {
        let core = &self.document.core;
        let key = core.key.as_str();
        let retry = &shared.options.write_retry;
        let attempts = retry.attempts();

        let mut last_error = None;
        for n in 0..attempts {
            if n > 0 {
                tokio::time::sleep(retry.delay_for_attempt(n)).await;
                attempt.transition(key, CommitState::Writing);
            }
            attempt.write_attempts += 1;

            match core.collection.store.set(key, raw.clone(), expected).await {
                Ok(version) => return Ok(WriteOutcome::Written(version)),
                Err(e) if e.is_conflict() => return Ok(WriteOutcome::Conflict),
                Err(e) if e.is_retryable() => {
                    attempt.transition(key, CommitState::TransientFailure);
                    shared.stats.record_transient_retry();
                    warn!(key, attempt = n + 1, error = %e, "transient write failure");
                    last_error = Some(e);
                }
                Err(source) => {
                    return Err(MailroomError::StoreFailed {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }

        Err(MailroomError::TransientRetriesExhausted {
            key: key.to_string(),
            attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl<T: DocumentValue> PendingRoot for RootBatch<T> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn document_id(&self) -> DocumentId {
        self.document.core.id
    }

    fn target_count(&self) -> usize {
        self.len()
    }

    fn validate(&self, shared: &Arc<Shared>) -> MailroomResult<()> {
        self.check(shared)
    }

    async fn commit(self: Box<Self>, shared: Arc<Shared>) -> Result<RootCommit, RootFailure> {
        let root = self.root_ref();
        let mut attempt = CommitAttempt::new();

        match self.run(&shared, &mut attempt).await {
            Ok(version) => {
                shared.stats.record_root_committed();
                debug!(root = %root, %version, conflicts = attempt.conflicts, "root committed");
                Ok(RootCommit {
                    root,
                    version,
                    write_attempts: attempt.write_attempts,
                    conflicts: attempt.conflicts,
                })
            }
            Err(error) => {
                warn!(root = %root, state = %attempt.state(), error = %error, "root failed");
                attempt.transition(&root.key, CommitState::Failed);
                shared.stats.record_root_failed();
                Err(RootFailure { root, error })
            }
        }
    }
}
