//! Space Persistence Queue
//!
//! Buffers operations (per tree) and secrets for one space and flushes them to a
//! [`SpacePersistence`] backend. Buffering never fails; flushing isolates failures per
//! tree and keeps anything that did not make it for the next cycle.

use super::{SecretMap, SpacePersistence};
use crate::error::StorageError;
use crate::op::Operation;
use crate::types::{SpaceId, TreeId};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome of one `save_data` cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// Trees whose batch was written, with the number of ops in each
    pub trees_saved: Vec<(TreeId, usize)>,
    /// Trees whose write failed (their unwritten ops are queued again)
    pub trees_failed: Vec<(TreeId, String)>,
    /// Ops that can never be written (e.g. an origin that cannot name a shard), dropped
    pub ops_rejected: Vec<(TreeId, Operation)>,
    /// Number of secrets written
    pub secrets_saved: usize,
    /// Set when the secrets write failed (all pending secrets are kept)
    pub secrets_error: Option<String>,
    /// An ops flush was already running, so this call did not start one
    pub ops_coalesced: bool,
    /// A secrets flush was already running, so this call did not start one
    pub secrets_coalesced: bool,
}

impl SaveReport {
    pub fn is_clean(&self) -> bool {
        self.trees_failed.is_empty() && self.secrets_error.is_none()
    }
}

#[derive(Default)]
struct OpsState {
    pending: HashMap<TreeId, Vec<Operation>>,
    flushing: bool,
}

#[derive(Default)]
struct SecretsState {
    pending: SecretMap,
    flushing: bool,
}

struct OpsFlushOutcome {
    saved: Vec<(TreeId, usize)>,
    failed: Vec<(TreeId, String)>,
    rejected: Vec<(TreeId, Operation)>,
    coalesced: bool,
}

struct SecretsFlushOutcome {
    saved: usize,
    error: Option<String>,
    coalesced: bool,
}

/// Clears an in-flight flag when the flush future finishes or is dropped.
struct FlushingFlag<'a, T> {
    state: &'a Mutex<T>,
    reset: fn(&mut T),
}

impl<T> Drop for FlushingFlag<'_, T> {
    fn drop(&mut self) {
        (self.reset)(&mut self.state.lock());
    }
}

/// Write-behind queue for one space
pub struct PersistenceQueue {
    space_id: SpaceId,
    persistence: Arc<dyn SpacePersistence>,
    ops: Mutex<OpsState>,
    secrets: Mutex<SecretsState>,
}

impl PersistenceQueue {
    pub fn new(space_id: impl Into<SpaceId>, persistence: Arc<dyn SpacePersistence>) -> Self {
        Self {
            space_id: space_id.into(),
            persistence,
            ops: Mutex::new(OpsState::default()),
            secrets: Mutex::new(SecretsState::default()),
        }
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    /// Buffer operations for a tree. Never fails, never waits.
    ///
    /// Transient property edits are discarded here; they never reach storage.
    pub fn add_ops(&self, tree_id: &str, ops: impl IntoIterator<Item = Operation>) {
        let mut state = self.ops.lock();
        let pending = state.pending.entry(tree_id.to_string()).or_default();
        pending.extend(ops.into_iter().filter(|op| !op.is_transient()));
        if pending.is_empty() {
            state.pending.remove(tree_id);
        }
    }

    /// Buffer a secret. A later value for the same key replaces the earlier one.
    pub fn add_secret(&self, key: impl Into<String>, value: impl Into<String>) {
        self.secrets.lock().pending.insert(key.into(), value.into());
    }

    /// Flush pending operations and secrets concurrently.
    ///
    /// Resolves once both flushes settle. Failures are logged, reported and retried
    /// on the next call; they are never returned as errors.
    pub async fn save_data(&self) -> SaveReport {
        let (ops, secrets) = tokio::join!(self.flush_ops(), self.flush_secrets());
        let report = SaveReport {
            trees_saved: ops.saved,
            trees_failed: ops.failed,
            ops_rejected: ops.rejected,
            secrets_saved: secrets.saved,
            secrets_error: secrets.error,
            ops_coalesced: ops.coalesced,
            secrets_coalesced: secrets.coalesced,
        };
        if !report.trees_saved.is_empty() || report.secrets_saved > 0 {
            info!(
                space_id = %self.space_id,
                trees_saved = report.trees_saved.len(),
                trees_failed = report.trees_failed.len(),
                secrets_saved = report.secrets_saved,
                "Flushed space data"
            );
        }
        report
    }

    async fn flush_ops(&self) -> OpsFlushOutcome {
        let batches: Vec<(TreeId, Vec<Operation>)> = {
            let mut state = self.ops.lock();
            if state.flushing {
                debug!(space_id = %self.space_id, "Ops flush already running, coalescing");
                return OpsFlushOutcome {
                    saved: Vec::new(),
                    failed: Vec::new(),
                    rejected: Vec::new(),
                    coalesced: true,
                };
            }
            state.flushing = true;
            // Taking the lists empties the buffer; ops added during the writes start fresh lists.
            state
                .pending
                .drain()
                .filter(|(_, ops)| !ops.is_empty())
                .collect()
        };
        let _flag = FlushingFlag {
            state: &self.ops,
            reset: |s: &mut OpsState| s.flushing = false,
        };

        let writes = batches.into_iter().map(|(tree_id, ops)| async move {
            match self
                .persistence
                .append_tree_ops(&self.space_id, &tree_id, &ops)
                .await
            {
                Ok(()) => {
                    debug!(space_id = %self.space_id, tree_id = %tree_id, count = ops.len(), "Saved tree ops");
                    Ok((tree_id, ops.len()))
                }
                Err(e) => {
                    let (written, unwritten) = split_failed_batch(&e, ops);
                    error!(
                        space_id = %self.space_id,
                        tree_id = %tree_id,
                        written = written,
                        retrying = unwritten.retry.len(),
                        dropped = unwritten.dropped.len(),
                        error = %e,
                        "Failed to save tree ops, keeping the unwritten ones for the next flush"
                    );
                    for op in &unwritten.dropped {
                        error!(
                            space_id = %self.space_id,
                            tree_id = %tree_id,
                            op_id = %op.id(),
                            "Dropping operation that can never be written"
                        );
                    }
                    self.requeue_front(&tree_id, unwritten.retry);
                    let dropped: Vec<(TreeId, Operation)> = unwritten
                        .dropped
                        .into_iter()
                        .map(|op| (tree_id.clone(), op))
                        .collect();
                    Err((tree_id, e.to_string(), dropped))
                }
            }
        });

        let mut saved = Vec::new();
        let mut failed = Vec::new();
        let mut rejected = Vec::new();
        for result in join_all(writes).await {
            match result {
                Ok(entry) => saved.push(entry),
                Err((tree_id, error, dropped)) => {
                    failed.push((tree_id, error));
                    rejected.extend(dropped);
                }
            }
        }
        OpsFlushOutcome {
            saved,
            failed,
            rejected,
            coalesced: false,
        }
    }

    /// Put a failed batch back ahead of anything buffered since it was taken.
    fn requeue_front(&self, tree_id: &str, mut failed: Vec<Operation>) {
        if failed.is_empty() {
            return;
        }
        let mut state = self.ops.lock();
        let pending = state.pending.entry(tree_id.to_string()).or_default();
        failed.append(pending);
        *pending = failed;
    }

    async fn flush_secrets(&self) -> SecretsFlushOutcome {
        let snapshot = {
            let mut state = self.secrets.lock();
            if state.flushing {
                debug!(space_id = %self.space_id, "Secrets flush already running, coalescing");
                return SecretsFlushOutcome {
                    saved: 0,
                    error: None,
                    coalesced: true,
                };
            }
            if state.pending.is_empty() {
                return SecretsFlushOutcome {
                    saved: 0,
                    error: None,
                    coalesced: false,
                };
            }
            state.flushing = true;
            state.pending.clone()
        };
        let _flag = FlushingFlag {
            state: &self.secrets,
            reset: |s: &mut SecretsState| s.flushing = false,
        };

        match self
            .persistence
            .save_all_secrets(&self.space_id, &snapshot)
            .await
        {
            Ok(()) => {
                let mut state = self.secrets.lock();
                // Keys rewritten during the flush keep their newer value pending.
                for (key, value) in &snapshot {
                    if state.pending.get(key) == Some(value) {
                        state.pending.remove(key);
                    }
                }
                SecretsFlushOutcome {
                    saved: snapshot.len(),
                    error: None,
                    coalesced: false,
                }
            }
            Err(e) => {
                error!(
                    space_id = %self.space_id,
                    count = snapshot.len(),
                    error = %e,
                    "Failed to save secrets, keeping them for the next flush"
                );
                SecretsFlushOutcome {
                    saved: 0,
                    error: Some(e.to_string()),
                    coalesced: false,
                }
            }
        }
    }

    /// Secrets already on durable storage
    pub async fn saved_secrets(&self) -> Result<SecretMap, StorageError> {
        self.persistence.get_all_secrets(&self.space_id).await
    }

    pub fn has_pending_ops(&self) -> bool {
        self.ops.lock().pending.values().any(|ops| !ops.is_empty())
    }

    pub fn has_pending_ops_for(&self, tree_id: &str) -> bool {
        self.ops
            .lock()
            .pending
            .get(tree_id)
            .is_some_and(|ops| !ops.is_empty())
    }

    pub fn pending_ops_count(&self) -> usize {
        self.ops.lock().pending.values().map(Vec::len).sum()
    }

    pub fn has_pending_secrets(&self) -> bool {
        !self.secrets.lock().pending.is_empty()
    }

    pub fn has_pending_data(&self) -> bool {
        self.has_pending_ops() || self.has_pending_secrets()
    }

    pub fn is_saving_ops(&self) -> bool {
        self.ops.lock().flushing
    }

    pub fn is_saving_secrets(&self) -> bool {
        self.secrets.lock().flushing
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving_ops() || self.is_saving_secrets()
    }
}

struct Unwritten {
    retry: Vec<Operation>,
    dropped: Vec<Operation>,
}

/// Sort a failed batch into ops already on disk (counted), ops to retry and ops to drop.
fn split_failed_batch(error: &StorageError, ops: Vec<Operation>) -> (usize, Unwritten) {
    let none: &[String] = &[];
    let (written_origins, rejected_origins) = match error {
        StorageError::PartialAppend {
            written_origins,
            rejected_origins,
            ..
        } => (written_origins.as_slice(), rejected_origins.as_slice()),
        _ => (none, none),
    };
    let reject_all = !error.is_retryable() && !matches!(error, StorageError::PartialAppend { .. });

    let mut written = 0;
    let mut unwritten = Unwritten {
        retry: Vec::new(),
        dropped: Vec::new(),
    };
    for op in ops {
        let origin = op.origin_id();
        if written_origins.iter().any(|o| o == origin) {
            written += 1;
        } else if reject_all || rejected_origins.iter().any(|o| o == origin) {
            unwritten.dropped.push(op);
        } else {
            unwritten.retry.push(op);
        }
    }
    (written, unwritten)
}
