//! Durable priority queue of pending operations.
//!
//! The in-memory map is authoritative for scheduling; every mutation is
//! written through to the [`PersistentStore`] before it becomes visible, so
//! a crash never loses an acknowledged submission. Entries are stored under
//! `ops/<operation id>` as CBOR.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use syncq_protocol::{ConflictDetails, Fields, Operation, OperationId};
use syncq_storage::PersistentStore;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "ops/";

fn key_for(id: &OperationId) -> String {
    format!("{KEY_PREFIX}{id}")
}

pub(crate) fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Sync order: priority descending, then submission time, then enqueue
/// sequence.
pub fn sync_order(a: &Operation, b: &Operation) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(a.created_at.cmp(&b.created_at))
        .then(a.sequence.cmp(&b.sequence))
}

/// What happened to an operation after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// Still queued; will be retried once due.
    Retrying(Operation),
    /// Budget spent; removed from the queue.
    Exhausted(Operation),
}

/// The pending-operation queue.
pub struct OperationQueue {
    store: Arc<dyn PersistentStore>,
    max_size: usize,
    retention: Duration,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    ops: HashMap<OperationId, Operation>,
    next_sequence: u64,
}

impl OperationQueue {
    /// Opens a queue, loading whatever the store already holds.
    ///
    /// Entries that fail to decode are logged and skipped.
    pub fn open(
        store: Arc<dyn PersistentStore>,
        max_size: usize,
        retention: Duration,
    ) -> SyncResult<Self> {
        let mut state = QueueState::default();
        for key in store.list_by_prefix(KEY_PREFIX)? {
            let Some(bytes) = store.get(&key)? else {
                continue;
            };
            match Operation::decode(&bytes) {
                Ok(op) => {
                    state.next_sequence = state.next_sequence.max(op.sequence.saturating_add(1));
                    state.ops.insert(op.id, op);
                }
                Err(err) => warn!(key = %key, error = %err, "skipping corrupt queued operation"),
            }
        }
        debug!(count = state.ops.len(), "operation queue loaded");

        Ok(Self {
            store,
            max_size,
            retention,
            state: Mutex::new(state),
        })
    }

    /// Maximum number of queued operations.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Retention window used by [`Self::purge_expired`].
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Adds an operation, stamping its enqueue sequence.
    ///
    /// # Errors
    ///
    /// [`SyncError::CapacityExceeded`] if the queue is full. Call
    /// [`Self::purge_if_full`] first to make room from expired entries.
    pub fn add(&self, mut op: Operation) -> SyncResult<u64> {
        let mut state = self.state.lock();
        if state.ops.len() >= self.max_size {
            return Err(SyncError::CapacityExceeded {
                capacity: self.max_size,
            });
        }

        op.sequence = state.next_sequence;
        self.store.put(&key_for(&op.id), &op.encode()?)?;
        state.next_sequence += 1;
        let sequence = op.sequence;
        state.ops.insert(op.id, op);
        Ok(sequence)
    }

    /// Removes an operation. Returns it if it was queued.
    pub fn remove(&self, id: &OperationId) -> SyncResult<Option<Operation>> {
        let mut state = self.state.lock();
        if !state.ops.contains_key(id) {
            return Ok(None);
        }
        self.store.delete(&key_for(id))?;
        Ok(state.ops.remove(id))
    }

    /// Returns a copy of a queued operation.
    pub fn get(&self, id: &OperationId) -> Option<Operation> {
        self.state.lock().ops.get(id).cloned()
    }

    /// Returns true if the operation is queued.
    pub fn contains(&self, id: &OperationId) -> bool {
        self.state.lock().ops.contains_key(id)
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.state.lock().ops.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of operations holding a manual conflict.
    pub fn held_count(&self) -> usize {
        self.state.lock().ops.values().filter(|op| op.is_held()).count()
    }

    /// Every queued operation in sync order, ineligible ones included.
    pub fn all(&self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self.state.lock().ops.values().cloned().collect();
        ops.sort_by(sync_order);
        ops
    }

    /// Operations eligible for dispatch at `now`, in sync order.
    ///
    /// Skips held operations, operations still backing off, and operations
    /// with a dependency that is still queued.
    pub fn sorted_for_sync(&self, now: i64) -> Vec<Operation> {
        let state = self.state.lock();
        let mut ready: Vec<Operation> = state
            .ops
            .values()
            .filter(|op| !op.is_held() && op.is_due(now))
            .filter(|op| op.dependencies.iter().all(|dep| !state.ops.contains_key(dep)))
            .cloned()
            .collect();
        ready.sort_by(sync_order);
        ready
    }

    /// IDs of every queued operation not parked on a manual conflict.
    ///
    /// A pass takes this snapshot when it starts and never dispatches
    /// anything outside it.
    pub fn snapshot_for_pass(&self) -> HashSet<OperationId> {
        self.state
            .lock()
            .ops
            .values()
            .filter(|op| !op.is_held())
            .map(|op| op.id)
            .collect()
    }

    /// The first operation in `candidates` that is eligible at `now`.
    ///
    /// Candidates that left the queue, got held, are backing off, or still
    /// wait on a queued dependency are passed over.
    pub fn next_for_sync(
        &self,
        now: i64,
        candidates: &HashSet<OperationId>,
    ) -> Option<Operation> {
        let state = self.state.lock();
        candidates
            .iter()
            .filter_map(|id| state.ops.get(id))
            .filter(|op| !op.is_held() && op.is_due(now))
            .filter(|op| op.dependencies.iter().all(|dep| !state.ops.contains_key(dep)))
            .min_by(|a, b| sync_order(a, b))
            .cloned()
    }

    /// Operations that can never run until a held conflict is decided,
    /// directly or through a chain of dependencies. Held operations
    /// themselves are not listed.
    pub fn blocked_by_conflicts(&self) -> Vec<OperationId> {
        let state = self.state.lock();
        let mut blocked: HashSet<OperationId> = state
            .ops
            .values()
            .filter(|op| op.is_held())
            .map(|op| op.id)
            .collect();

        loop {
            let newly: Vec<OperationId> = state
                .ops
                .values()
                .filter(|op| !blocked.contains(&op.id))
                .filter(|op| op.dependencies.iter().any(|dep| blocked.contains(dep)))
                .map(|op| op.id)
                .collect();
            if newly.is_empty() {
                break;
            }
            blocked.extend(newly);
        }

        let mut ops: Vec<&Operation> = state
            .ops
            .values()
            .filter(|op| !op.is_held() && blocked.contains(&op.id))
            .collect();
        ops.sort_by(|a, b| sync_order(a, b));
        ops.into_iter().map(|op| op.id).collect()
    }

    /// Records a failed attempt.
    ///
    /// Returns `None` if the operation is no longer queued.
    pub fn record_failure(
        &self,
        id: &OperationId,
        next_attempt_at: Option<i64>,
    ) -> SyncResult<Option<FailureOutcome>> {
        let mut state = self.state.lock();
        let Some(mut op) = state.ops.get(id).cloned() else {
            return Ok(None);
        };

        if op.record_failure(next_attempt_at) {
            self.store.delete(&key_for(id))?;
            state.ops.remove(id);
            Ok(Some(FailureOutcome::Exhausted(op)))
        } else {
            self.store.put(&key_for(id), &op.encode()?)?;
            state.ops.insert(*id, op.clone());
            Ok(Some(FailureOutcome::Retrying(op)))
        }
    }

    /// Parks an operation on a manual conflict.
    ///
    /// Returns `None` if the operation is no longer queued.
    pub fn hold(
        &self,
        id: &OperationId,
        details: ConflictDetails,
    ) -> SyncResult<Option<Operation>> {
        let mut state = self.state.lock();
        let Some(mut op) = state.ops.get(id).cloned() else {
            return Ok(None);
        };

        op.held_conflict = Some(details);
        op.next_attempt_at = None;
        self.store.put(&key_for(id), &op.encode()?)?;
        state.ops.insert(*id, op.clone());
        Ok(Some(op))
    }

    /// Releases a held operation so it syncs again.
    ///
    /// The remote snapshot seen at hold time becomes the new baseline, so
    /// the next attempt only conflicts if the row moved again. `payload`
    /// replaces the local intent when given.
    pub fn release(&self, id: &OperationId, payload: Option<Fields>) -> SyncResult<Operation> {
        let mut state = self.state.lock();
        let Some(mut op) = state.ops.get(id).cloned() else {
            return Err(SyncError::UnknownOperation(*id));
        };
        let Some(details) = op.held_conflict.take() else {
            return Err(SyncError::NotHeld(*id));
        };

        op.baseline = Some(details.remote_snapshot);
        if let Some(payload) = payload {
            op.payload = payload;
        }
        op.next_attempt_at = None;
        self.store.put(&key_for(id), &op.encode()?)?;
        state.ops.insert(*id, op.clone());
        Ok(op)
    }

    /// Removes every operation older than `max_age`, oldest first.
    pub fn purge_older_than(&self, now: i64, max_age: Duration) -> SyncResult<Vec<Operation>> {
        let mut state = self.state.lock();
        self.purge_locked(&mut state, now, max_age)
    }

    /// Removes every operation past the retention window.
    pub fn purge_expired(&self, now: i64) -> SyncResult<Vec<Operation>> {
        self.purge_older_than(now, self.retention)
    }

    /// Purges expired operations, but only when the queue is full.
    pub fn purge_if_full(&self, now: i64) -> SyncResult<Vec<Operation>> {
        let mut state = self.state.lock();
        if state.ops.len() < self.max_size {
            return Ok(Vec::new());
        }
        self.purge_locked(&mut state, now, self.retention)
    }

    /// Operations older than `max_age`, oldest first, without removing them.
    pub fn older_than(&self, now: i64, max_age: Duration) -> Vec<Operation> {
        let state = self.state.lock();
        Self::collect_older(&state, now, max_age)
    }

    fn collect_older(state: &QueueState, now: i64, max_age: Duration) -> Vec<Operation> {
        let limit = millis(max_age);
        let mut old: Vec<Operation> = state
            .ops
            .values()
            .filter(|op| op.age_millis(now) > limit)
            .cloned()
            .collect();
        old.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.sequence.cmp(&b.sequence)));
        old
    }

    fn purge_locked(
        &self,
        state: &mut QueueState,
        now: i64,
        max_age: Duration,
    ) -> SyncResult<Vec<Operation>> {
        let old = Self::collect_older(state, now, max_age);
        let mut purged = Vec::with_capacity(old.len());
        for op in old {
            self.store.delete(&key_for(&op.id))?;
            state.ops.remove(&op.id);
            debug!(operation_id = %op.id, table = %op.table, "purged expired operation");
            purged.push(op);
        }
        Ok(purged)
    }
}
