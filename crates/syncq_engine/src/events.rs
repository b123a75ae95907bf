//! Events published by the engine and the listener registry behind them.

use crate::connectivity::ConnectivityEvent;
use crate::engine::ManualDecision;
use crate::notifier::ConflictNotice;
use crate::scheduler::PassReport;
use crate::stats::SyncStats;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use syncq_protocol::{Action, OperationId, Priority, SyncOutcome};
use tracing::warn;

/// Something observable happened inside the engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// An operation was accepted into the queue.
    OperationQueued {
        /// The new operation.
        operation_id: OperationId,
        /// Target table.
        table: String,
        /// Mutation kind.
        action: Action,
        /// Scheduling priority.
        priority: Priority,
    },
    /// An operation reached the remote store and left the queue.
    OperationSynced(SyncOutcome),
    /// A remote attempt failed.
    OperationFailed {
        /// The failed attempt.
        outcome: SyncOutcome,
        /// Failures recorded so far.
        retry_count: u32,
        /// False when the operation was dropped.
        will_retry: bool,
    },
    /// An operation was cancelled by the caller.
    OperationCancelled(OperationId),
    /// An operation was purged for exceeding the retention window.
    OperationExpired(OperationId),
    /// A conflict is waiting for a manual decision.
    ConflictHeld(ConflictNotice),
    /// A held conflict was decided.
    ConflictResolved {
        /// The formerly held operation.
        operation_id: OperationId,
        /// What the caller decided.
        decision: ManualDecision,
    },
    /// The connectivity state flipped.
    ConnectivityChanged(ConnectivityEvent),
    /// A sync pass finished.
    PassCompleted(PassReport),
    /// The statistics snapshot changed.
    StatsChanged(SyncStats),
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// A subscribed callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Registry of callbacks for one event type.
///
/// Callbacks run synchronously on the emitting thread, in subscription
/// order. A panicking callback is logged and the rest still run.
pub struct Listeners<E> {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> Listeners<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Registers a callback.
    pub fn add(&self, listener: Listener<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, listener));
        id
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    /// Returns the number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers an event to every registered callback.
    pub fn emit(&self, event: &E) {
        // Snapshot so callbacks may subscribe or unsubscribe.
        let snapshot: Vec<(ListenerId, Listener<E>)> = self.entries.read().clone();
        for (id, listener) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(listener = %id, "event listener panicked");
            }
        }
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}
