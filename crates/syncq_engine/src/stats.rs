//! Engine statistics and state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Snapshot of engine statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStats {
    /// Current connectivity.
    pub is_online: bool,
    /// Operations still queued, held ones included.
    pub pending_operations: usize,
    /// Operations dropped after exhausting retries or failing permanently.
    pub failed_operations: u64,
    /// When the last pass finished.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Operations that reached the remote store.
    pub total_synced: u64,
    /// Conflicts detected, auto-resolved or held.
    pub total_conflicts: u64,
    /// Running average pass duration.
    pub average_sync_time: Duration,
    /// Operations purged past retention.
    pub expired_operations: u64,
    /// Operations waiting on a manual decision.
    pub held_conflicts: usize,
}

/// Coarse engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    /// Connectivity is down; nothing is dispatched.
    Offline,
    /// Online with no pass running.
    OnlineIdle,
    /// A pass is running.
    OnlineSyncing,
}

impl EngineState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(self, EngineState::OnlineSyncing)
    }

    /// Returns true if a pass could start now.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, EngineState::OnlineIdle)
    }
}

/// Where a queued operation stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationState {
    /// Eligible for a future pass.
    Pending,
    /// Its remote call is in flight.
    Syncing,
    /// Waiting on a manual decision, or on a dependency that is.
    Blocked,
}

/// Live counters behind [`SyncStats`].
#[derive(Default)]
pub(crate) struct StatsTracker {
    total_synced: AtomicU64,
    failed: AtomicU64,
    conflicts: AtomicU64,
    expired: AtomicU64,
    timing: RwLock<PassTiming>,
}

#[derive(Default)]
struct PassTiming {
    last_sync_time: Option<DateTime<Utc>>,
    average: Option<Duration>,
}

impl StatsTracker {
    pub(crate) fn record_synced(&self) {
        self.total_synced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired(&self, count: u64) {
        self.expired.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_pass(&self, finished_at: DateTime<Utc>, elapsed: Duration) {
        let mut timing = self.timing.write();
        timing.last_sync_time = Some(finished_at);
        timing.average = Some(match timing.average {
            Some(avg) => (avg + elapsed) / 2,
            None => elapsed,
        });
    }

    pub(crate) fn snapshot(&self, is_online: bool, pending: usize, held: usize) -> SyncStats {
        let timing = self.timing.read();
        SyncStats {
            is_online,
            pending_operations: pending,
            failed_operations: self.failed.load(Ordering::Relaxed),
            last_sync_time: timing.last_sync_time,
            total_synced: self.total_synced.load(Ordering::Relaxed),
            total_conflicts: self.conflicts.load(Ordering::Relaxed),
            average_sync_time: timing.average.unwrap_or_default(),
            expired_operations: self.expired.load(Ordering::Relaxed),
            held_conflicts: held,
        }
    }
}
