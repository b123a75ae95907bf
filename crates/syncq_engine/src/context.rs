//! State shared by the facade and the scheduler.

use crate::config::SyncConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::events::{Listeners, SyncEvent};
use crate::notifier::ConflictNotifier;
use crate::queue::OperationQueue;
use crate::remote::RemoteStore;
use crate::stats::{StatsTracker, SyncStats};
use std::sync::Arc;
use syncq_protocol::ConflictResolver;

pub(crate) struct SyncContext {
    pub(crate) config: SyncConfig,
    pub(crate) queue: OperationQueue,
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) resolver: ConflictResolver,
    pub(crate) notifier: Arc<dyn ConflictNotifier>,
    pub(crate) monitor: ConnectivityMonitor,
    pub(crate) stats: StatsTracker,
    pub(crate) events: Listeners<SyncEvent>,
}

impl SyncContext {
    pub(crate) fn emit(&self, event: SyncEvent) {
        self.events.emit(&event);
    }

    pub(crate) fn stats(&self) -> SyncStats {
        self.stats.snapshot(
            self.monitor.is_online(),
            self.queue.len(),
            self.queue.held_count(),
        )
    }

    pub(crate) fn emit_stats(&self) {
        if !self.events.is_empty() {
            self.emit(SyncEvent::StatsChanged(self.stats()));
        }
    }
}
