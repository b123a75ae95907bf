//! The sync engine facade.

use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, ManualProbe};
use crate::context::SyncContext;
use crate::error::{SyncError, SyncResult};
use crate::events::{ListenerId, Listeners, SyncEvent};
use crate::notifier::{ConflictNotice, ConflictNotifier, NoopNotifier};
use crate::queue::OperationQueue;
use crate::remote::RemoteStore;
use crate::scheduler::{PassReport, PassTrigger, SyncScheduler};
use crate::stats::{EngineState, OperationState, StatsTracker, SyncStats};
use serde::Serialize;
use std::sync::Arc;
use syncq_protocol::{
    now_millis, Action, ConflictResolver, Fields, Operation, OperationId, SubmitOptions,
};
use syncq_storage::PersistentStore;
use tracing::{debug, info, warn};

/// A caller's decision on a held conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ManualDecision {
    /// Write the local intent over the current remote row.
    KeepLocal,
    /// Drop the local intent and keep the remote row.
    AcceptRemote,
    /// Write these fields instead of the local intent.
    Replace(Fields),
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn PersistentStore>,
    config: SyncConfig,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    notifier: Option<Arc<dyn ConflictNotifier>>,
}

impl SyncEngineBuilder {
    /// Sets the engine configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the connectivity probe. Defaults to always online.
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Sets the held-conflict notifier. Defaults to dropping notices.
    pub fn with_notifier(mut self, notifier: Arc<dyn ConflictNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Opens the queue and builds the engine.
    ///
    /// # Errors
    ///
    /// Fails if the persisted queue cannot be read.
    pub fn build(self) -> SyncResult<SyncEngine> {
        let config = self.config;
        let queue = OperationQueue::open(self.store, config.max_queue_size, config.retention)?;
        let resolver = ConflictResolver::new(config.conflict_strategy)
            .with_volatile_fields(config.volatile_fields.iter().cloned())
            .with_modified_field(config.modified_field.clone());
        let probe: Arc<dyn ConnectivityProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(ManualProbe::default()),
        };
        let notifier: Arc<dyn ConflictNotifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(NoopNotifier),
        };

        info!(
            pending = queue.len(),
            strategy = %config.conflict_strategy,
            interval = ?config.sync_interval,
            "sync engine ready"
        );

        let ctx = Arc::new(SyncContext {
            config,
            queue,
            remote: self.remote,
            resolver,
            notifier,
            monitor: ConnectivityMonitor::new(probe),
            stats: StatsTracker::default(),
            events: Listeners::new(),
        });

        let weak = Arc::downgrade(&ctx);
        ctx.monitor
            .subscribe(Arc::new(move |event: &ConnectivityEvent| {
                if let Some(ctx) = weak.upgrade() {
                    ctx.emit(SyncEvent::ConnectivityChanged(*event));
                    ctx.emit_stats();
                }
            }));

        Ok(SyncEngine {
            scheduler: SyncScheduler::new(Arc::clone(&ctx)),
            ctx,
        })
    }
}

/// Offline-first operation queue with background synchronization.
///
/// Mutations are accepted immediately into a durable queue and replayed
/// against a [`RemoteStore`] in priority order whenever connectivity allows.
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::builder(remote, store).build()?;
/// engine.start()?;
///
/// let id = engine.submit("todos", Action::Insert, payload, SubmitOptions::new())?;
/// let report = engine.force_sync().await?;
/// ```
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    scheduler: SyncScheduler,
}

impl SyncEngine {
    /// Starts building an engine over a remote store and a persistent store.
    pub fn builder(
        remote: Arc<dyn RemoteStore>,
        store: Arc<dyn PersistentStore>,
    ) -> SyncEngineBuilder {
        SyncEngineBuilder {
            remote,
            store,
            config: SyncConfig::default(),
            probe: None,
            notifier: None,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.ctx.config
    }

    /// Queues a mutation. Returns its ID once it is durably stored.
    ///
    /// Dependencies that are not queued count as already resolved.
    ///
    /// # Errors
    ///
    /// - [`SyncError::Protocol`] for an invalid submission
    /// - [`SyncError::CapacityExceeded`] when the queue is full and nothing
    ///   is past retention
    pub fn submit(
        &self,
        table: impl Into<String>,
        action: Action,
        payload: Fields,
        options: SubmitOptions,
    ) -> SyncResult<OperationId> {
        let ctx = &self.ctx;
        let op = Operation::new(
            table,
            action,
            payload,
            options,
            &ctx.config.id_field,
            ctx.config.default_max_retries,
        )?;

        let expired = ctx.queue.purge_if_full(now_millis())?;
        if !expired.is_empty() {
            ctx.stats.record_expired(expired.len() as u64);
            warn!(count = expired.len(), "queue full, purged operations past retention");
            for old in &expired {
                ctx.emit(SyncEvent::OperationExpired(old.id));
            }
        }

        for dep in &op.dependencies {
            if !ctx.queue.contains(dep) {
                debug!(operation_id = %op.id, dependency = %dep, "dependency not queued, treating as resolved");
            }
        }

        let (id, table, priority) = (op.id, op.table.clone(), op.priority);
        ctx.queue.add(op)?;
        debug!(operation_id = %id, %table, %action, %priority, "operation queued");

        ctx.emit(SyncEvent::OperationQueued {
            operation_id: id,
            table,
            action,
            priority,
        });
        ctx.emit_stats();

        if ctx.config.sync_on_submit && ctx.monitor.is_online() {
            self.scheduler.nudge();
        }
        Ok(id)
    }

    /// Removes a queued operation. Returns false if it was not queued.
    ///
    /// If the operation's remote call is already in flight, its result is
    /// discarded when it returns.
    pub fn cancel(&self, id: &OperationId) -> SyncResult<bool> {
        match self.ctx.queue.remove(id)? {
            Some(op) => {
                info!(operation_id = %id, table = %op.table, "operation cancelled");
                self.ctx.emit(SyncEvent::OperationCancelled(*id));
                self.ctx.emit_stats();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs a pass now, even if connectivity is reported down.
    ///
    /// # Errors
    ///
    /// [`SyncError::SyncInProgress`] if a pass is already running.
    pub async fn force_sync(&self) -> SyncResult<PassReport> {
        self.scheduler.run_pass(PassTrigger::Manual).await
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> SyncStats {
        self.ctx.stats()
    }

    /// Registers an event listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.ctx.events.add(Arc::new(listener))
    }

    /// Removes an event listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.ctx.events.remove(id)
    }

    /// Starts the background scheduler on the current Tokio runtime.
    ///
    /// Returns false if it was already running.
    pub fn start(&self) -> SyncResult<bool> {
        self.scheduler.start()
    }

    /// Stops the background scheduler, letting a running pass finish.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    /// Returns true while the background scheduler runs.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Returns the coarse engine state.
    pub fn state(&self) -> EngineState {
        if !self.ctx.monitor.is_online() {
            EngineState::Offline
        } else if self.scheduler.is_pass_active() {
            EngineState::OnlineSyncing
        } else {
            EngineState::OnlineIdle
        }
    }

    /// Returns where a queued operation stands, or `None` if it is not queued.
    pub fn operation_state(&self, id: &OperationId) -> Option<OperationState> {
        let op = self.ctx.queue.get(id)?;
        if self.scheduler.in_flight() == Some(*id) {
            Some(OperationState::Syncing)
        } else if op.is_held() || self.ctx.queue.blocked_by_conflicts().contains(id) {
            Some(OperationState::Blocked)
        } else {
            Some(OperationState::Pending)
        }
    }

    /// Returns every queued operation in sync order.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.ctx.queue.all()
    }

    /// Returns the current connectivity.
    pub fn is_online(&self) -> bool {
        self.ctx.monitor.is_online()
    }

    /// Feeds a connectivity reading from the host platform.
    ///
    /// Returns the edge if this reading flipped the state. Coming back
    /// online wakes the background scheduler.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        self.ctx.monitor.set_online(online)
    }

    /// Re-reads the connectivity probe.
    pub fn refresh_connectivity(&self) -> Option<ConnectivityEvent> {
        self.ctx.monitor.refresh()
    }

    /// Returns every conflict awaiting a manual decision.
    pub fn held_conflicts(&self) -> Vec<ConflictNotice> {
        self.ctx
            .queue
            .all()
            .into_iter()
            .filter_map(|op| {
                let details = op.held_conflict.clone()?;
                Some(ConflictNotice::new(&op, details))
            })
            .collect()
    }

    /// Decides a held conflict.
    ///
    /// `KeepLocal` and `Replace` requeue the operation with the remote row
    /// seen at hold time as its new baseline. `AcceptRemote` drops it.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnknownOperation`] or [`SyncError::NotHeld`].
    pub fn resolve_conflict(&self, id: &OperationId, decision: ManualDecision) -> SyncResult<()> {
        let ctx = &self.ctx;
        match &decision {
            ManualDecision::AcceptRemote => {
                let op = ctx.queue.get(id).ok_or(SyncError::UnknownOperation(*id))?;
                if !op.is_held() {
                    return Err(SyncError::NotHeld(*id));
                }
                ctx.queue.remove(id)?;
            }
            ManualDecision::KeepLocal => {
                ctx.queue.release(id, None)?;
            }
            ManualDecision::Replace(fields) => {
                ctx.queue.release(id, Some(fields.clone()))?;
            }
        }

        info!(operation_id = %id, ?decision, "held conflict resolved");
        ctx.emit(SyncEvent::ConflictResolved {
            operation_id: *id,
            decision,
        });
        ctx.emit_stats();
        if ctx.monitor.is_online() {
            self.scheduler.nudge();
        }
        Ok(())
    }

    /// Operations that cannot run until a held conflict is decided.
    pub fn blocked_operations(&self) -> Vec<OperationId> {
        self.ctx.queue.blocked_by_conflicts()
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.scheduler.signal_stop();
    }
}
