//! Sync passes and the background loop that triggers them.
//!
//! A pass snapshots the queued operations when it starts and walks that
//! snapshot in sync order, one operation at a time, applying each remote
//! result back to the queue. Submissions made during a pass wait for the
//! next one. At most one pass runs at any moment; a second request while
//! one is in flight is refused rather than queued.

use crate::context::SyncContext;
use crate::error::{RemoteError, RemoteResult, SyncError, SyncResult};
use crate::events::SyncEvent;
use crate::notifier::ConflictNotice;
use crate::queue::{millis, FailureOutcome};
use crate::remote::RemoteStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncq_protocol::{
    now_millis, Action, ConflictDetails, Fields, Operation, OperationId, Reconciliation,
    SyncOutcome, Winner,
};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassTrigger {
    /// The periodic timer.
    Interval,
    /// Connectivity came back.
    Reconnect,
    /// A submission while online.
    Submission,
    /// An explicit `force_sync`.
    Manual,
}

impl PassTrigger {
    /// Forced passes keep dispatching even if connectivity drops.
    pub fn is_forced(&self) -> bool {
        matches!(self, PassTrigger::Manual)
    }
}

impl fmt::Display for PassTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PassTrigger::Interval => "interval",
            PassTrigger::Reconnect => "reconnect",
            PassTrigger::Submission => "submission",
            PassTrigger::Manual => "manual",
        })
    }
}

/// Summary of one sync pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    /// What started the pass.
    pub trigger: PassTrigger,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Elapsed time.
    pub duration: Duration,
    /// Operations dispatched.
    pub attempted: usize,
    /// Operations that left the queue successfully.
    pub synced: usize,
    /// Failed attempts that will be retried.
    pub retrying: usize,
    /// Operations dropped after a failure.
    pub dropped: usize,
    /// Operations parked on a manual conflict.
    pub held: usize,
    /// Results discarded because the operation was cancelled meanwhile.
    pub cancelled: usize,
    /// The pass stopped early because connectivity dropped.
    pub interrupted: bool,
    /// Per-operation outcomes, in dispatch order.
    pub outcomes: Vec<SyncOutcome>,
}

impl PassReport {
    fn new(trigger: PassTrigger) -> Self {
        Self {
            trigger,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            attempted: 0,
            synced: 0,
            retrying: 0,
            dropped: 0,
            held: 0,
            cancelled: 0,
            interrupted: false,
            outcomes: Vec::new(),
        }
    }

    /// Returns true if every attempted operation synced.
    pub fn is_clean(&self) -> bool {
        self.retrying == 0 && self.dropped == 0 && self.held == 0 && !self.interrupted
    }
}

enum Dispatch {
    Synced(SyncOutcome),
    Failed(RemoteError),
    Held(ConflictDetails),
}

/// Clears the pass flag when a pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct InFlight<'a>(&'a Mutex<Option<OperationId>>);

impl<'a> InFlight<'a> {
    fn mark(slot: &'a Mutex<Option<OperationId>>, id: OperationId) -> Self {
        *slot.lock() = Some(id);
        Self(slot)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

struct BackgroundTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    ctx: Arc<SyncContext>,
    pass_active: AtomicBool,
    in_flight: Mutex<Option<OperationId>>,
    nudge: Notify,
    task: Mutex<Option<BackgroundTask>>,
}

/// Runs sync passes on demand and in the background.
#[derive(Clone)]
pub(crate) struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

impl SyncScheduler {
    pub(crate) fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                ctx,
                pass_active: AtomicBool::new(false),
                in_flight: Mutex::new(None),
                nudge: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn is_pass_active(&self) -> bool {
        self.inner.pass_active.load(Ordering::Acquire)
    }

    pub(crate) fn in_flight(&self) -> Option<OperationId> {
        *self.inner.in_flight.lock()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Wakes the background loop for an extra pass.
    pub(crate) fn nudge(&self) {
        if self.is_running() {
            self.inner.nudge.notify_one();
        }
    }

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// [`SyncError::SyncInProgress`] if another pass is running.
    pub(crate) async fn run_pass(&self, trigger: PassTrigger) -> SyncResult<PassReport> {
        let Some(_guard) = PassGuard::acquire(&self.inner.pass_active) else {
            debug!(%trigger, "sync pass already in flight");
            return Err(SyncError::SyncInProgress);
        };
        let ctx = &self.inner.ctx;
        let started = Instant::now();
        let mut report = PassReport::new(trigger);
        let mut candidates = ctx.queue.snapshot_for_pass();
        debug!(%trigger, candidates = candidates.len(), "sync pass started");

        loop {
            if !trigger.is_forced() && !ctx.monitor.is_online() {
                info!(%trigger, "connectivity lost, stopping pass");
                report.interrupted = true;
                break;
            }
            let Some(op) = ctx.queue.next_for_sync(now_millis(), &candidates) else {
                break;
            };
            candidates.remove(&op.id);
            report.attempted += 1;

            let dispatch = {
                let _in_flight = InFlight::mark(&self.inner.in_flight, op.id);
                self.dispatch(&op).await
            };
            self.apply(&op, dispatch, &mut report);
        }

        report.duration = started.elapsed();
        ctx.stats.record_pass(Utc::now(), report.duration);
        info!(
            %trigger,
            attempted = report.attempted,
            synced = report.synced,
            retrying = report.retrying,
            dropped = report.dropped,
            held = report.held,
            elapsed_ms = u64::try_from(report.duration.as_millis()).unwrap_or(u64::MAX),
            "sync pass finished"
        );
        ctx.emit(SyncEvent::PassCompleted(report.clone()));
        ctx.emit_stats();
        Ok(report)
    }

    async fn dispatch(&self, op: &Operation) -> Dispatch {
        let ctx = &self.inner.ctx;

        if op.action == Action::Insert {
            if let Some(record_id) = op.record_id.clone().filter(|_| op.retry_count > 0) {
                let (table, id) = (op.table.clone(), record_id.clone());
                match self.call(move |remote| remote.fetch_by_id(&table, &id)).await {
                    Ok(Some(row)) => {
                        debug!(operation_id = %op.id, %record_id, "earlier insert attempt landed");
                        return Dispatch::Synced(SyncOutcome::success(op.id, Some(row)));
                    }
                    Ok(None) => {}
                    Err(err) => return Dispatch::Failed(err),
                }
            }
            let (table, payload) = (op.table.clone(), op.payload.clone());
            return match self.call(move |remote| remote.insert(&table, &payload)).await {
                Ok(row) => Dispatch::Synced(SyncOutcome::success(op.id, Some(row))),
                Err(err) => Dispatch::Failed(err),
            };
        }

        let Some(record_id) = op.record_id.clone() else {
            return Dispatch::Failed(RemoteError::permanent(format!(
                "{} operation has no record id",
                op.action
            )));
        };

        let (table, id) = (op.table.clone(), record_id.clone());
        let current = match self.call(move |remote| remote.fetch_by_id(&table, &id)).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                debug!(operation_id = %op.id, %record_id, "remote row is gone, nothing to write");
                return Dispatch::Synced(SyncOutcome::success(op.id, None));
            }
            Err(err) => return Dispatch::Failed(err),
        };

        match ctx.resolver.reconcile(op, &current) {
            Reconciliation::Clean => match self.write(op, record_id, op.payload.clone()).await {
                Ok(row) => Dispatch::Synced(SyncOutcome::success(op.id, row)),
                Err(err) => Dispatch::Failed(err),
            },
            Reconciliation::Resolved(resolution) => {
                ctx.stats.record_conflict();
                info!(
                    operation_id = %op.id,
                    strategy = %resolution.strategy,
                    winner = ?resolution.winner,
                    fields = ?resolution.conflict_details.conflicting_fields,
                    "conflict resolved"
                );
                match resolution.winner {
                    Winner::Remote => Dispatch::Synced(
                        SyncOutcome::success(op.id, Some(current)).with_resolution(resolution),
                    ),
                    Winner::Local | Winner::Merged => {
                        let payload = resolution.resolved_payload.clone();
                        match self.write(op, record_id, payload).await {
                            Ok(row) => Dispatch::Synced(
                                SyncOutcome::success(op.id, row).with_resolution(resolution),
                            ),
                            Err(err) => Dispatch::Failed(err),
                        }
                    }
                }
            }
            Reconciliation::Deferred(details) => {
                ctx.stats.record_conflict();
                Dispatch::Held(details)
            }
        }
    }

    async fn write(
        &self,
        op: &Operation,
        record_id: String,
        payload: Fields,
    ) -> RemoteResult<Option<Fields>> {
        let table = op.table.clone();
        match op.action {
            Action::Delete => self
                .call(move |remote| remote.delete(&table, &record_id))
                .await
                .map(|()| None),
            Action::Update | Action::Insert => self
                .call(move |remote| remote.update(&table, &record_id, &payload))
                .await
                .map(Some),
        }
    }

    /// Runs a remote call on the blocking pool under the request timeout.
    ///
    /// A timed-out call still counts as a failed attempt, but this does not
    /// return until the blocking call has finished, so the next remote call
    /// never overlaps it.
    async fn call<T, F>(&self, f: F) -> RemoteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn RemoteStore) -> RemoteResult<T> + Send + 'static,
    {
        let remote = Arc::clone(&self.inner.ctx.remote);
        let limit = self.inner.ctx.config.request_timeout;
        let mut handle = tokio::task::spawn_blocking(move || f(remote.as_ref()));
        match time::timeout(limit, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(RemoteError::transient(format!(
                "remote call did not complete: {err}"
            ))),
            Err(_) => {
                warn!(timeout = ?limit, "remote call timed out, waiting for it to return");
                let landed = matches!(handle.await, Ok(Ok(_)));
                debug!(landed, "timed-out remote call returned");
                Err(RemoteError::timeout(limit))
            }
        }
    }

    fn apply(&self, op: &Operation, dispatch: Dispatch, report: &mut PassReport) {
        let ctx = &self.inner.ctx;
        match dispatch {
            Dispatch::Synced(outcome) => match ctx.queue.remove(&op.id) {
                Ok(Some(_)) => {
                    ctx.stats.record_synced();
                    report.synced += 1;
                    debug!(
                        operation_id = %op.id,
                        table = %op.table,
                        action = %op.action,
                        "operation synced"
                    );
                    report.outcomes.push(outcome.clone());
                    ctx.emit(SyncEvent::OperationSynced(outcome));
                }
                Ok(None) => Self::cancelled_meanwhile(op, report),
                Err(err) => {
                    error!(operation_id = %op.id, error = %err, "synced operation could not be dequeued")
                }
            },
            Dispatch::Failed(err) => self.apply_failure(op, err, report),
            Dispatch::Held(details) => match ctx.queue.hold(&op.id, details.clone()) {
                Ok(Some(_)) => {
                    report.held += 1;
                    let notice = ConflictNotice::new(op, details);
                    warn!(
                        operation_id = %op.id,
                        table = %op.table,
                        fields = ?notice.details.conflicting_fields,
                        "conflict held for manual resolution"
                    );
                    if catch_unwind(AssertUnwindSafe(|| ctx.notifier.notify(&notice))).is_err() {
                        warn!(operation_id = %op.id, "conflict notifier panicked");
                    }
                    report.outcomes.push(SyncOutcome::failure(
                        op.id,
                        "conflict held for manual resolution",
                    ));
                    ctx.emit(SyncEvent::ConflictHeld(notice));
                }
                Ok(None) => Self::cancelled_meanwhile(op, report),
                Err(err) => {
                    error!(operation_id = %op.id, error = %err, "could not persist held conflict")
                }
            },
        }
    }

    fn apply_failure(&self, op: &Operation, err: RemoteError, report: &mut PassReport) {
        let ctx = &self.inner.ctx;
        let retry = &ctx.config.retry;

        let result = if !err.is_retryable() && retry.fail_fast_permanent {
            ctx.queue.remove(&op.id).map(|removed| {
                removed.map(|mut dropped| {
                    dropped.retry_count = dropped.retry_count.saturating_add(1);
                    FailureOutcome::Exhausted(dropped)
                })
            })
        } else {
            let delay = retry.delay_for_attempt(op.retry_count.saturating_add(1));
            let next_attempt_at =
                (!delay.is_zero()).then(|| now_millis().saturating_add(millis(delay)));
            ctx.queue.record_failure(&op.id, next_attempt_at)
        };

        let outcome = SyncOutcome::failure(op.id, err.to_string());
        match result {
            Ok(Some(FailureOutcome::Retrying(updated))) => {
                report.retrying += 1;
                warn!(
                    operation_id = %op.id,
                    retry_count = updated.retry_count,
                    max_retries = updated.max_retries,
                    error = %err,
                    "sync attempt failed, will retry"
                );
                report.outcomes.push(outcome.clone());
                ctx.emit(SyncEvent::OperationFailed {
                    outcome,
                    retry_count: updated.retry_count,
                    will_retry: true,
                });
            }
            Ok(Some(FailureOutcome::Exhausted(dropped))) => {
                ctx.stats.record_failed();
                report.dropped += 1;
                error!(
                    operation_id = %op.id,
                    table = %op.table,
                    retry_count = dropped.retry_count,
                    error = %err,
                    "operation dropped"
                );
                report.outcomes.push(outcome.clone());
                ctx.emit(SyncEvent::OperationFailed {
                    outcome,
                    retry_count: dropped.retry_count,
                    will_retry: false,
                });
            }
            Ok(None) => Self::cancelled_meanwhile(op, report),
            Err(storage) => {
                error!(operation_id = %op.id, error = %storage, "could not record failed attempt")
            }
        }
    }

    fn cancelled_meanwhile(op: &Operation, report: &mut PassReport) {
        debug!(operation_id = %op.id, "operation cancelled during dispatch, result discarded");
        report.cancelled += 1;
    }

    /// Spawns the background loop. Returns false if it is already running.
    pub(crate) fn start(&self) -> SyncResult<bool> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let mut task = self.inner.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Ok(false);
        }

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut online = self.inner.ctx.monitor.watch();
        let interval = self.inner.ctx.config.sync_interval;
        let this = self.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(?interval, "sync scheduler started");

            loop {
                let trigger = tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        this.inner.ctx.monitor.refresh();
                        PassTrigger::Interval
                    }
                    changed = online.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*online.borrow_and_update() {
                            continue;
                        }
                        PassTrigger::Reconnect
                    }
                    _ = this.inner.nudge.notified() => PassTrigger::Submission,
                };

                if !this.inner.ctx.monitor.is_online() {
                    debug!(%trigger, "offline, skipping pass");
                    continue;
                }
                match this.run_pass(trigger).await {
                    Ok(_) | Err(SyncError::SyncInProgress) => {}
                    Err(err) => warn!(%trigger, error = %err, "sync pass failed"),
                }
            }

            info!("sync scheduler stopped");
        });

        *task = Some(BackgroundTask { shutdown, handle });
        Ok(true)
    }

    /// Stops the background loop, waiting for a running pass to finish.
    pub(crate) async fn stop(&self) {
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            if let Err(err) = task.handle.await {
                if err.is_panic() {
                    error!("sync scheduler task panicked");
                }
            }
        }
    }

    /// Signals the background loop to stop without waiting.
    pub(crate) fn signal_stop(&self) {
        if let Some(task) = self.inner.task.lock().take() {
            let _ = task.shutdown.send(true);
        }
    }
}
