//! Observers for engine output.

use parking_lot::Mutex;
use std::sync::Arc;
use syncq_engine::{
    ConflictNotice, ConflictNotifier, ConnectivityEvent, ListenerId, OperationId, SyncEngine,
    SyncEvent,
};

/// Notifier that keeps every notice it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<ConflictNotice>>,
}

impl RecordingNotifier {
    /// Creates a shared, empty notifier.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Notices received so far.
    pub fn notices(&self) -> Vec<ConflictNotice> {
        self.notices.lock().clone()
    }

    /// Number of notices received.
    pub fn count(&self) -> usize {
        self.notices.lock().len()
    }
}

impl ConflictNotifier for RecordingNotifier {
    fn notify(&self, notice: &ConflictNotice) {
        self.notices.lock().push(notice.clone());
    }
}

/// Subscribes to an engine and keeps every event.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<SyncEvent>>>,
}

impl EventRecorder {
    /// Subscribes a new recorder to `engine`.
    pub fn attach(engine: &SyncEngine) -> (Self, ListenerId) {
        let recorder = Self::default();
        let sink = Arc::clone(&recorder.events);
        let id = engine.subscribe(move |event| sink.lock().push(event.clone()));
        (recorder, id)
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Number of events matching `pred`.
    pub fn count(&self, pred: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| pred(event)).count()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// IDs of synced operations, in order.
    pub fn synced(&self) -> Vec<OperationId> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::OperationSynced(outcome) => Some(outcome.operation_id),
                _ => None,
            })
            .collect()
    }

    /// Connectivity edges, in order.
    pub fn connectivity(&self) -> Vec<ConnectivityEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                SyncEvent::ConnectivityChanged(change) => Some(*change),
                _ => None,
            })
            .collect()
    }

    /// Number of completed passes.
    pub fn passes(&self) -> usize {
        self.count(|event| matches!(event, SyncEvent::PassCompleted(_)))
    }
}
