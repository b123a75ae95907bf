//! Engine fixtures.

use crate::observe::{EventRecorder, RecordingNotifier};
use crate::remote::InstrumentedRemote;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use syncq_engine::{ManualProbe, RetryConfig, SyncConfig, SyncEngine};
use syncq_protocol::Fields;
use syncq_storage::{FileStore, InMemoryStore, PersistentStore};
use tempfile::TempDir;

/// Converts a `json!` object into a payload.
///
/// # Panics
///
/// Panics if `value` is not a JSON object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Configuration for deterministic tests: no backoff, no background
/// nudges, and an interval long enough that passes only run when forced.
pub fn test_config() -> SyncConfig {
    SyncConfig::new()
        .with_retry(RetryConfig::without_backoff())
        .with_request_timeout(Duration::from_secs(5))
        .with_sync_interval(Duration::from_secs(3600))
        .with_sync_on_submit(false)
}

/// An engine wired to instrumented collaborators.
pub struct TestEngine {
    /// The engine under test.
    pub engine: SyncEngine,
    /// The remote it syncs to.
    pub remote: Arc<InstrumentedRemote>,
    /// The queue's backing store.
    pub store: Arc<dyn PersistentStore>,
    /// Connectivity probe; online by default.
    pub probe: Arc<ManualProbe>,
    /// Receives held conflicts.
    pub notifier: Arc<RecordingNotifier>,
    /// Every event the engine published.
    pub events: EventRecorder,
    config: SyncConfig,
    _temp_dir: Option<TempDir>,
}

impl TestEngine {
    /// Engine over in-memory storage with [`test_config`].
    pub fn memory() -> Self {
        Self::memory_with(test_config())
    }

    /// Engine over in-memory storage.
    pub fn memory_with(config: SyncConfig) -> Self {
        Self::assemble(
            config,
            Arc::new(InMemoryStore::new()),
            InstrumentedRemote::shared(),
            None,
        )
    }

    /// Engine over a file store in a fresh temporary directory.
    pub fn file_with(config: SyncConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::open(&temp_dir.path().join("queue")).expect("Failed to open file store");
        Self::assemble(config, Arc::new(store), InstrumentedRemote::shared(), Some(temp_dir))
    }

    /// Drops the engine and builds a fresh one over the same store and
    /// remote, as after a process restart.
    pub fn reopen(self) -> Self {
        let Self {
            engine,
            remote,
            store,
            config,
            _temp_dir,
            ..
        } = self;
        drop(engine);
        Self::assemble(config, store, remote, _temp_dir)
    }

    fn assemble(
        config: SyncConfig,
        store: Arc<dyn PersistentStore>,
        remote: Arc<InstrumentedRemote>,
        temp_dir: Option<TempDir>,
    ) -> Self {
        let probe = Arc::new(ManualProbe::new(true));
        let notifier = RecordingNotifier::shared();
        let engine = SyncEngine::builder(remote.clone(), Arc::clone(&store))
            .with_config(config.clone())
            .with_probe(probe.clone())
            .with_notifier(notifier.clone())
            .build()
            .expect("Failed to build engine");
        let (events, _) = EventRecorder::attach(&engine);

        Self {
            engine,
            remote,
            store,
            probe,
            notifier,
            events,
            config,
            _temp_dir: temp_dir,
        }
    }

    /// Flips the probe and feeds the reading to the engine.
    pub fn go_online(&self, online: bool) {
        self.probe.set(online);
        self.engine.refresh_connectivity();
    }
}

impl std::ops::Deref for TestEngine {
    type Target = SyncEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}
