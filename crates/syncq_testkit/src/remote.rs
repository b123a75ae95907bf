//! A remote store wrapper that records and shapes every call.

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncq_engine::{MemoryRemoteStore, RemoteError, RemoteResult, RemoteStore};
use syncq_protocol::Fields;

/// Kind of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `delete`
    Delete,
    /// `fetch_by_id`
    Fetch,
}

/// One logged call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    /// Call kind.
    pub kind: CallKind,
    /// Target table.
    pub table: String,
    /// Target row, if the call names one.
    pub id: Option<String>,
    /// Payload sent, if any.
    pub payload: Option<Fields>,
}

/// Remote store for tests.
///
/// Wraps a [`MemoryRemoteStore`] and adds call counting, a dispatch log,
/// concurrency tracking, artificial latency, a gate that holds calls until
/// opened, and scripted failures.
pub struct InstrumentedRemote {
    inner: MemoryRemoteStore,
    counts: Mutex<HashMap<CallKind, usize>>,
    log: Mutex<Vec<RemoteCall>>,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    latency: Mutex<Duration>,
    gate: Mutex<bool>,
    gate_cv: Condvar,
    failures: Mutex<VecDeque<(Option<CallKind>, RemoteError)>>,
    always_fail: Mutex<Option<RemoteError>>,
}

impl InstrumentedRemote {
    /// Creates an empty, open, instant remote.
    pub fn new() -> Self {
        Self {
            inner: MemoryRemoteStore::new(),
            counts: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
            gate: Mutex::new(true),
            gate_cv: Condvar::new(),
            failures: Mutex::new(VecDeque::new()),
            always_fail: Mutex::new(None),
        }
    }

    /// Creates a shared instance.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The wrapped store, for seeding and inspecting rows.
    pub fn store(&self) -> &MemoryRemoteStore {
        &self.inner
    }

    /// Number of calls of one kind.
    pub fn calls(&self, kind: CallKind) -> usize {
        self.counts.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Number of writes (insert, update, delete).
    pub fn writes(&self) -> usize {
        self.calls(CallKind::Insert) + self.calls(CallKind::Update) + self.calls(CallKind::Delete)
    }

    /// Every call so far, in order.
    pub fn log(&self) -> Vec<RemoteCall> {
        self.log.lock().clone()
    }

    /// Payloads of every write, in order.
    pub fn written_payloads(&self) -> Vec<Fields> {
        self.log
            .lock()
            .iter()
            .filter(|call| call.kind != CallKind::Fetch)
            .filter_map(|call| call.payload.clone())
            .collect()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    /// Number of calls in flight right now.
    pub fn in_flight(&self) -> usize {
        self.concurrent.load(Ordering::SeqCst)
    }

    /// Adds a fixed delay to every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Closes the gate: calls block until [`Self::open_gate`].
    pub fn close_gate(&self) {
        *self.gate.lock() = false;
    }

    /// Opens the gate and releases blocked calls.
    pub fn open_gate(&self) {
        *self.gate.lock() = true;
        self.gate_cv.notify_all();
    }

    /// Fails the next call with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.failures.lock().push_back((None, error));
    }

    /// Fails the next call of `kind` with `error`.
    pub fn fail_next_of(&self, kind: CallKind, error: RemoteError) {
        self.failures.lock().push_back((Some(kind), error));
    }

    /// Fails every call with `error` until cleared with `None`.
    pub fn fail_always(&self, error: Option<RemoteError>) {
        *self.always_fail.lock() = error;
    }

    fn enter(&self, call: RemoteCall) -> RemoteResult<InFlight<'_>> {
        let kind = call.kind;
        *self.counts.lock().entry(kind).or_insert(0) += 1;
        self.log.lock().push(call);

        let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.concurrent);

        {
            let mut open = self.gate.lock();
            while !*open {
                self.gate_cv.wait(&mut open);
            }
        }
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        if let Some(err) = self.always_fail.lock().clone() {
            return Err(err);
        }
        let mut failures = self.failures.lock();
        let scripted = failures
            .iter()
            .position(|(only, _)| only.map_or(true, |k| k == kind));
        if let Some((_, err)) = scripted.and_then(|idx| failures.remove(idx)) {
            return Err(err);
        }
        Ok(guard)
    }
}

impl Default for InstrumentedRemote {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RemoteStore for InstrumentedRemote {
    fn insert(&self, table: &str, payload: &Fields) -> RemoteResult<Fields> {
        let _call = self.enter(RemoteCall {
            kind: CallKind::Insert,
            table: table.to_string(),
            id: None,
            payload: Some(payload.clone()),
        })?;
        self.inner.insert(table, payload)
    }

    fn update(&self, table: &str, id: &str, payload: &Fields) -> RemoteResult<Fields> {
        let _call = self.enter(RemoteCall {
            kind: CallKind::Update,
            table: table.to_string(),
            id: Some(id.to_string()),
            payload: Some(payload.clone()),
        })?;
        self.inner.update(table, id, payload)
    }

    fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        let _call = self.enter(RemoteCall {
            kind: CallKind::Delete,
            table: table.to_string(),
            id: Some(id.to_string()),
            payload: None,
        })?;
        self.inner.delete(table, id)
    }

    fn fetch_by_id(&self, table: &str, id: &str) -> RemoteResult<Option<Fields>> {
        let _call = self.enter(RemoteCall {
            kind: CallKind::Fetch,
            table: table.to_string(),
            id: Some(id.to_string()),
            payload: None,
        })?;
        self.inner.fetch_by_id(table, id)
    }
}
