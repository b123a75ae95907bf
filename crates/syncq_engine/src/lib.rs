//! # syncq_engine
//!
//! Offline-first synchronization engine.
//!
//! Applications submit table mutations; the engine stores them in a
//! durable priority queue and replays them against a remote table store
//! whenever connectivity allows. Concurrent remote edits are detected with
//! per-operation baselines and reconciled by a configurable strategy.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   submit   ┌────────────────┐   pass    ┌──────────────┐
//! │ Application │ ─────────▶ │ OperationQueue │ ────────▶ │ RemoteStore  │
//! └─────────────┘            └────────────────┘           └──────────────┘
//!        ▲                          │ write-through
//!        │ SyncEvent                ▼
//!        └──────────────── PersistentStore
//! ```
//!
//! - [`SyncEngine`]: the facade
//! - [`OperationQueue`]: ordering, dependency gating, persistence
//! - [`ConnectivityMonitor`]: online/offline edges
//! - [`RemoteStore`]: what operations are replayed against
//!
//! ## Sync pass
//!
//! 1. Pick the highest-priority eligible operation not yet tried this pass
//! 2. Insert directly; for Update/Delete fetch the current row first
//! 3. Compare against the baseline, resolve any conflict
//! 4. Dequeue on success, back off or drop on failure, park on manual
//!    conflicts
//! 5. Repeat until nothing eligible remains, then publish stats

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connectivity;
mod context;
mod engine;
mod error;
mod events;
mod notifier;
mod queue;
mod remote;
mod scheduler;
mod stats;

pub use config::{RetryConfig, SyncConfig, DEFAULT_RETENTION};
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, ConnectivityProbe, ManualProbe};
pub use engine::{ManualDecision, SyncEngine, SyncEngineBuilder};
pub use error::{RemoteError, RemoteErrorKind, RemoteResult, SyncError, SyncResult};
pub use events::{Listener, ListenerId, Listeners, SyncEvent};
pub use notifier::{ConflictNotice, ConflictNotifier, NoopNotifier};
pub use queue::{sync_order, FailureOutcome, OperationQueue};
pub use remote::{MemoryRemoteStore, RemoteStore};
pub use scheduler::{PassReport, PassTrigger};
pub use stats::{EngineState, OperationState, SyncStats};

pub use syncq_protocol::{
    now_millis, Action, ConflictDetails, ConflictResolution, ConflictStrategy, Fields, Operation,
    OperationId, Priority, SubmitOptions, SyncOutcome, Winner,
};

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
