//! Error types for the sync engine.

use std::fmt;
use std::time::Duration;
use syncq_protocol::{OperationId, ProtocolError};
use syncq_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for remote store calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors surfaced synchronously by the engine.
///
/// Failures inside a sync pass never show up here; they are folded into
/// stats and events.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Persistent store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation construction or codec failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The queue is full and nothing is old enough to purge.
    #[error("queue is full ({capacity} operations) and nothing is past retention")]
    CapacityExceeded {
        /// Configured maximum queue size.
        capacity: usize,
    },

    /// No queued operation has this ID.
    #[error("unknown operation {0}")]
    UnknownOperation(OperationId),

    /// The operation is queued but not waiting on a manual conflict.
    #[error("operation {0} has no pending conflict")]
    NotHeld(OperationId),

    /// A sync pass is already running.
    #[error("a sync pass is already in flight")]
    SyncInProgress,

    /// The background scheduler needs a Tokio runtime.
    #[error("no Tokio runtime available to run the scheduler")]
    NoRuntime,
}

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Network, timeout or server hiccup. Worth retrying.
    Transient,
    /// The store rejected the write (validation, constraint). Retrying
    /// will not help.
    Permanent,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteErrorKind::Transient => "transient",
            RemoteErrorKind::Permanent => "permanent",
        })
    }
}

/// Error returned by a [`crate::RemoteStore`] call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} remote error: {message}")]
pub struct RemoteError {
    /// Retry classification.
    pub kind: RemoteErrorKind,
    /// Error message.
    pub message: String,
}

impl RemoteError {
    /// Creates a retryable error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Creates a non-retryable error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Creates the error reported when a call exceeds its timeout.
    pub fn timeout(after: Duration) -> Self {
        Self::transient(format!("request timed out after {after:?}"))
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }
}
