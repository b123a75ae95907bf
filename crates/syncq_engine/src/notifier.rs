//! User-facing notification of held conflicts.

use serde::Serialize;
use syncq_protocol::{ConflictDetails, Fields, Operation, OperationId};

/// Everything a user needs to decide a held conflict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictNotice {
    /// The held operation.
    pub operation_id: OperationId,
    /// Target table.
    pub table: String,
    /// Target row.
    pub record_id: Option<String>,
    /// The conflict itself.
    pub details: ConflictDetails,
}

impl ConflictNotice {
    /// Builds a notice for a held operation.
    pub fn new(op: &Operation, details: ConflictDetails) -> Self {
        Self {
            operation_id: op.id,
            table: op.table.clone(),
            record_id: op.record_id.clone(),
            details,
        }
    }

    /// The local intent.
    pub fn local(&self) -> &Fields {
        &self.details.local_payload
    }

    /// The row currently on the remote store.
    pub fn remote(&self) -> &Fields {
        &self.details.remote_snapshot
    }
}

/// Receives held-conflict notices.
///
/// Called synchronously from the sync pass; implementations should hand
/// the notice off rather than block. A panic is caught and logged.
pub trait ConflictNotifier: Send + Sync {
    /// Presents a conflict to the user.
    fn notify(&self, notice: &ConflictNotice);
}

impl<F> ConflictNotifier for F
where
    F: Fn(&ConflictNotice) + Send + Sync,
{
    fn notify(&self, notice: &ConflictNotice) {
        self(notice)
    }
}

/// A notifier that drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ConflictNotifier for NoopNotifier {
    fn notify(&self, _notice: &ConflictNotice) {}
}
