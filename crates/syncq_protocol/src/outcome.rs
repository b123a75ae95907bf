//! Per-operation sync outcomes.

use crate::conflict::ConflictResolution;
use crate::operation::{Fields, OperationId};
use serde::{Deserialize, Serialize};

/// Result of one operation's sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Whether the attempt succeeded.
    pub success: bool,
    /// The operation attempted.
    pub operation_id: OperationId,
    /// Failure description.
    pub error: Option<String>,
    /// Conflict resolution applied, if a conflict was detected.
    pub conflict_resolution: Option<ConflictResolution>,
    /// Remote row after the attempt, when known.
    pub remote_snapshot: Option<Fields>,
}

impl SyncOutcome {
    /// Creates a successful outcome.
    pub fn success(operation_id: OperationId, remote_snapshot: Option<Fields>) -> Self {
        Self {
            success: true,
            operation_id,
            error: None,
            conflict_resolution: None,
            remote_snapshot,
        }
    }

    /// Creates a failed outcome.
    pub fn failure(operation_id: OperationId, error: impl Into<String>) -> Self {
        Self {
            success: false,
            operation_id,
            error: Some(error.into()),
            conflict_resolution: None,
            remote_snapshot: None,
        }
    }

    /// Attaches the conflict resolution that led to this outcome.
    pub fn with_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = Some(resolution);
        self
    }
}
