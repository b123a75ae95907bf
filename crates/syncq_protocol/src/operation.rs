//! Queued operations.

use crate::conflict::ConflictDetails;
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Schema-less field map used for payloads, baselines, snapshots and metadata.
///
/// Table-specific shape validation is the remote store's concern.
pub type Fields = serde_json::Map<String, Value>;

/// Unique identifier of a queued operation.
///
/// Generated once at submission and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ProtocolError::invalid(format!("bad operation id {s:?}: {e}")))
    }
}

/// Kind of mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Create a new row.
    Insert,
    /// Change fields of an existing row.
    Update,
    /// Remove an existing row.
    Delete,
}

impl Action {
    /// Returns true if this action targets an existing row.
    pub fn targets_existing(&self) -> bool {
        matches!(self, Action::Update | Action::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Insert => "insert",
            Action::Update => "update",
            Action::Delete => "delete",
        })
    }
}

/// Dispatch priority. Higher priorities sync first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// The default.
    #[default]
    Normal,
    /// User-visible changes.
    High,
    /// Must go out before anything else.
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        })
    }
}

/// Caller-supplied options for a submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitOptions {
    /// Dispatch priority.
    pub priority: Priority,
    /// Operations that must leave the queue before this one is sent.
    pub dependencies: Vec<OperationId>,
    /// Last known remote state of the row (Update/Delete only).
    pub baseline: Option<Fields>,
    /// Overrides the configured retry budget.
    pub max_retries: Option<u32>,
    /// Free-form annotation, carried but never interpreted.
    pub metadata: Fields,
}

impl SubmitOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, id: OperationId) -> Self {
        self.dependencies.push(id);
        self
    }

    /// Sets the baseline snapshot used for conflict detection.
    pub fn with_baseline(mut self, baseline: Fields) -> Self {
        self.baseline = Some(baseline);
        self
    }

    /// Sets the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the metadata.
    pub fn with_metadata(mut self, metadata: Fields) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A queued intended mutation against the remote store.
///
/// # Fields
///
/// - `id`, `table`, `action`, `priority`, `created_at`: immutable after submission
/// - `record_id`: the target row, taken from the payload's id field
/// - `retry_count`: only ever increases; the operation is dropped once it
///   reaches `max_retries`
/// - `sequence`: per-queue monotonic tie-break assigned on enqueue
/// - `next_attempt_at`: backoff gate set after a failed attempt
/// - `held_conflict`: set while a manual conflict awaits a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation ID.
    pub id: OperationId,
    /// Target table name.
    pub table: String,
    /// Mutation kind.
    pub action: Action,
    /// Target row ID (required for Update/Delete).
    pub record_id: Option<String>,
    /// New or changed fields.
    pub payload: Fields,
    /// Field set as last known from the remote store.
    pub baseline: Option<Fields>,
    /// Submission time in epoch milliseconds.
    pub created_at: i64,
    /// Enqueue order tie-break.
    pub sequence: u64,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempts allowed before the operation is dropped.
    pub max_retries: u32,
    /// Dispatch priority.
    pub priority: Priority,
    /// Operations that must leave the queue first.
    pub dependencies: BTreeSet<OperationId>,
    /// Free-form annotation.
    pub metadata: Fields,
    /// Earliest next attempt in epoch milliseconds.
    pub next_attempt_at: Option<i64>,
    /// Conflict awaiting a manual decision.
    pub held_conflict: Option<ConflictDetails>,
}

impl Operation {
    /// Builds a validated operation from a submission.
    ///
    /// `id_field` names the payload field holding the target row ID.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidOperation`] if the table is empty,
    /// an Update/Delete has no row ID, or an Insert carries a baseline.
    pub fn new(
        table: impl Into<String>,
        action: Action,
        payload: Fields,
        options: SubmitOptions,
        id_field: &str,
        default_max_retries: u32,
    ) -> ProtocolResult<Self> {
        let table = table.into();
        if table.trim().is_empty() {
            return Err(ProtocolError::invalid("table name must not be empty"));
        }

        let record_id = payload.get(id_field).and_then(record_id_of);
        if action.targets_existing() && record_id.is_none() {
            return Err(ProtocolError::invalid(format!(
                "{action} on {table} requires a string or integer {id_field:?} field"
            )));
        }
        if action == Action::Insert && options.baseline.is_some() {
            return Err(ProtocolError::invalid("insert operations cannot carry a baseline"));
        }

        Ok(Self {
            id: OperationId::new(),
            table,
            action,
            record_id,
            payload,
            baseline: options.baseline,
            created_at: crate::now_millis(),
            sequence: 0,
            retry_count: 0,
            max_retries: options.max_retries.unwrap_or(default_max_retries).max(1),
            priority: options.priority,
            dependencies: options.dependencies.into_iter().collect(),
            metadata: options.metadata,
            next_attempt_at: None,
            held_conflict: None,
        })
    }

    /// Returns true once the retry budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Returns true while a manual conflict is pending.
    pub fn is_held(&self) -> bool {
        self.held_conflict.is_some()
    }

    /// Returns true if the backoff gate has passed at `now`.
    pub fn is_due(&self, now: i64) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Age in milliseconds at `now`.
    pub fn age_millis(&self, now: i64) -> i64 {
        now.saturating_sub(self.created_at)
    }

    /// Records a failed attempt. Returns true if the budget is now spent.
    pub fn record_failure(&mut self, next_attempt_at: Option<i64>) -> bool {
        self.retry_count = self.retry_count.saturating_add(1);
        self.next_attempt_at = next_attempt_at;
        self.is_exhausted()
    }

    /// Encodes to CBOR bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

fn record_id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}
