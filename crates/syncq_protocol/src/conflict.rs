//! Conflict detection and resolution.

use crate::operation::{Action, Fields, Operation};
use crate::time::parse_timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Policy for reconciling a pending operation with a diverged remote row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Local payload wins unconditionally.
    ClientWins,
    /// Remote snapshot wins; the local intent is discarded.
    ServerWins,
    /// The later of local write time and remote last-modified wins wholesale.
    #[default]
    Timestamp,
    /// Remote snapshot overlaid with every non-null local field.
    Merge,
    /// Defer to a human or application decision.
    Manual,
}

impl ConflictStrategy {
    /// Returns true if this strategy resolves conflicts without intervention.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictStrategy::Manual)
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictStrategy::ClientWins => "client_wins",
            ConflictStrategy::ServerWins => "server_wins",
            ConflictStrategy::Timestamp => "timestamp",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        })
    }
}

/// Which side's data a resolution keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    /// The local payload is written.
    Local,
    /// The remote row is kept; nothing is written.
    Remote,
    /// A field-level merge is written.
    Merged,
}

/// Both sides of a detected conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetails {
    /// Payload the operation wants to write.
    pub local_payload: Fields,
    /// Current remote row.
    pub remote_snapshot: Fields,
    /// Baseline fields that diverged, sorted.
    pub conflicting_fields: Vec<String>,
}

/// Outcome of an automatic resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Strategy that produced this resolution.
    pub strategy: ConflictStrategy,
    /// Which side won.
    pub winner: Winner,
    /// What is actually sent (or kept, for a remote win).
    pub resolved_payload: Fields,
    /// The conflict being resolved.
    pub conflict_details: ConflictDetails,
}

/// Result of reconciling an operation against the remote row.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// No conflicting fields; send the payload unchanged.
    Clean,
    /// Conflict resolved automatically.
    Resolved(ConflictResolution),
    /// Conflict deferred to a manual decision.
    Deferred(ConflictDetails),
}

/// Detects and resolves divergence between an operation's baseline and the
/// remote row.
///
/// Only Update and Delete operations are reconciled; an Insert targets a
/// freshly generated row and never conflicts.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
    volatile_fields: BTreeSet<String>,
    modified_field: String,
}

impl ConflictResolver {
    /// Creates a resolver with the default volatile field (`updated_at`).
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self {
            strategy,
            volatile_fields: BTreeSet::from(["updated_at".to_string()]),
            modified_field: "updated_at".to_string(),
        }
    }

    /// Replaces the set of bookkeeping fields ignored by detection.
    pub fn with_volatile_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volatile_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the remote field holding the last-modified time.
    pub fn with_modified_field(mut self, field: impl Into<String>) -> Self {
        self.modified_field = field.into();
        self
    }

    /// Returns the configured strategy.
    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    /// Lists baseline fields whose remote value differs.
    ///
    /// A field missing from the remote row counts as a difference. An
    /// operation without a baseline never conflicts.
    pub fn detect(&self, op: &Operation, remote: &Fields) -> Vec<String> {
        let Some(baseline) = &op.baseline else {
            return Vec::new();
        };

        baseline
            .iter()
            .filter(|(field, _)| !self.volatile_fields.contains(*field))
            .filter(|(field, value)| remote.get(*field) != Some(*value))
            .map(|(field, _)| field.clone())
            .collect()
    }

    /// Resolves a conflict with `strategy`.
    ///
    /// Returns `None` for [`ConflictStrategy::Manual`].
    pub fn resolve(
        &self,
        op: &Operation,
        remote: &Fields,
        strategy: ConflictStrategy,
    ) -> Option<ConflictResolution> {
        let details = ConflictDetails {
            local_payload: op.payload.clone(),
            remote_snapshot: remote.clone(),
            conflicting_fields: self.detect(op, remote),
        };

        let (winner, resolved_payload) = match strategy {
            ConflictStrategy::Manual => return None,
            ConflictStrategy::ClientWins => (Winner::Local, op.payload.clone()),
            ConflictStrategy::ServerWins => (Winner::Remote, remote.clone()),
            ConflictStrategy::Timestamp => {
                if self.local_is_newer(op, remote) {
                    (Winner::Local, op.payload.clone())
                } else {
                    (Winner::Remote, remote.clone())
                }
            }
            ConflictStrategy::Merge => {
                let merged = merge(op, remote);
                if &merged == remote {
                    (Winner::Remote, merged)
                } else {
                    (Winner::Merged, merged)
                }
            }
        };

        Some(ConflictResolution {
            strategy,
            winner,
            resolved_payload,
            conflict_details: details,
        })
    }

    /// Detects, then resolves with the configured strategy.
    pub fn reconcile(&self, op: &Operation, remote: &Fields) -> Reconciliation {
        if op.action == Action::Insert || self.detect(op, remote).is_empty() {
            return Reconciliation::Clean;
        }

        match self.resolve(op, remote, self.strategy) {
            Some(resolution) => Reconciliation::Resolved(resolution),
            None => Reconciliation::Deferred(ConflictDetails {
                local_payload: op.payload.clone(),
                remote_snapshot: remote.clone(),
                conflicting_fields: self.detect(op, remote),
            }),
        }
    }

    fn local_is_newer(&self, op: &Operation, remote: &Fields) -> bool {
        match remote.get(&self.modified_field).and_then(parse_timestamp) {
            Some(remote_modified) => op.created_at > remote_modified,
            None => true,
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictStrategy::default())
    }
}

/// Remote row with every defined local field laid over it.
///
/// A delete has no fields to contribute, so its merge is the remote row.
fn merge(op: &Operation, remote: &Fields) -> Fields {
    let mut merged = remote.clone();
    if op.action == Action::Delete {
        return merged;
    }
    for (field, value) in &op.payload {
        if !value.is_null() {
            merged.insert(field.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::SubmitOptions;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn update(payload: Value, baseline: Value) -> Operation {
        Operation::new(
            "items",
            Action::Update,
            fields(payload),
            SubmitOptions::new().with_baseline(fields(baseline)),
            "id",
            3,
        )
        .unwrap()
    }

    #[test]
    fn detect_reports_diverged_fields() {
        let resolver = ConflictResolver::default();
        let op = update(json!({"id": 1, "a": 1, "b": 2}), json!({"id": 1, "a": 1, "b": 2}));
        let remote = fields(json!({"id": 1, "a": 9, "b": 2}));

        assert_eq!(resolver.detect(&op, &remote), vec!["a".to_string()]);
    }

    #[test]
    fn detect_ignores_volatile_fields() {
        let resolver = ConflictResolver::default();
        let op = update(
            json!({"id": 1, "a": 1}),
            json!({"id": 1, "a": 1, "updated_at": 10}),
        );
        let remote = fields(json!({"id": 1, "a": 1, "updated_at": 99}));

        assert!(resolver.detect(&op, &remote).is_empty());
    }

    #[test]
    fn detect_counts_missing_remote_field() {
        let resolver = ConflictResolver::default();
        let op = update(json!({"id": 1}), json!({"id": 1, "gone": true}));
        let remote = fields(json!({"id": 1}));

        assert_eq!(resolver.detect(&op, &remote), vec!["gone".to_string()]);
    }

    #[test]
    fn no_baseline_never_conflicts() {
        let resolver = ConflictResolver::default();
        let op = Operation::new(
            "items",
            Action::Update,
            fields(json!({"id": 1, "a": 1})),
            SubmitOptions::new(),
            "id",
            3,
        )
        .unwrap();

        assert_eq!(
            resolver.reconcile(&op, &fields(json!({"id": 1, "a": 5}))),
            Reconciliation::Clean
        );
    }

    #[test]
    fn strategy_table() {
        let resolver = ConflictResolver::default();
        let op = update(json!({"id": 1, "a": 1, "b": 2}), json!({"id": 1, "a": 1, "b": 2}));
        let remote = fields(json!({"id": 1, "a": 9, "b": 2}));

        let cases = [
            (ConflictStrategy::ClientWins, Some(json!({"id": 1, "a": 1, "b": 2}))),
            (ConflictStrategy::ServerWins, Some(json!({"id": 1, "a": 9, "b": 2}))),
            (ConflictStrategy::Merge, Some(json!({"id": 1, "a": 1, "b": 2}))),
            (ConflictStrategy::Manual, None),
        ];

        for (strategy, expected) in cases {
            let resolved = resolver
                .resolve(&op, &remote, strategy)
                .map(|r| Value::Object(r.resolved_payload));
            assert_eq!(resolved, expected, "strategy {strategy}");
        }
    }

    #[test]
    fn resolution_carries_details() {
        let resolver = ConflictResolver::default();
        let op = update(json!({"id": 1, "a": 1}), json!({"id": 1, "a": 1}));
        let remote = fields(json!({"id": 1, "a": 9}));

        let resolution = resolver
            .resolve(&op, &remote, ConflictStrategy::ServerWins)
            .unwrap();
        assert_eq!(resolution.winner, Winner::Remote);
        assert_eq!(resolution.conflict_details.conflicting_fields, vec!["a"]);
        assert_eq!(resolution.conflict_details.local_payload, op.payload);
        assert_eq!(resolution.conflict_details.remote_snapshot, remote);
    }

    #[test]
    fn merge_skips_null_local_fields() {
        let resolver = ConflictResolver::default();
        let op = update(
            json!({"id": 1, "a": null, "c": 3}),
            json!({"id": 1, "a": 1, "b": 2}),
        );
        let remote = fields(json!({"id": 1, "a": 5, "b": 7}));

        let resolution = resolver
            .resolve(&op, &remote, ConflictStrategy::Merge)
            .unwrap();
        assert_eq!(resolution.winner, Winner::Merged);
        assert_eq!(
            Value::Object(resolution.resolved_payload),
            json!({"id": 1, "a": 5, "b": 7, "c": 3})
        );
    }

    #[test]
    fn merge_of_delete_keeps_remote() {
        let resolver = ConflictResolver::default();
        let op = Operation::new(
            "items",
            Action::Delete,
            fields(json!({"id": 1})),
            SubmitOptions::new().with_baseline(fields(json!({"id": 1, "a": 1}))),
            "id",
            3,
        )
        .unwrap();
        let remote = fields(json!({"id": 1, "a": 2}));

        let resolution = resolver
            .resolve(&op, &remote, ConflictStrategy::Merge)
            .unwrap();
        assert_eq!(resolution.winner, Winner::Remote);
    }

    #[test]
    fn timestamp_newer_local_wins() {
        let resolver = ConflictResolver::default();
        let mut op = update(json!({"id": 1, "a": 1}), json!({"id": 1, "a": 1}));
        op.created_at = 2_000;

        let older = fields(json!({"id": 1, "a": 9, "updated_at": 1_000}));
        let newer = fields(json!({"id": 1, "a": 9, "updated_at": 3_000}));
        let tie = fields(json!({"id": 1, "a": 9, "updated_at": 2_000}));

        let win = |remote: &Fields| {
            resolver
                .resolve(&op, remote, ConflictStrategy::Timestamp)
                .unwrap()
                .winner
        };
        assert_eq!(win(&older), Winner::Local);
        assert_eq!(win(&newer), Winner::Remote);
        assert_eq!(win(&tie), Winner::Remote);
    }

    #[test]
    fn timestamp_parses_rfc3339_and_defaults_to_local() {
        let resolver = ConflictResolver::default().with_modified_field("modified");
        let mut op = update(json!({"id": 1, "a": 1}), json!({"id": 1, "a": 1}));
        op.created_at = 0;

        let stamped = fields(json!({"id": 1, "a": 9, "modified": "2001-01-01T00:00:00Z"}));
        let unstamped = fields(json!({"id": 1, "a": 9}));

        let winner = |remote: &Fields| {
            resolver
                .resolve(&op, remote, ConflictStrategy::Timestamp)
                .unwrap()
                .winner
        };
        assert_eq!(winner(&stamped), Winner::Remote);
        assert_eq!(winner(&unstamped), Winner::Local);
    }

    #[test]
    fn reconcile_uses_configured_strategy() {
        let op = update(json!({"id": 1, "a": 1}), json!({"id": 1, "a": 1}));
        let remote = fields(json!({"id": 1, "a": 9}));

        let manual = ConflictResolver::new(ConflictStrategy::Manual);
        match manual.reconcile(&op, &remote) {
            Reconciliation::Deferred(details) => {
                assert_eq!(details.conflicting_fields, vec!["a"]);
            }
            other => panic!("expected deferral, got {other:?}"),
        }

        let client = ConflictResolver::new(ConflictStrategy::ClientWins);
        assert!(matches!(
            client.reconcile(&op, &remote),
            Reconciliation::Resolved(ConflictResolution {
                winner: Winner::Local,
                ..
            })
        ));
    }

    #[test]
    fn strategy_auto_resolves() {
        assert!(ConflictStrategy::Timestamp.auto_resolves());
        assert!(!ConflictStrategy::Manual.auto_resolves());
    }
}
