//! List command implementation.

use super::{format_millis, open_queue};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use syncq_engine::{now_millis, Operation, OperationId, OperationQueue};

/// One queued operation as shown by `list`.
#[derive(Debug, Serialize)]
pub struct ListEntry {
    /// Operation ID.
    pub id: String,
    /// Target table.
    pub table: String,
    /// Mutation kind.
    pub action: String,
    /// Target row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    /// Dispatch priority.
    pub priority: String,
    /// Submission time.
    pub created_at: String,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempts allowed.
    pub max_retries: u32,
    /// Queued dependencies.
    pub waiting_on: usize,
    /// `ready`, `backoff`, `waiting` or `held`.
    pub state: &'static str,
}

fn state_of(op: &Operation, queued: &HashSet<OperationId>, now: i64) -> &'static str {
    if op.is_held() {
        "held"
    } else if op.dependencies.iter().any(|dep| queued.contains(dep)) {
        "waiting"
    } else if !op.is_due(now) {
        "backoff"
    } else {
        "ready"
    }
}

/// Collects queue entries in sync order, optionally for one table.
pub fn collect(queue: &OperationQueue, table: Option<&str>) -> Vec<ListEntry> {
    let ops = queue.all();
    let queued: HashSet<OperationId> = ops.iter().map(|op| op.id).collect();
    let now = now_millis();

    ops.iter()
        .filter(|op| table.map_or(true, |t| op.table == t))
        .map(|op| ListEntry {
            id: op.id.to_string(),
            table: op.table.clone(),
            action: op.action.to_string(),
            record_id: op.record_id.clone(),
            priority: op.priority.to_string(),
            created_at: format_millis(op.created_at),
            retry_count: op.retry_count,
            max_retries: op.max_retries,
            waiting_on: op
                .dependencies
                .iter()
                .filter(|dep| queued.contains(dep))
                .count(),
            state: state_of(op, &queued, now),
        })
        .collect()
}

/// Runs the list command.
pub fn run(path: &Path, table: Option<&str>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let entries = collect(&queue, table);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            if entries.is_empty() {
                println!("No queued operations");
            }
            for entry in &entries {
                println!(
                    "{}  {:<8} {:<6} {:<12} {:<8} {}/{}  {}",
                    entry.id,
                    entry.priority,
                    entry.action,
                    entry.table,
                    entry.state,
                    entry.retry_count,
                    entry.max_retries,
                    entry.created_at,
                );
            }
        }
    }

    Ok(())
}
