//! Inspect command implementation.

use super::{format_millis, open_queue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use syncq_engine::{now_millis, Operation, OperationQueue};

/// Queue inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Queue path.
    pub path: String,
    /// Number of queued operations.
    pub total: usize,
    /// Operations per table.
    pub by_table: BTreeMap<String, usize>,
    /// Operations per priority.
    pub by_priority: BTreeMap<String, usize>,
    /// Operations per action.
    pub by_action: BTreeMap<String, usize>,
    /// Operations waiting on a manual conflict decision.
    pub held_conflicts: usize,
    /// Operations that have failed at least once.
    pub retrying: usize,
    /// Submission time of the oldest operation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
}

/// Summarizes a queue.
pub fn summarize(path: &Path, queue: &OperationQueue) -> InspectResult {
    let ops = queue.all();
    let mut result = InspectResult {
        path: path.display().to_string(),
        total: ops.len(),
        by_table: BTreeMap::new(),
        by_priority: BTreeMap::new(),
        by_action: BTreeMap::new(),
        held_conflicts: 0,
        retrying: 0,
        oldest: ops
            .iter()
            .map(|op| op.created_at)
            .min()
            .map(format_millis),
    };

    for op in &ops {
        *result.by_table.entry(op.table.clone()).or_insert(0) += 1;
        *result.by_priority.entry(op.priority.to_string()).or_insert(0) += 1;
        *result.by_action.entry(op.action.to_string()).or_insert(0) += 1;
        if op.is_held() {
            result.held_conflicts += 1;
        }
        if op.retry_count > 0 {
            result.retrying += 1;
        }
    }

    result
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let result = summarize(path, &queue);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result, &queue.all());
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult, ops: &[Operation]) {
    println!("syncq queue: {}", result.path);
    println!();
    println!("Operations:      {}", result.total);
    println!("Held conflicts:  {}", result.held_conflicts);
    println!("Retrying:        {}", result.retrying);
    if let Some(oldest) = &result.oldest {
        let age_secs = ops
            .iter()
            .map(|op| op.age_millis(now_millis()))
            .max()
            .unwrap_or(0)
            / 1000;
        println!("Oldest:          {} ({}s ago)", oldest, age_secs);
    }

    for (title, counts) in [
        ("By table", &result.by_table),
        ("By priority", &result.by_priority),
        ("By action", &result.by_action),
    ] {
        if counts.is_empty() {
            continue;
        }
        println!();
        println!("{}:", title);
        for (key, count) in counts {
            println!("  {:<16} {}", key, count);
        }
    }
}
