//! Purge command implementation.

use super::{format_millis, open_queue};
use std::path::Path;
use std::time::Duration;
use syncq_engine::{now_millis, Operation, OperationQueue};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Removes (or with `dry_run`, lists) operations older than `max_age`.
pub fn purge(
    queue: &OperationQueue,
    max_age: Duration,
    dry_run: bool,
) -> Result<Vec<Operation>, Box<dyn std::error::Error>> {
    let now = now_millis();
    if dry_run {
        Ok(queue.older_than(now, max_age))
    } else {
        Ok(queue.purge_older_than(now, max_age)?)
    }
}

/// Runs the purge command.
pub fn run(path: &Path, older_than_days: u64, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let queue = open_queue(path)?;
    let max_age = DAY * u32::try_from(older_than_days).unwrap_or(u32::MAX);
    let removed = purge(&queue, max_age, dry_run)?;

    let verb = if dry_run { "Would purge" } else { "Purged" };
    println!("{} {} operation(s)", verb, removed.len());
    for op in &removed {
        println!(
            "  {}  {:<12} {}",
            op.id,
            op.table,
            format_millis(op.created_at)
        );
    }
    Ok(())
}
