//! Cancel command implementation.

use super::open_queue;
use std::path::Path;
use syncq_engine::{OperationId, OperationQueue};
use tracing::info;

/// Removes one operation. Returns false if it was not queued.
pub fn cancel(queue: &OperationQueue, id: &OperationId) -> Result<bool, Box<dyn std::error::Error>> {
    match queue.remove(id)? {
        Some(op) => {
            info!(operation_id = %id, table = %op.table, "operation cancelled");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Runs the cancel command.
pub fn run(path: &Path, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id: OperationId = id
        .parse()
        .map_err(|e| format!("Invalid operation id {:?}: {}", id, e))?;
    let queue = open_queue(path)?;

    if cancel(&queue, &id)? {
        println!("Cancelled {}", id);
    } else {
        println!("Operation {} is not queued", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{op, seeded_queue};
    use syncq_engine::Priority;

    #[test]
    fn cancel_removes_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let target = op("todos", Priority::Normal, 1);
        let id = target.id;
        seeded_queue(dir.path(), vec![target, op("todos", Priority::Normal, 2)]);

        assert!(cancel(&open_queue(dir.path()).unwrap(), &id).unwrap());
        assert!(!cancel(&open_queue(dir.path()).unwrap(), &id).unwrap());
        assert_eq!(open_queue(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn rejects_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), "not-a-uuid").is_err());
    }
}
