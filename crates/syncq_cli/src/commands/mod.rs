//! CLI command implementations.

pub mod cancel;
pub mod inspect;
pub mod list;
pub mod purge;

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::Arc;
use syncq_engine::{OperationQueue, DEFAULT_RETENTION};
use syncq_storage::FileStore;

/// Opens the queue persisted under `path`.
///
/// Capacity is not enforced; the CLI never adds operations.
pub fn open_queue(path: &Path) -> Result<OperationQueue, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No queue found at {:?}", path).into());
    }
    let store = FileStore::open(path)?;
    Ok(OperationQueue::open(
        Arc::new(store),
        usize::MAX,
        DEFAULT_RETENTION,
    )?)
}

/// Formats epoch milliseconds as RFC 3339.
pub fn format_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}
