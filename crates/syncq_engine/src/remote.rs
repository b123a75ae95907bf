//! Remote store abstraction.

use crate::error::{RemoteError, RemoteResult};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncq_protocol::{now_millis, Fields};
use uuid::Uuid;

/// The remote table store operations are replayed against.
///
/// Calls are blocking; the scheduler runs them on the blocking pool and
/// bounds each one with the configured request timeout.
pub trait RemoteStore: Send + Sync {
    /// Inserts a row and returns the stored row.
    fn insert(&self, table: &str, payload: &Fields) -> RemoteResult<Fields>;

    /// Updates the row identified by `id` and returns the stored row.
    fn update(&self, table: &str, id: &str, payload: &Fields) -> RemoteResult<Fields>;

    /// Deletes the row identified by `id`.
    fn delete(&self, table: &str, id: &str) -> RemoteResult<()>;

    /// Fetches the current row identified by `id`, if any.
    fn fetch_by_id(&self, table: &str, id: &str) -> RemoteResult<Option<Fields>>;
}

impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    fn insert(&self, table: &str, payload: &Fields) -> RemoteResult<Fields> {
        (**self).insert(table, payload)
    }

    fn update(&self, table: &str, id: &str, payload: &Fields) -> RemoteResult<Fields> {
        (**self).update(table, id, payload)
    }

    fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        (**self).delete(table, id)
    }

    fn fetch_by_id(&self, table: &str, id: &str) -> RemoteResult<Option<Fields>> {
        (**self).fetch_by_id(table, id)
    }
}

/// An in-memory remote store.
///
/// Rows are keyed by their id field. Every write stamps the modified field
/// with a strictly increasing millisecond clock. Useful for tests and demos.
pub struct MemoryRemoteStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Fields>>>,
    id_field: String,
    modified_field: String,
    last_stamp: Mutex<i64>,
    reachable: AtomicBool,
    scripted: Mutex<VecDeque<RemoteError>>,
}

impl MemoryRemoteStore {
    /// Creates an empty store using `id` and `updated_at`.
    pub fn new() -> Self {
        Self::with_fields("id", "updated_at")
    }

    /// Creates an empty store with custom id and modified field names.
    pub fn with_fields(id_field: impl Into<String>, modified_field: impl Into<String>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            id_field: id_field.into(),
            modified_field: modified_field.into(),
            last_stamp: Mutex::new(0),
            reachable: AtomicBool::new(true),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Stores a row as-is, bypassing stamping. Returns false if the row
    /// has no usable id.
    pub fn seed(&self, table: &str, row: Fields) -> bool {
        let Some(id) = row.get(&self.id_field).and_then(row_key) else {
            return false;
        };
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(id, row);
        true
    }

    /// Returns a copy of a stored row.
    pub fn row(&self, table: &str, id: &str) -> Option<Fields> {
        self.tables.read().get(table)?.get(id).cloned()
    }

    /// Returns copies of every row in a table, ordered by id.
    pub fn rows(&self, table: &str) -> Vec<Fields> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Sets whether calls reach the store. Unreachable calls fail transiently.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Makes the next call fail with `error`. Errors queue up in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.scripted.lock().push_back(error);
    }

    fn check(&self) -> RemoteResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(RemoteError::transient("remote store unreachable"));
        }
        match self.scripted.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stamp(&self, row: &mut Fields) {
        let mut last = self.last_stamp.lock();
        *last = now_millis().max(*last + 1);
        row.insert(self.modified_field.clone(), Value::from(*last));
    }
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryRemoteStore {
    fn insert(&self, table: &str, payload: &Fields) -> RemoteResult<Fields> {
        self.check()?;
        let mut row = payload.clone();
        let id = match row.get(&self.id_field).and_then(row_key) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                row.insert(self.id_field.clone(), Value::String(id.clone()));
                id
            }
        };

        let mut tables = self.tables.write();
        let rows = tables.entry(table.to_string()).or_default();
        if rows.contains_key(&id) {
            return Err(RemoteError::permanent(format!(
                "duplicate key {id} in table {table}"
            )));
        }
        self.stamp(&mut row);
        rows.insert(id, row.clone());
        Ok(row)
    }

    fn update(&self, table: &str, id: &str, payload: &Fields) -> RemoteResult<Fields> {
        self.check()?;
        let mut tables = self.tables.write();
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.get_mut(id))
            .ok_or_else(|| RemoteError::permanent(format!("no row {id} in table {table}")))?;

        for (field, value) in payload {
            row.insert(field.clone(), value.clone());
        }
        self.stamp(row);
        Ok(row.clone())
    }

    fn delete(&self, table: &str, id: &str) -> RemoteResult<()> {
        self.check()?;
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.remove(id);
        }
        Ok(())
    }

    fn fetch_by_id(&self, table: &str, id: &str) -> RemoteResult<Option<Fields>> {
        self.check()?;
        Ok(self.row(table, id))
    }
}

fn row_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn insert_assigns_id_and_stamp() {
        let remote = MemoryRemoteStore::new();
        let row = remote
            .insert("todos", &fields(json!({"title": "a"})))
            .unwrap();

        let id = row["id"].as_str().unwrap().to_string();
        assert!(row["updated_at"].is_i64());
        assert_eq!(remote.row("todos", &id), Some(row));
    }

    #[test]
    fn duplicate_insert_is_permanent() {
        let remote = MemoryRemoteStore::new();
        let payload = fields(json!({"id": "1"}));
        remote.insert("todos", &payload).unwrap();

        let err = remote.insert("todos", &payload).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn update_merges_and_restamps() {
        let remote = MemoryRemoteStore::new();
        let first = remote
            .insert("todos", &fields(json!({"id": "1", "title": "a", "done": false})))
            .unwrap();
        let second = remote
            .update("todos", "1", &fields(json!({"done": true})))
            .unwrap();

        assert_eq!(second["title"], json!("a"));
        assert_eq!(second["done"], json!(true));
        assert!(second["updated_at"].as_i64() > first["updated_at"].as_i64());
    }

    #[test]
    fn update_missing_row_fails() {
        let remote = MemoryRemoteStore::new();
        let err = remote.update("todos", "9", &Fields::new()).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn delete_is_idempotent() {
        let remote = MemoryRemoteStore::new();
        remote.seed("todos", fields(json!({"id": 1})));
        remote.delete("todos", "1").unwrap();
        remote.delete("todos", "1").unwrap();
        assert_eq!(remote.fetch_by_id("todos", "1").unwrap(), None);
    }

    #[test]
    fn scripted_and_unreachable_failures() {
        let remote = MemoryRemoteStore::new();
        remote.fail_next(RemoteError::permanent("nope"));
        assert!(remote.fetch_by_id("t", "1").is_err());
        assert!(remote.fetch_by_id("t", "1").is_ok());

        remote.set_reachable(false);
        let err = remote.fetch_by_id("t", "1").unwrap_err();
        assert!(err.is_retryable());
    }
}
