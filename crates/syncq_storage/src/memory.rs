//! In-memory store for testing.

use crate::error::StorageResult;
use crate::store::PersistentStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory persistent store.
///
/// Nothing survives the process, but the store can be shared (via `Arc`)
/// between two queue instances to simulate a restart in tests.
///
/// # Example
///
/// ```rust
/// use syncq_storage::{InMemoryStore, PersistentStore};
///
/// let store = InMemoryStore::new();
/// store.put("a", b"1").unwrap();
/// assert!(store.delete("a").unwrap());
/// assert!(!store.delete("a").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl PersistentStore for InMemoryStore {
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.list_by_prefix("").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn memory_put_replaces() {
        let store = InMemoryStore::new();
        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_get_missing() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_delete_reports_presence() {
        let store = InMemoryStore::new();
        store.put("k", b"v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn memory_list_by_prefix_is_sorted_and_scoped() {
        let store = InMemoryStore::new();
        store.put("ops/b", b"").unwrap();
        store.put("meta/x", b"").unwrap();
        store.put("ops/a", b"").unwrap();
        store.put("opsz", b"").unwrap();

        assert_eq!(
            store.list_by_prefix("ops/").unwrap(),
            vec!["ops/a".to_string(), "ops/b".to_string()]
        );
        assert_eq!(store.list_by_prefix("").unwrap().len(), 4);
    }

    #[test]
    fn memory_clear() {
        let store = InMemoryStore::new();
        store.put("a", b"1").unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
