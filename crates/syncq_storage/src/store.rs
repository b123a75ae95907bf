//! Persistent store trait definition.

use crate::error::StorageResult;
use std::sync::Arc;

/// Durable key-value storage used to mirror the operation queue.
///
/// # Invariants
///
/// - `get` returns exactly the bytes of the last successful `put` for a key
/// - `delete` of an absent key is not an error (returns `false`)
/// - `list_by_prefix` returns keys in ascending byte order
/// - Implementations must be `Send + Sync`; every method takes `&self`
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait PersistentStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not representable by the backend or
    /// the write fails.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails. A missing key is `Ok(None)`.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Removes `key`. Returns `true` if a value was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Lists every key starting with `prefix`, sorted ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

impl<S: PersistentStore + ?Sized> PersistentStore for Arc<S> {
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        (**self).delete(key)
    }

    fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        (**self).list_by_prefix(prefix)
    }
}
