//! File-based store for persistent queues.

use crate::error::{StorageError, StorageResult};
use crate::store::PersistentStore;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const RECORD_EXT: &str = "rec";
const TEMP_EXT: &str = "tmp";

/// A directory-backed persistent store.
///
/// Every key is stored in its own file, named by the hex encoding of the
/// key bytes. Writes go to a temporary file which is then renamed over the
/// target, so a crash mid-write leaves either the old or the new value.
///
/// # Durability
///
/// - `put()` flushes the temporary file before the rename
/// - With [`FileStore::with_sync`] enabled, `put()` also calls
///   `File::sync_all()` so the value is on disk when it returns
///
/// # Example
///
/// ```no_run
/// use syncq_storage::{FileStore, PersistentStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("queue")).unwrap();
/// store.put("ops/1", b"persistent").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    sync_writes: bool,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens or creates a store rooted at `dir`.
    ///
    /// Leftover temporary files from an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TEMP_EXT) {
                tracing::debug!(path = %path.display(), "removing stale temporary record");
                fs::remove_file(&path)?;
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            sync_writes: false,
            write_lock: Mutex::new(()),
        })
    }

    /// Enables `fsync` on every write.
    #[must_use]
    pub fn with_sync(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    /// Returns the root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::invalid_key(key, "key must not be empty"));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", encode_key(key), RECORD_EXT)))
    }
}

impl PersistentStore for FileStore {
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.record_path(key)?;
        let temp = path.with_extension(TEMP_EXT);

        let _guard = self.write_lock.lock();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(value)?;
            file.flush()?;
            if self.sync_writes {
                file.sync_all()?;
            }
        }
        fs::rename(&temp, &path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.record_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.record_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => {
                if self.sync_writes {
                    // Persist the directory entry removal as well.
                    File::open(&self.dir)?.sync_all()?;
                }
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let key = decode_key(stem).ok_or_else(|| {
                StorageError::Corrupted(format!("undecodable record name {stem:?}"))
            })?;
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    key.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_key(name: &str) -> Option<String> {
    if name.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..name.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(name.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn file_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("ops/abc", b"payload").unwrap();
        assert_eq!(store.get("ops/abc").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.get("ops/zzz").unwrap(), None);
    }

    #[test]
    fn file_values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap().with_sync(true);
            store.put("ops/1", b"first").unwrap();
            store.put("ops/2", b"second").unwrap();
        }

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("ops/1").unwrap(), Some(b"first".to_vec()));
        assert_eq!(
            store.list_by_prefix("ops/").unwrap(),
            vec!["ops/1".to_string(), "ops/2".to_string()]
        );
    }

    #[test]
    fn file_delete_reports_presence() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.put("k", b"v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn file_open_removes_stale_temp_files() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join(format!("{}.{}", encode_key("ops/x"), TEMP_EXT));
        fs::write(&stale, b"half written").unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert!(!stale.exists());
        assert!(store.list_by_prefix("").unwrap().is_empty());
    }

    #[test]
    fn file_rejects_empty_key() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("", b"v"),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn file_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("README"), b"not a record").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.put("a", b"1").unwrap();
        assert_eq!(store.list_by_prefix("").unwrap(), vec!["a".to_string()]);
    }

    proptest! {
        #[test]
        fn key_encoding_roundtrips(key in "\\PC{1,40}") {
            prop_assert_eq!(decode_key(&encode_key(&key)), Some(key));
        }
    }
}
