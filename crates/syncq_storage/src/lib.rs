//! # syncq Storage
//!
//! Durable key-value storage for the syncq offline operation queue.
//!
//! The queue only needs four primitives from its storage layer: `put`,
//! `get`, `delete` and `list_by_prefix`. Values are **opaque bytes**; the
//! store never interprets what it holds.
//!
//! ## Design Principles
//!
//! - Stores are simple byte maps keyed by UTF-8 strings
//! - No knowledge of operation encoding or queue layout
//! - Must be `Send + Sync`, all methods take `&self`
//! - A successful `put` survives process restart (for durable stores)
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral queues
//! - [`FileStore`] - One file per key inside a directory, atomic replace
//!
//! ## Example
//!
//! ```rust
//! use syncq_storage::{InMemoryStore, PersistentStore};
//!
//! let store = InMemoryStore::new();
//! store.put("ops/1", b"hello").unwrap();
//! assert_eq!(store.get("ops/1").unwrap(), Some(b"hello".to_vec()));
//! assert_eq!(store.list_by_prefix("ops/").unwrap(), vec!["ops/1".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::PersistentStore;
