//! # syncq Protocol
//!
//! Data model and reconciliation rules for the syncq offline queue.
//!
//! This crate provides:
//! - [`Operation`], the queued intent to mutate a remote table
//! - [`SubmitOptions`] for priority, dependencies and baselines
//! - [`ConflictResolver`] and the five [`ConflictStrategy`] policies
//! - [`SyncOutcome`], the result of one operation's sync attempt
//! - CBOR encoding of operations for persistence
//!
//! This is a pure crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod operation;
mod outcome;
mod time;

pub use conflict::{
    ConflictDetails, ConflictResolution, ConflictResolver, ConflictStrategy, Reconciliation,
    Winner,
};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{Action, Fields, Operation, OperationId, Priority, SubmitOptions};
pub use outcome::SyncOutcome;
pub use time::{now_millis, parse_timestamp};
