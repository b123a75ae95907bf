//! # syncq Testkit
//!
//! Test utilities for the syncq engine.
//!
//! This crate provides:
//! - [`InstrumentedRemote`], a remote store that counts, logs, delays and
//!   fails calls on demand
//! - [`RecordingNotifier`] and [`EventRecorder`] for observing the engine
//! - Fixture builders for engines over memory or file storage
//! - Property-based generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use syncq_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn syncs_insert() {
//!     let harness = TestEngine::memory();
//!     harness.engine.submit("todos", Action::Insert, fields(json!({"id": "1"})), SubmitOptions::new())?;
//!     harness.engine.force_sync().await?;
//!     assert_eq!(harness.remote.calls(CallKind::Insert), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod observe;
pub mod remote;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::observe::*;
    pub use crate::remote::*;
}

pub use fixtures::*;
pub use generators::*;
pub use observe::*;
pub use remote::*;
