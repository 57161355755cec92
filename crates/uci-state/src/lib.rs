//! uci-state: persistent store for unified-ci
//!
//! The orchestrator keeps one process-wide store, opened at `core.dbFile` and
//! released on exit. It holds check requests that failed and are waiting for
//! the retry loop to republish them.
//!
//! ## Key Components
//!
//! - `Store`: SurrealDB connection (`surrealkv://` on disk, `mem://` in tests)
//! - `RetryStore`: backend-agnostic trait the workers depend on
//! - `fakes::MemoryRetryStore`: in-memory implementation for tests

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;

pub use error::StateError;
pub use handle::Store;
pub use storage_traits::{RetryRecord, RetryStore};

/// Result type for uci-state operations
pub type Result<T> = std::result::Result<T, StateError>;
