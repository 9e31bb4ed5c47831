//! assetindex-storage — pluggable store backends plus the read side.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! [`query`] provides the read-only [`QueryService`] that stamps every
//! response with the cursor it reflects.

pub mod memory;
pub mod query;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;
pub use query::{QueryService, RegistrySummary, WithCursor};
