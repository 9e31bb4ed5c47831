//! assetindex-core — foundation for the registry materialized-view pipeline.
//!
//! # Architecture
//!
//! ```text
//! RegistryClient (adapter) → normalizer → IngestEngine
//!                                             │ apply (atomic, idempotent)
//!                                             ▼
//!                                       RegistryStore ← QueryService
//! ```
//!
//! This crate holds the chain-agnostic pieces: domain events, the pure
//! normalizer, the cursor, the store contract, and error types. The fetch
//! loop lives in `assetindex-evm`; the backends in `assetindex-storage`.

pub mod cursor;
pub mod error;
pub mod event;
pub mod indexer;
pub mod normalizer;
pub mod store;
pub mod types;

pub use cursor::Cursor;
pub use error::IndexerError;
pub use event::{AssetRegistered, DomainEvent, OwnershipTransferred, RawEvent};
pub use indexer::{IndexerConfig, IngestState};
pub use normalizer::normalize;
pub use store::{ApplyOutcome, RegistryStore, RejectReason};
pub use types::{Asset, EventOrigin, Transfer};
