//! assetindex-evm — ledger source adapter and ingestion engine.
//!
//! # Phases
//!
//! ```text
//! Bootstrapping ──▶ CatchingUp ──▶ Live
//!                       ▲            │ stream gap / disconnect
//!                       └────────────┘
//! ```
//!
//! Historical replay and live consumption share one apply path, so replaying
//! any range after a crash produces the same final state.

pub mod backoff;
pub mod builder;
pub mod engine;
pub mod source;

pub use backoff::{RetryConfig, RetryPolicy};
pub use builder::IndexerBuilder;
pub use engine::{DegradedAsset, IngestEngine};
pub use source::{EventFetcher, RawEventStream, RegistryClient};
