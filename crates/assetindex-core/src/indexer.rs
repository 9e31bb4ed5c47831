//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

/// Configuration for an ingestion engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used in logs).
    pub id: String,
    /// First block to scan when no cursor exists yet.
    pub from_block: u64,
    /// Optional end block (bounded backfill). `None` = run forever.
    pub to_block: Option<u64>,
    /// How many blocks to scan per historical fetch.
    pub chunk_size: u64,
    /// Delay before re-entering catch-up after the live stream drops (ms).
    pub poll_interval_ms: u64,
    /// How many times to retry a transfer whose asset is not registered yet.
    pub max_apply_retries: u32,
    /// Delay between those retries (ms).
    pub apply_retry_delay_ms: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            from_block: 0,
            to_block: None,
            chunk_size: 1000,
            poll_interval_ms: 2000,
            max_apply_retries: 3,
            apply_retry_delay_ms: 250,
        }
    }
}

/// Runtime state of the ingestion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestState {
    /// Reading the persisted cursor before any scanning.
    Bootstrapping,
    /// Replaying historical events up to the chain head.
    CatchingUp,
    /// Consuming the live subscription stream.
    Live,
    /// One or more assets failed to resolve; independent events continue.
    Degraded,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrapping => write!(f, "bootstrapping"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Live => write!(f, "live"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}
