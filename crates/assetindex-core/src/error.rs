//! Error types for the indexing pipeline.

use thiserror::Error;

use crate::types::EventOrigin;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Transient source failure (RPC/network). Retried by the fetcher.
    #[error("source error: {0}")]
    Source(String),

    /// A raw event payload that could not be normalized.
    #[error("decode error at {origin}: {reason}")]
    Decode { origin: EventOrigin, reason: String },

    /// Durability-layer failure. Fatal to ingestion — the cursor must not
    /// advance, so a restart retries from the last good position.
    #[error("storage error: {0}")]
    Storage(String),

    /// A query-side input that is not a well-formed ledger address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("ingestion aborted: {reason}")]
    Aborted { reason: String },
}

impl IndexerError {
    /// Returns `true` if the error is transient and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    pub fn decode(origin: EventOrigin, reason: impl Into<String>) -> Self {
        Self::Decode {
            origin,
            reason: reason.into(),
        }
    }
}
