//! Ledger source boundary — historical ranges and the live stream.
//!
//! `RegistryClient` abstracts the RPC provider; `EventFetcher` wraps one
//! with range chunking and transient-error retry so the engine above it only
//! sees ordered events or a final error.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tracing::warn;

use assetindex_core::error::IndexerError;
use assetindex_core::event::RawEvent;

use crate::backoff::RetryPolicy;

/// An unbounded, ordered stream of raw events from the ledger.
///
/// Delivery is at-least-once; the store's origin checks absorb duplicates.
pub type RawEventStream = Pin<Box<dyn Stream<Item = Result<RawEvent, IndexerError>> + Send>>;

/// Boundary over the ledger client.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Current chain head block number.
    async fn head_block_number(&self) -> Result<u64, IndexerError>;

    /// All registry events in `[from_block, to_block]`, ordered by
    /// (block, log index).
    async fn fetch_range(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, IndexerError>;

    /// Live registry events from the current head onward.
    async fn subscribe(&self) -> Result<RawEventStream, IndexerError>;
}

/// Wraps a `RegistryClient` with chunk splitting and retry.
pub struct EventFetcher<C> {
    client: C,
    retry: RetryPolicy,
}

impl<C: RegistryClient> EventFetcher<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(client: C, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    /// Fetch the current chain head block number.
    pub async fn head_block_number(&self) -> Result<u64, IndexerError> {
        self.retrying("head", || self.client.head_block_number()).await
    }

    /// Fetch all events in `[from, to]`, splitting into `max_range`-sized
    /// calls so a long history never turns into one unbounded request.
    pub async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        max_range: u64,
    ) -> Result<Vec<RawEvent>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }
        let max_range = max_range.max(1);
        let mut all = Vec::new();
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(max_range - 1).min(to);
            let chunk = self
                .retrying("range fetch", || self.client.fetch_range(start, end))
                .await?;
            all.extend(chunk);
            start = end + 1;
        }
        Ok(all)
    }

    /// Open the live subscription.
    pub async fn subscribe(&self) -> Result<RawEventStream, IndexerError> {
        self.retrying("subscribe", || self.client.subscribe()).await
    }

    async fn retrying<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, IndexerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            warn!(error = %e, attempt, "{what} failed, retrying");
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
