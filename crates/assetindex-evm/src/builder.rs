//! Fluent builder API for indexer configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use assetindex_evm::IndexerBuilder;
//!
//! let config = IndexerBuilder::new()
//!     .id("registry-mainnet")
//!     .from_block(19_000_000)
//!     .chunk_size(500)
//!     .build_config();
//! ```

use assetindex_core::indexer::IndexerConfig;

/// Fluent builder for `IndexerConfig`.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Set the indexer ID (used in logs).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the block to start from when no cursor exists.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// Set the end block (for bounded backfill).
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    /// Set how many blocks each historical fetch covers.
    pub fn chunk_size(mut self, size: u64) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the pause before re-syncing after the live stream drops (ms).
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the retry budget for transfers whose asset is not registered yet.
    pub fn max_apply_retries(mut self, retries: u32) -> Self {
        self.config.max_apply_retries = retries;
        self
    }

    /// Set the delay between those retries (ms).
    pub fn apply_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.apply_retry_delay_ms = ms;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new().build_config();
        assert_eq!(cfg.id, "default");
        assert_eq!(cfg.chunk_size, 1000);
        assert!(cfg.to_block.is_none());
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerBuilder::new()
            .id("registry-sepolia")
            .from_block(4_500_000)
            .to_block(4_600_000)
            .chunk_size(250)
            .max_apply_retries(5)
            .build_config();

        assert_eq!(cfg.id, "registry-sepolia");
        assert_eq!(cfg.from_block, 4_500_000);
        assert_eq!(cfg.to_block, Some(4_600_000));
        assert_eq!(cfg.chunk_size, 250);
        assert_eq!(cfg.max_apply_retries, 5);
    }
}
