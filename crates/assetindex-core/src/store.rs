//! Store contract — durable, transactional persistence of the view.
//!
//! Implementations must make each apply atomic: the domain row, the owning
//! asset's `owner` column, and the cursor move together or not at all, so a
//! reader observes a fully-applied event or none of it.

use async_trait::async_trait;

use crate::error::IndexerError;
use crate::event::{AssetRegistered, OwnershipTransferred};
use crate::types::{Asset, EventOrigin, Transfer};

/// Why a transfer was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No asset row for the referenced id. The engine owns the retry/skip
    /// decision, so the cursor is left untouched.
    UnknownAsset,
    /// The event's origin is older than the latest transfer recorded for the
    /// asset — applying it would regress the owner invariant.
    StaleOrigin,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownAsset => write!(f, "unknown asset"),
            Self::StaleOrigin => write!(f, "stale origin"),
        }
    }
}

/// Outcome of an apply operation. Duplicates are outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event mutated the view and the cursor advanced past it.
    Applied,
    /// The event was seen before; nothing was overwritten, the cursor still
    /// advanced past its origin.
    AlreadyApplied,
    /// The event was not applied and the cursor did not move.
    Rejected(RejectReason),
}

/// Durable, queryable representation of the registry.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Apply an `AssetRegistered` event. Idempotent on asset id: an existing
    /// row is never overwritten, but the cursor still advances past the
    /// event's origin.
    async fn apply_registration(
        &self,
        event: &AssetRegistered,
    ) -> Result<ApplyOutcome, IndexerError>;

    /// Apply an `OwnershipTransferred` event. Idempotent on origin; rejects
    /// unknown assets and origins not newer than the asset's latest transfer.
    async fn apply_transfer(
        &self,
        event: &OwnershipTransferred,
    ) -> Result<ApplyOutcome, IndexerError>;

    /// Move the cursor past an event that was deliberately skipped (decode
    /// failure, exhausted referential retries). Monotonic.
    async fn advance_cursor(&self, origin: EventOrigin) -> Result<(), IndexerError>;

    async fn asset(&self, id: u64) -> Result<Option<Asset>, IndexerError>;

    /// All assets, ordered by id.
    async fn assets(&self) -> Result<Vec<Asset>, IndexerError>;

    /// Transfers for one asset, ordered by timestamp then local id.
    async fn transfers(&self, asset_id: u64) -> Result<Vec<Transfer>, IndexerError>;

    /// Assets currently held by `owner` (case-insensitive), ordered by id.
    async fn assets_by_owner(&self, owner: &str) -> Result<Vec<Asset>, IndexerError>;

    /// The persisted ingestion cursor (`None` until the first event lands).
    async fn cursor(&self) -> Result<Option<EventOrigin>, IndexerError>;
}
