//! Raw and domain event types.

use serde::{Deserialize, Serialize};

use crate::types::EventOrigin;

/// A raw, adapter-specific event as delivered by the source boundary.
///
/// The adapter does no interpretation beyond locating the event: `fields`
/// carries the decoded log arguments as JSON; turning them into a typed
/// domain event is the normalizer's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Emitted event name (e.g. `"AssetRegistered"`).
    pub event: String,
    /// Contract address that emitted the event.
    pub address: String,
    /// Transaction hash.
    pub tx_hash: String,
    /// Block number.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
    /// Decoded log arguments as JSON.
    pub fields: serde_json::Value,
}

impl RawEvent {
    /// The dedup key for this occurrence.
    pub fn origin(&self) -> EventOrigin {
        EventOrigin::new(self.block_number, self.log_index)
    }
}

// ─── Domain events ────────────────────────────────────────────────────────────

/// `AssetRegistered(id, owner, description, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRegistered {
    pub id: u64,
    pub owner: String,
    pub description: String,
    pub timestamp: i64,
    pub origin: EventOrigin,
}

/// `OwnershipTransferred(assetId, previousOwner, newOwner, timestamp)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipTransferred {
    pub asset_id: u64,
    pub from_owner: String,
    pub to_owner: String,
    pub timestamp: i64,
    pub origin: EventOrigin,
}

/// The normalized event set the ingestion engine applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    Registered(AssetRegistered),
    Transferred(OwnershipTransferred),
}

impl DomainEvent {
    pub fn origin(&self) -> EventOrigin {
        match self {
            Self::Registered(ev) => ev.origin,
            Self::Transferred(ev) => ev.origin,
        }
    }
}
