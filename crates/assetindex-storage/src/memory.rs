//! In-memory storage backend.
//!
//! Mirrors the SQLite backend's apply semantics without persistence.
//! Useful for tests and short-lived indexers.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use assetindex_core::error::IndexerError;
use assetindex_core::event::{AssetRegistered, OwnershipTransferred};
use assetindex_core::store::{ApplyOutcome, RegistryStore, RejectReason};
use assetindex_core::types::{same_address, Asset, EventOrigin, Transfer};

#[derive(Default)]
struct Inner {
    assets: BTreeMap<u64, Asset>,
    transfers: Vec<Transfer>,
    next_local_id: i64,
    cursor: Option<EventOrigin>,
}

impl Inner {
    fn advance_cursor(&mut self, origin: EventOrigin) {
        if self.cursor.map_or(true, |c| origin > c) {
            self.cursor = Some(origin);
        }
    }

    fn latest_transfer_origin(&self, asset_id: u64) -> Option<EventOrigin> {
        self.transfers
            .iter()
            .filter(|t| t.asset_id == asset_id)
            .map(|t| t.origin)
            .max()
    }
}

/// In-memory registry store. All data is lost when the process exits.
///
/// Applies take a single lock, so each one is atomic with respect to reads.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn apply_registration(
        &self,
        event: &AssetRegistered,
    ) -> Result<ApplyOutcome, IndexerError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.assets.contains_key(&event.id) {
            inner.advance_cursor(event.origin);
            debug!(asset = event.id, origin = %event.origin, "duplicate registration");
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        inner.assets.insert(
            event.id,
            Asset {
                id: event.id,
                owner: event.owner.clone(),
                description: event.description.clone(),
                registered_at: event.timestamp,
            },
        );
        inner.advance_cursor(event.origin);
        debug!(asset = event.id, owner = %event.owner, "asset registered");
        Ok(ApplyOutcome::Applied)
    }

    async fn apply_transfer(
        &self,
        event: &OwnershipTransferred,
    ) -> Result<ApplyOutcome, IndexerError> {
        let mut inner = self.inner.lock().unwrap();

        let Some(current_owner) = inner.assets.get(&event.asset_id).map(|a| a.owner.clone())
        else {
            return Ok(ApplyOutcome::Rejected(RejectReason::UnknownAsset));
        };

        if let Some(latest) = inner.latest_transfer_origin(event.asset_id) {
            if event.origin == latest {
                inner.advance_cursor(event.origin);
                debug!(asset = event.asset_id, origin = %event.origin, "duplicate transfer");
                return Ok(ApplyOutcome::AlreadyApplied);
            }
            if event.origin < latest {
                return Ok(ApplyOutcome::Rejected(RejectReason::StaleOrigin));
            }
        }

        if !same_address(&current_owner, &event.from_owner) {
            // The ledger is authoritative; record the discrepancy and apply.
            warn!(
                asset = event.asset_id,
                expected = %current_owner,
                reported = %event.from_owner,
                "transfer from_owner does not match current owner"
            );
        }

        let local_id = inner.next_local_id;
        inner.next_local_id += 1;
        inner.transfers.push(Transfer {
            local_id,
            asset_id: event.asset_id,
            from_owner: event.from_owner.clone(),
            to_owner: event.to_owner.clone(),
            timestamp: event.timestamp,
            origin: event.origin,
        });
        if let Some(asset) = inner.assets.get_mut(&event.asset_id) {
            asset.owner = event.to_owner.clone();
        }
        inner.advance_cursor(event.origin);
        debug!(asset = event.asset_id, to = %event.to_owner, origin = %event.origin, "transfer applied");
        Ok(ApplyOutcome::Applied)
    }

    async fn advance_cursor(&self, origin: EventOrigin) -> Result<(), IndexerError> {
        self.inner.lock().unwrap().advance_cursor(origin);
        Ok(())
    }

    async fn asset(&self, id: u64) -> Result<Option<Asset>, IndexerError> {
        Ok(self.inner.lock().unwrap().assets.get(&id).cloned())
    }

    async fn assets(&self) -> Result<Vec<Asset>, IndexerError> {
        Ok(self.inner.lock().unwrap().assets.values().cloned().collect())
    }

    async fn transfers(&self, asset_id: u64) -> Result<Vec<Transfer>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<Transfer> = inner
            .transfers
            .iter()
            .filter(|t| t.asset_id == asset_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| (t.timestamp, t.local_id));
        Ok(rows)
    }

    async fn assets_by_owner(&self, owner: &str) -> Result<Vec<Asset>, IndexerError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .assets
            .values()
            .filter(|a| same_address(&a.owner, owner))
            .cloned()
            .collect())
    }

    async fn cursor(&self) -> Result<Option<EventOrigin>, IndexerError> {
        Ok(self.inner.lock().unwrap().cursor)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
