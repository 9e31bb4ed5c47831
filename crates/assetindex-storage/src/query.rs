//! Read-only query service over a registry store.
//!
//! Never mutates the store and never blocks on ingestion: reads see the
//! committed state, and every response is stamped with the cursor position
//! so callers can reason about recency. The stamp is read before the data,
//! so under concurrent ingestion it is a lower bound on what the data
//! reflects.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use serde::Serialize;
use tracing::warn;

use assetindex_core::error::IndexerError;
use assetindex_core::store::RegistryStore;
use assetindex_core::types::{is_address, Asset, EventOrigin, Transfer};

/// A query response plus the ingestion position it reflects.
#[derive(Debug, Clone, Serialize)]
pub struct WithCursor<T> {
    pub cursor: Option<EventOrigin>,
    pub data: T,
}

/// Current holdings of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerHolding {
    pub owner: String,
    pub count: u64,
}

/// Transfer volume for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayActivity {
    /// `YYYY-MM-DD`.
    pub day: String,
    pub count: u64,
}

/// Read-only rollup over the materialized view.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub total_assets: u64,
    pub total_transfers: u64,
    /// Top holders by current asset count, largest first.
    pub top_owners: Vec<OwnerHolding>,
    /// Transfers per UTC day, oldest first.
    pub activity_by_day: Vec<DayActivity>,
}

/// How many holders the summary reports.
const TOP_OWNERS: usize = 5;

/// Read-only access to the materialized view.
pub struct QueryService<S> {
    store: Arc<S>,
}

impl<S: RegistryStore> QueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn asset(&self, id: u64) -> Result<WithCursor<Option<Asset>>, IndexerError> {
        let cursor = self.store.cursor().await?;
        let data = self.store.asset(id).await?;
        Ok(WithCursor { cursor, data })
    }

    /// All assets, ordered by id.
    pub async fn assets(&self) -> Result<WithCursor<Vec<Asset>>, IndexerError> {
        let cursor = self.store.cursor().await?;
        let data = self.store.assets().await?;
        Ok(WithCursor { cursor, data })
    }

    /// Transfer history for one asset, ordered by time then local id.
    pub async fn transfers(
        &self,
        asset_id: u64,
    ) -> Result<WithCursor<Vec<Transfer>>, IndexerError> {
        let cursor = self.store.cursor().await?;
        let data = self.store.transfers(asset_id).await?;
        Ok(WithCursor { cursor, data })
    }

    /// Assets currently held by `owner`. The address shape is validated
    /// before querying; comparison is case-insensitive.
    pub async fn assets_by_owner(
        &self,
        owner: &str,
    ) -> Result<WithCursor<Vec<Asset>>, IndexerError> {
        if !is_address(owner) {
            return Err(IndexerError::InvalidAddress(owner.to_string()));
        }
        let cursor = self.store.cursor().await?;
        let data = self.store.assets_by_owner(owner).await?;
        Ok(WithCursor { cursor, data })
    }

    /// Rollup: totals, top holders, and transfer volume per UTC day.
    pub async fn summary(&self) -> Result<WithCursor<RegistrySummary>, IndexerError> {
        let cursor = self.store.cursor().await?;
        let assets = self.store.assets().await?;

        // Current holdings, keyed case-insensitively, first-seen casing kept.
        let mut holdings: HashMap<String, OwnerHolding> = HashMap::new();
        for asset in &assets {
            let entry = holdings
                .entry(asset.owner.to_lowercase())
                .or_insert_with(|| OwnerHolding {
                    owner: asset.owner.clone(),
                    count: 0,
                });
            entry.count += 1;
        }
        let mut top_owners: Vec<OwnerHolding> = holdings.into_values().collect();
        top_owners.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.owner.cmp(&b.owner)));
        top_owners.truncate(TOP_OWNERS);

        let mut total_transfers = 0u64;
        let mut by_day: HashMap<String, u64> = HashMap::new();
        for asset in &assets {
            for t in self.store.transfers(asset.id).await? {
                total_transfers += 1;
                match DateTime::from_timestamp(t.timestamp, 0) {
                    Some(at) => {
                        *by_day.entry(at.format("%Y-%m-%d").to_string()).or_default() += 1;
                    }
                    None => warn!(
                        asset = asset.id,
                        timestamp = t.timestamp,
                        "transfer timestamp out of range, excluded from daily rollup"
                    ),
                }
            }
        }
        let mut activity_by_day: Vec<DayActivity> = by_day
            .into_iter()
            .map(|(day, count)| DayActivity { day, count })
            .collect();
        activity_by_day.sort_by(|a, b| a.day.cmp(&b.day));

        Ok(WithCursor {
            cursor,
            data: RegistrySummary {
                total_assets: assets.len() as u64,
                total_transfers,
                top_owners,
                activity_by_day,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use assetindex_core::event::{AssetRegistered, OwnershipTransferred};

    const ALICE: &str = "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa";
    const BOB: &str = "0xBBBBbbbbBBBBbbbbBBBBbbbbBBBBbbbbBBBBbbbb";

    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, owner, ts, block) in [(1, ALICE, 100, 10), (2, ALICE, 150, 11), (3, BOB, 160, 12)]
        {
            store
                .apply_registration(&AssetRegistered {
                    id,
                    owner: owner.into(),
                    description: format!("asset {id}"),
                    timestamp: ts,
                    origin: EventOrigin::new(block, 0),
                })
                .await
                .unwrap();
        }
        // two transfers of asset 3 on distinct days
        for (to, ts, block) in [(ALICE, 86_400, 13), (BOB, 2 * 86_400, 14)] {
            store
                .apply_transfer(&OwnershipTransferred {
                    asset_id: 3,
                    from_owner: if to == ALICE { BOB.into() } else { ALICE.into() },
                    to_owner: to.into(),
                    timestamp: ts,
                    origin: EventOrigin::new(block, 0),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn responses_are_cursor_stamped() {
        let service = QueryService::new(seeded().await);
        let assets = service.assets().await.unwrap();
        assert_eq!(assets.cursor, Some(EventOrigin::new(14, 0)));
        assert_eq!(assets.data.len(), 3);
    }

    #[tokio::test]
    async fn owner_lookup_validates_address() {
        let service = QueryService::new(seeded().await);

        let err = service.assets_by_owner("not-an-address").await.unwrap_err();
        assert!(matches!(err, IndexerError::InvalidAddress(_)));

        let ok = service
            .assets_by_owner(&ALICE.to_lowercase())
            .await
            .unwrap();
        assert_eq!(ok.data.len(), 2);
    }

    #[tokio::test]
    async fn summary_rollup() {
        let service = QueryService::new(seeded().await);
        let summary = service.summary().await.unwrap().data;

        assert_eq!(summary.total_assets, 3);
        assert_eq!(summary.total_transfers, 2);

        // asset 3 ended with BOB, so both hold at least one
        assert_eq!(summary.top_owners[0].count, 2);
        assert_eq!(
            summary.top_owners.iter().map(|o| o.count).sum::<u64>(),
            3
        );

        assert_eq!(summary.activity_by_day.len(), 2);
        assert_eq!(summary.activity_by_day[0].day, "1970-01-02");
        assert_eq!(summary.activity_by_day[0].count, 1);
        assert_eq!(summary.activity_by_day[1].day, "1970-01-03");
    }
}
