//! The ingestion engine — orchestrates catch-up and live phases.
//!
//! # Phase 1: CATCH-UP
//! Scan from the durable cursor (or the configured genesis block) to the
//! chain head in `chunk_size` chunks. The head is re-read after every chunk,
//! so a target that moves during a long scan is chased, not assumed static.
//! Shutdown is honored between chunks only; each event lands transactionally
//! with the cursor, so stopping never tears state.
//!
//! # Phase 2: LIVE
//! Consume the subscription stream through the identical apply path. Any
//! stream error or end of stream is treated as a gap: the engine re-enters
//! catch-up from the durable cursor rather than trusting the stream's
//! continuity.
//!
//! Replaying any range is a no-op: every event is skipped against the cursor
//! and checked against per-asset origins before it mutates anything.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use assetindex_core::cursor::Cursor;
use assetindex_core::error::IndexerError;
use assetindex_core::event::{DomainEvent, OwnershipTransferred, RawEvent};
use assetindex_core::indexer::{IndexerConfig, IngestState};
use assetindex_core::normalizer::normalize;
use assetindex_core::store::{ApplyOutcome, RegistryStore, RejectReason};
use assetindex_core::types::EventOrigin;

use crate::source::{EventFetcher, RegistryClient};

/// An asset excluded from the view after its events failed to resolve.
#[derive(Debug, Clone)]
pub struct DegradedAsset {
    pub asset_id: u64,
    /// The event that could not be applied.
    pub origin: EventOrigin,
    pub reason: String,
}

/// The reconciliation core: one ordered apply path shared by historical
/// replay and live consumption.
pub struct IngestEngine<C, S> {
    config: IndexerConfig,
    fetcher: EventFetcher<C>,
    store: Arc<S>,
    phase: IngestState,
    cursor: Cursor,
    /// Origins skipped because their payload would not decode — the view is
    /// knowingly incomplete at these points.
    gaps: Vec<EventOrigin>,
    degraded: HashMap<u64, DegradedAsset>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<C: RegistryClient, S: RegistryStore> IngestEngine<C, S> {
    pub fn new(config: IndexerConfig, client: C, store: Arc<S>) -> Self {
        Self {
            fetcher: EventFetcher::new(client),
            store,
            phase: IngestState::Bootstrapping,
            cursor: Cursor::default(),
            gaps: Vec::new(),
            degraded: HashMap::new(),
            shutdown: None,
            config,
        }
    }

    /// Install a shutdown signal. Checked between chunks and between live
    /// events — never mid-apply.
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(rx);
        self
    }

    /// Current state. Reports `Degraded` while any asset is excluded;
    /// scanning of unrelated assets continues underneath.
    pub fn state(&self) -> IngestState {
        if self.degraded.is_empty() {
            self.phase
        } else {
            IngestState::Degraded
        }
    }

    /// Origins of events skipped as undecodable.
    pub fn gaps(&self) -> &[EventOrigin] {
        &self.gaps
    }

    /// Assets currently excluded from the view.
    pub fn degraded(&self) -> Vec<&DegradedAsset> {
        self.degraded.values().collect()
    }

    fn should_stop(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn effective_target(&self, head: u64) -> u64 {
        self.config.to_block.map_or(head, |t| t.min(head))
    }

    /// Run until shutdown, or until `to_block` when one is configured.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        self.phase = IngestState::Bootstrapping;
        self.cursor = Cursor::new(self.store.cursor().await?);
        info!(id = %self.config.id, cursor = ?self.cursor.last(), "ingestion starting");

        loop {
            self.phase = IngestState::CatchingUp;
            let scanned_to = self.catch_up().await?;

            if self.should_stop() {
                info!(at = scanned_to, "shutdown requested");
                return Ok(());
            }
            if let Some(to_block) = self.config.to_block {
                if scanned_to >= to_block {
                    info!(at = scanned_to, "bounded run complete");
                    return Ok(());
                }
            }

            self.phase = IngestState::Live;
            self.live().await?;
            if self.should_stop() {
                return Ok(());
            }

            // the stream dropped; pause briefly, then re-sync from the cursor
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }

    /// One full catch-up pass. Returns the last scanned block.
    async fn catch_up(&mut self) -> Result<u64, IndexerError> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut next_block = self.cursor.resume_block(self.config.from_block);
        let mut target = self.effective_target(self.fetcher.head_block_number().await?);
        info!(from = next_block, target, "catch-up starting");

        while next_block <= target {
            let chunk_end = next_block.saturating_add(chunk_size - 1).min(target);
            let events = self
                .fetcher
                .fetch_range(next_block, chunk_end, chunk_size)
                .await?;
            debug!(from = next_block, to = chunk_end, events = events.len(), "chunk fetched");

            for raw in events {
                self.process(raw).await?;
            }
            next_block = chunk_end + 1;

            // chunk boundary: the only cancellation point, and the head may
            // have moved while we scanned
            if self.should_stop() {
                return Ok(chunk_end);
            }
            target = self.effective_target(self.fetcher.head_block_number().await?);
        }

        info!(at = target, "caught up to head");
        Ok(target)
    }

    /// Consume the live stream until it errors or ends.
    async fn live(&mut self) -> Result<(), IndexerError> {
        let mut stream = match self.fetcher.subscribe().await {
            Ok(stream) => stream,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "subscribe failed, re-syncing from cursor");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        info!("live subscription open");

        while let Some(item) = stream.next().await {
            if self.should_stop() {
                return Ok(());
            }
            match item {
                Ok(raw) => self.process(raw).await?,
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "subscription error, re-syncing from cursor");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }

        warn!("subscription ended, re-syncing from cursor");
        Ok(())
    }

    /// Apply one raw event. Every path out of here (apply, duplicate, skip)
    /// leaves the cursor past the event; only fatal store errors propagate.
    async fn process(&mut self, raw: RawEvent) -> Result<(), IndexerError> {
        let origin = raw.origin();
        if self.cursor.sees(origin) {
            debug!(%origin, "already covered, skipping");
            return Ok(());
        }

        let event = match normalize(&raw) {
            Ok(event) => event,
            Err(IndexerError::Decode { origin, reason }) => {
                warn!(%origin, %reason, event = %raw.event, "undecodable event skipped");
                self.gaps.push(origin);
                self.store.advance_cursor(origin).await?;
                self.cursor.advance_to(origin);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match event {
            DomainEvent::Registered(ev) => match self.store.apply_registration(&ev).await? {
                ApplyOutcome::Applied => {
                    debug!(asset = ev.id, %origin, "registration applied");
                }
                ApplyOutcome::AlreadyApplied => {
                    debug!(asset = ev.id, %origin, "registration already applied");
                }
                ApplyOutcome::Rejected(reason) => {
                    warn!(asset = ev.id, %origin, %reason, "registration rejected");
                    self.store.advance_cursor(origin).await?;
                }
            },
            DomainEvent::Transferred(ev) => self.apply_transfer(ev).await?,
        }

        self.cursor.advance_to(origin);
        Ok(())
    }

    /// Apply a transfer, retrying a bounded number of times when the asset
    /// is not registered yet (its registration may be pending in the same
    /// batch on an out-of-order source).
    async fn apply_transfer(&mut self, event: OwnershipTransferred) -> Result<(), IndexerError> {
        let origin = event.origin;
        let mut attempt = 0u32;

        loop {
            match self.store.apply_transfer(&event).await? {
                ApplyOutcome::Applied => {
                    debug!(asset = event.asset_id, %origin, "transfer applied");
                    return Ok(());
                }
                ApplyOutcome::AlreadyApplied => {
                    debug!(asset = event.asset_id, %origin, "transfer already applied");
                    return Ok(());
                }
                ApplyOutcome::Rejected(RejectReason::UnknownAsset) => {
                    if attempt < self.config.max_apply_retries {
                        attempt += 1;
                        debug!(asset = event.asset_id, %origin, attempt, "asset not registered yet, retrying");
                        tokio::time::sleep(Duration::from_millis(self.config.apply_retry_delay_ms))
                            .await;
                        continue;
                    }
                    // never fabricate an asset from a transfer; record the
                    // exclusion and keep unrelated assets flowing
                    warn!(asset = event.asset_id, %origin, "asset never resolved, marked degraded");
                    self.degraded.insert(
                        event.asset_id,
                        DegradedAsset {
                            asset_id: event.asset_id,
                            origin,
                            reason: "transfer for unregistered asset".into(),
                        },
                    );
                    self.store.advance_cursor(origin).await?;
                    return Ok(());
                }
                ApplyOutcome::Rejected(RejectReason::StaleOrigin) => {
                    warn!(asset = event.asset_id, %origin, "stale transfer rejected");
                    self.store.advance_cursor(origin).await?;
                    return Ok(());
                }
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawEventStream;
    use assetindex_core::store::RegistryStore;
    use assetindex_storage::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ALICE: &str = "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa";
    const BOB: &str = "0xBBBBbbbbBBBBbbbbBBBBbbbbBBBBbbbbBBBBbbbb";
    const CAROL: &str = "0xCCCCccccCCCCccccCCCCccccCCCCccccCCCCcccc";

    fn raw_registration(id: u64, owner: &str, ts: i64, origin: (u64, u32)) -> RawEvent {
        RawEvent {
            event: "AssetRegistered".into(),
            address: "0x29c64bdEc2973Ca6cc1766399e07996f63e52005".into(),
            tx_hash: format!("0x{:064x}", origin.0),
            block_number: origin.0,
            log_index: origin.1,
            fields: serde_json::json!({
                "id": id,
                "owner": owner,
                "description": format!("asset {id}"),
                "timestamp": ts,
            }),
        }
    }

    fn raw_transfer(
        asset_id: u64,
        from: &str,
        to: &str,
        ts: i64,
        origin: (u64, u32),
    ) -> RawEvent {
        RawEvent {
            event: "OwnershipTransferred".into(),
            address: "0x29c64bdEc2973Ca6cc1766399e07996f63e52005".into(),
            tx_hash: format!("0x{:064x}", origin.0),
            block_number: origin.0,
            log_index: origin.1,
            fields: serde_json::json!({
                "assetId": asset_id,
                "previousOwner": from,
                "newOwner": to,
                "timestamp": ts,
            }),
        }
    }

    /// In-memory client: a fixed history plus an optional live batch, with a
    /// head that can jump after the first range fetch (moving target).
    struct MockClient {
        history: Vec<RawEvent>,
        live: Mutex<Vec<RawEvent>>,
        head: Mutex<u64>,
        head_after_first_fetch: Option<u64>,
    }

    impl MockClient {
        fn new(history: Vec<RawEvent>, head: u64) -> Self {
            Self {
                history,
                live: Mutex::new(vec![]),
                head: Mutex::new(head),
                head_after_first_fetch: None,
            }
        }

        fn with_live(mut self, live: Vec<RawEvent>) -> Self {
            self.live = Mutex::new(live);
            self
        }

        fn with_moving_head(mut self, later_head: u64) -> Self {
            self.head_after_first_fetch = Some(later_head);
            self
        }
    }

    #[async_trait]
    impl RegistryClient for MockClient {
        async fn head_block_number(&self) -> Result<u64, IndexerError> {
            Ok(*self.head.lock().unwrap())
        }

        async fn fetch_range(
            &self,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<RawEvent>, IndexerError> {
            if let Some(later) = self.head_after_first_fetch {
                *self.head.lock().unwrap() = later;
            }
            Ok(self
                .history
                .iter()
                .filter(|e| (from_block..=to_block).contains(&e.block_number))
                .cloned()
                .collect())
        }

        async fn subscribe(&self) -> Result<RawEventStream, IndexerError> {
            let items: Vec<Result<RawEvent, IndexerError>> =
                self.live.lock().unwrap().drain(..).map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn bounded_config(to_block: u64, chunk_size: u64) -> IndexerConfig {
        IndexerConfig {
            to_block: Some(to_block),
            chunk_size,
            max_apply_retries: 1,
            apply_retry_delay_ms: 1,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn catch_up_materializes_the_ownership_chain() {
        let history = vec![
            raw_registration(1, ALICE, 100, (10, 0)),
            raw_transfer(1, ALICE, BOB, 200, (11, 0)),
            raw_transfer(1, BOB, CAROL, 300, (12, 0)),
        ];
        let store = Arc::new(InMemoryStore::new());
        let mut engine = IngestEngine::new(
            bounded_config(12, 2), // forces several chunks and head re-checks
            MockClient::new(history, 12),
            store.clone(),
        );
        engine.run().await.unwrap();

        assert_eq!(store.asset(1).await.unwrap().unwrap().owner, CAROL);
        let transfers = store.transfers(1).await.unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].to_owner, BOB);
        assert_eq!(transfers[1].to_owner, CAROL);
        assert_eq!(store.assets_by_owner(CAROL).await.unwrap().len(), 1);
        assert!(store.assets_by_owner(ALICE).await.unwrap().is_empty());
        assert_eq!(store.cursor().await.unwrap(), Some(EventOrigin::new(12, 0)));
        assert_eq!(engine.state(), IngestState::CatchingUp);
    }

    #[tokio::test]
    async fn replaying_the_same_range_is_idempotent() {
        let history = vec![
            raw_registration(1, ALICE, 100, (10, 0)),
            raw_transfer(1, ALICE, BOB, 200, (11, 0)),
        ];
        let store = Arc::new(InMemoryStore::new());

        let mut first = IngestEngine::new(
            bounded_config(11, 100),
            MockClient::new(history.clone(), 11),
            store.clone(),
        );
        first.run().await.unwrap();

        // simulate a restart: fresh engine, same store, same history
        let mut second = IngestEngine::new(
            bounded_config(11, 100),
            MockClient::new(history, 11),
            store.clone(),
        );
        second.run().await.unwrap();

        assert_eq!(store.assets().await.unwrap().len(), 1);
        assert_eq!(store.transfers(1).await.unwrap().len(), 1);
        assert_eq!(store.asset(1).await.unwrap().unwrap().owner, BOB);
    }

    #[tokio::test]
    async fn duplicate_delivery_applies_once() {
        let history = vec![
            raw_registration(1, ALICE, 100, (10, 0)),
            raw_transfer(1, ALICE, BOB, 200, (11, 0)),
            raw_transfer(1, ALICE, BOB, 200, (11, 0)), // redelivered
        ];
        let store = Arc::new(InMemoryStore::new());
        let mut engine = IngestEngine::new(
            bounded_config(11, 100),
            MockClient::new(history, 11),
            store.clone(),
        );
        engine.run().await.unwrap();

        assert_eq!(store.transfers(1).await.unwrap().len(), 1);
        assert_eq!(store.asset(1).await.unwrap().unwrap().owner, BOB);
    }

    #[tokio::test]
    async fn unresolved_asset_degrades_and_cursor_moves_on() {
        let history = vec![
            raw_transfer(99, ALICE, BOB, 200, (11, 0)),
            raw_registration(1, ALICE, 300, (12, 0)), // unrelated, must flow
        ];
        let store = Arc::new(InMemoryStore::new());
        let mut engine = IngestEngine::new(
            bounded_config(12, 100),
            MockClient::new(history, 12),
            store.clone(),
        );
        engine.run().await.unwrap();

        assert!(store.asset(99).await.unwrap().is_none());
        assert!(store.asset(1).await.unwrap().is_some());
        assert_eq!(store.cursor().await.unwrap(), Some(EventOrigin::new(12, 0)));
        assert_eq!(engine.state(), IngestState::Degraded);
        let degraded = engine.degraded();
        assert_eq!(degraded.len(), 1);
        assert_eq!(degraded[0].asset_id, 99);
        assert_eq!(degraded[0].origin, EventOrigin::new(11, 0));
    }

    #[tokio::test]
    async fn undecodable_event_is_a_recorded_gap() {
        let mut bad = raw_registration(1, ALICE, 100, (10, 0));
        bad.event = "Approval".into();
        let history = vec![bad, raw_registration(2, ALICE, 100, (10, 1))];

        let store = Arc::new(InMemoryStore::new());
        let mut engine = IngestEngine::new(
            bounded_config(10, 100),
            MockClient::new(history, 10),
            store.clone(),
        );
        engine.run().await.unwrap();

        assert_eq!(engine.gaps(), &[EventOrigin::new(10, 0)]);
        assert!(store.asset(2).await.unwrap().is_some());
        assert_eq!(store.cursor().await.unwrap(), Some(EventOrigin::new(10, 1)));
    }

    #[tokio::test]
    async fn moving_head_is_chased() {
        let history = vec![
            raw_registration(1, ALICE, 100, (5, 0)),
            // emitted past the initially observed head
            raw_transfer(1, ALICE, BOB, 200, (12, 0)),
        ];
        let store = Arc::new(InMemoryStore::new());
        let client = MockClient::new(history, 8).with_moving_head(12);
        let mut engine = IngestEngine::new(bounded_config(12, 100), client, store.clone());
        engine.run().await.unwrap();

        assert_eq!(store.asset(1).await.unwrap().unwrap().owner, BOB);
        assert_eq!(store.cursor().await.unwrap(), Some(EventOrigin::new(12, 0)));
    }

    #[tokio::test]
    async fn live_events_flow_through_the_same_path() {
        let history = vec![raw_registration(1, ALICE, 100, (10, 0))];
        let live = vec![raw_transfer(1, ALICE, BOB, 200, (11, 0))];
        let store = Arc::new(InMemoryStore::new());

        let client = MockClient::new(history, 10).with_live(live);
        let config = IndexerConfig {
            chunk_size: 100,
            poll_interval_ms: 1,
            apply_retry_delay_ms: 1,
            ..Default::default()
        };
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut engine = IngestEngine::new(config, client, store.clone()).with_shutdown(stop_rx);

        let handle = tokio::spawn(async move { engine.run().await });

        // wait for the live transfer to land, then stop the engine
        for _ in 0..500 {
            if store.transfers(1).await.unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        stop_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(store.asset(1).await.unwrap().unwrap().owner, BOB);
        assert_eq!(store.cursor().await.unwrap(), Some(EventOrigin::new(11, 0)));
    }

    #[tokio::test]
    async fn transfer_before_registration_never_fabricates_an_asset() {
        // the ledger delivered the transfer ahead of its registration
        let history = vec![
            raw_transfer(1, ALICE, BOB, 200, (10, 0)),
            raw_registration(1, ALICE, 100, (10, 1)),
        ];
        let store = Arc::new(InMemoryStore::new());
        let mut engine = IngestEngine::new(
            bounded_config(10, 100),
            MockClient::new(history, 10),
            store.clone(),
        );
        engine.run().await.unwrap();

        // the transfer was degraded (its asset did not exist yet), but the
        // registration itself still landed
        let asset = store.asset(1).await.unwrap().unwrap();
        assert_eq!(asset.owner, ALICE);
        assert_eq!(engine.degraded().len(), 1);
    }
}
