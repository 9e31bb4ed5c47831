//! Ingestion cursor — tracks progress through the ledger's event sequence.
//!
//! The durable cursor lives in the store and is written only inside the same
//! transaction as the domain write it accompanies. This type is the engine's
//! in-memory mirror of it: loaded once at bootstrap, advanced as events are
//! applied, used to skip the already-applied prefix on replay.

use serde::{Deserialize, Serialize};

use crate::types::EventOrigin;

/// In-memory mirror of the persisted ingestion cursor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cursor {
    last: Option<EventOrigin>,
}

impl Cursor {
    /// Create a cursor from the store's persisted position (`None` = genesis).
    pub fn new(last: Option<EventOrigin>) -> Self {
        Self { last }
    }

    /// The last applied origin, if any.
    pub fn last(&self) -> Option<EventOrigin> {
        self.last
    }

    /// Returns `true` if `origin` is already covered by the cursor
    /// (applied or deliberately skipped).
    pub fn sees(&self, origin: EventOrigin) -> bool {
        self.last.is_some_and(|last| origin <= last)
    }

    /// Advance to `origin`. Monotonic: an older origin never moves it back.
    pub fn advance_to(&mut self, origin: EventOrigin) {
        if !self.sees(origin) {
            self.last = Some(origin);
        }
    }

    /// The block to resume scanning from. The cursor block is re-fetched
    /// rather than `cursor + 1` because later log indexes of that block may
    /// not have been applied; `sees` filters the prefix that was.
    pub fn resume_block(&self, genesis_block: u64) -> u64 {
        self.last
            .map_or(genesis_block, |last| last.block_number.max(genesis_block))
    }
}
