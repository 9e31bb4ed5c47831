//! Shared types for the materialized registry view.

use serde::{Deserialize, Serialize};

// ─── EventOrigin ──────────────────────────────────────────────────────────────

/// Identifies one ledger event occurrence — the dedup key.
///
/// Ordering is lexicographic on `(block_number, log_index)`, which is the
/// order the ledger emitted the events in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventOrigin {
    /// Block the event was emitted in.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u32,
}

impl EventOrigin {
    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl std::fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// ─── Asset ────────────────────────────────────────────────────────────────────

/// One registered item in the materialized view.
///
/// `owner` always equals the `to_owner` of the newest applied transfer for
/// this asset, or the registrant if no transfer has been applied. Everything
/// else is immutable after registration; assets are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Ledger-assigned identifier (never generated locally).
    pub id: u64,
    /// Current holder address, original casing preserved.
    pub owner: String,
    /// Free-text metadata captured at registration.
    pub description: String,
    /// Ledger-reported registration time (seconds since epoch).
    pub registered_at: i64,
}

// ─── Transfer ─────────────────────────────────────────────────────────────────

/// One ownership change, append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Store-assigned row id, used only for local ordering.
    pub local_id: i64,
    pub asset_id: u64,
    pub from_owner: String,
    pub to_owner: String,
    /// Ledger-reported event time (seconds since epoch).
    pub timestamp: i64,
    /// The ledger occurrence this row was materialized from.
    pub origin: EventOrigin,
}

// ─── Address helpers ──────────────────────────────────────────────────────────

/// Case-insensitive address comparison. Storage keeps original casing;
/// lookups must not depend on it.
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Returns `true` if `s` has the shape of a ledger address (`0x` + 40 hex).
pub fn is_address(s: &str) -> bool {
    let Some(hex) = s.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
