//! Event normalizer — converts raw source payloads into domain events.
//!
//! Pure: no I/O, no side effects. Decode failures are reported with the
//! offending origin so operators can tell "no events" from "events we
//! couldn't parse".

use serde_json::Value;

use crate::error::IndexerError;
use crate::event::{AssetRegistered, DomainEvent, OwnershipTransferred, RawEvent};

/// Normalize a raw event into a typed domain event.
pub fn normalize(raw: &RawEvent) -> Result<DomainEvent, IndexerError> {
    let origin = raw.origin();
    match raw.event.as_str() {
        "AssetRegistered" => Ok(DomainEvent::Registered(AssetRegistered {
            id: field_u64(raw, "id")?,
            owner: field_str(raw, "owner")?,
            description: field_str(raw, "description")?,
            timestamp: field_i64(raw, "timestamp")?,
            origin,
        })),
        "OwnershipTransferred" => Ok(DomainEvent::Transferred(OwnershipTransferred {
            asset_id: field_u64(raw, "assetId")?,
            from_owner: field_str(raw, "previousOwner")?,
            to_owner: field_str(raw, "newOwner")?,
            timestamp: field_i64(raw, "timestamp")?,
            origin,
        })),
        other => Err(IndexerError::decode(
            origin,
            format!("unsupported event '{other}'"),
        )),
    }
}

// Log arguments arrive as JSON; integer-valued fields may be numbers or
// decimal strings depending on how the provider serializes uint256.

fn field<'a>(raw: &'a RawEvent, name: &str) -> Result<&'a Value, IndexerError> {
    raw.fields
        .get(name)
        .ok_or_else(|| IndexerError::decode(raw.origin(), format!("missing field '{name}'")))
}

fn field_u64(raw: &RawEvent, name: &str) -> Result<u64, IndexerError> {
    let v = field(raw, name)?;
    v.as_u64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| {
            IndexerError::decode(raw.origin(), format!("field '{name}' is not a u64"))
        })
}

fn field_i64(raw: &RawEvent, name: &str) -> Result<i64, IndexerError> {
    let v = field(raw, name)?;
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        .ok_or_else(|| {
            IndexerError::decode(raw.origin(), format!("field '{name}' is not an i64"))
        })
}

fn field_str(raw: &RawEvent, name: &str) -> Result<String, IndexerError> {
    field(raw, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            IndexerError::decode(raw.origin(), format!("field '{name}' is not a string"))
        })
}
