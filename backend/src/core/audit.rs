//! Audit Record Builder
//!
//! Stamps every state record with a time-ordered uuid, a high-resolution
//! creation timestamp and a SHA-256 integrity hash over all other fields.
//!
//! # Critical Invariants
//!
//! - **Determinism**: same seed + same clock reading + same draft produces a
//!   byte-identical record (uuid, timestamp and hash included)
//! - **Tamper evidence**: any change to a sealed record's fields makes
//!   [`StateRecord::verify_integrity`] return `false`

use crate::core::time::Clock;
use crate::error::EngineError;
use crate::models::record::{RecordDraft, StateRecord};
use crate::rng::RngManager;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::{Builder, Uuid};

/// Identity and time stamp attached to a sealed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditStamp {
    pub record_uuid: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Seals [`RecordDraft`]s into immutable [`StateRecord`]s
///
/// Safe to share across worker threads: uuid randomness comes from a
/// per-record stream keyed by `(seed, year, entity, timestamp)`, never from
/// shared mutable generator state.
#[derive(Clone)]
pub struct AuditRecordBuilder {
    seed: u64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuditRecordBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecordBuilder")
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl AuditRecordBuilder {
    pub fn new(seed: u64, clock: Arc<dyn Clock>) -> Self {
        Self { seed, clock }
    }

    /// Produce a uuid + timestamp for one record of `entity_id` in `year`
    pub fn stamp(&self, year: i32, entity_id: &str) -> AuditStamp {
        let created_at = self.clock.now();
        let key = format!(
            "{}/{}/{}",
            year,
            entity_id,
            created_at.timestamp_nanos_opt().unwrap_or_default()
        );
        let mut rng = RngManager::for_stream(self.seed, &key);
        let mut random = [0u8; 10];
        rng.fill_bytes(&mut random);

        AuditStamp {
            record_uuid: time_ordered_uuid(created_at, &random),
            created_at,
        }
    }

    /// Stamp and hash a draft
    pub fn seal(&self, draft: RecordDraft) -> Result<StateRecord, EngineError> {
        let stamp = self.stamp(draft.year, &draft.entity_id);
        StateRecord::seal(draft, stamp)
    }
}

/// Version-7 uuid: 48-bit unix millis, then random bits
///
/// Records sort by creation time when compared by uuid, so a correction
/// written later always carries a later `record_uuid`.
fn time_ordered_uuid(created_at: DateTime<Utc>, random: &[u8; 10]) -> Uuid {
    let millis = created_at.timestamp_millis().max(0) as u64;
    Builder::from_unix_timestamp_millis(millis, random).into_uuid()
}

/// SHA-256 hex digest of the JSON encoding of `value`
///
/// Struct fields serialize in declaration order, so this is stable for
/// plain structs. Use [`canonical_hash`] for anything holding maps.
pub fn digest_json<T: Serialize + ?Sized>(value: &T) -> Result<String, EngineError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(sha256_hex(&bytes))
}

/// Deterministic SHA-256 of `value` with all object keys sorted
///
/// Uses canonical JSON serialization with sorted keys to ensure
/// deterministic hashing regardless of HashMap iteration order.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, EngineError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(value)?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))?;
    Ok(sha256_hex(json.as_bytes()))
}

/// Aggregate hash over a year's records, independent of input order
///
/// Records are folded in entity-id order using only their integrity hashes,
/// so any field change in any record changes the aggregate.
pub fn aggregate_state_hash<'a, I>(year: i32, records: I) -> String
where
    I: IntoIterator<Item = &'a StateRecord>,
{
    let mut entries: Vec<(&str, &str)> = records
        .into_iter()
        .map(|r| (r.entity_id(), r.integrity_hash()))
        .collect();
    entries.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(year.to_be_bytes());
    for (entity_id, hash) in entries {
        hasher.update(entity_id.as_bytes());
        hasher.update(b":");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
