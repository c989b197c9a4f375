//! State Record - one per (entity, year)
//!
//! # Critical Invariants
//!
//! 1. All values are i64 fixed-point (cents)
//! 2. Records are immutable once sealed; a correction is a new record with a
//!    later `record_uuid`
//! 3. `integrity_hash` covers every other field except `is_current`
//! 4. `is_current` is a view flag: read paths set it on the latest record of
//!    each entity as of the requested year, so stored history never needs
//!    rewriting when a later year supersedes a record

use crate::core::audit::{digest_json, AuditStamp};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a record's value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Seeded from the baseline roster (first simulated year only)
    Baseline,
    /// At least one event touched the entity this year
    EventDerived,
    /// No event this year; prior value copied forward
    CarriedForward,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Baseline => "baseline",
            SourceType::EventDerived => "event_derived",
            SourceType::CarriedForward => "carried_forward",
        }
    }
}

/// Unsealed record content produced by the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    pub entity_id: String,
    pub year: i32,
    pub current_value: i64,
    pub source_type: SourceType,
    pub source_event_ids: Vec<String>,
    pub is_active: bool,
}

/// Sealed, immutable per-entity state for one year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    entity_id: String,
    year: i32,
    current_value: i64,
    source_type: SourceType,
    source_event_ids: Vec<String>,
    /// Latest record of the entity as of the year being read
    is_current: bool,
    is_active: bool,
    record_uuid: Uuid,
    created_at: DateTime<Utc>,
    integrity_hash: String,
}

/// Everything the integrity hash covers, in a fixed field order
#[derive(Serialize)]
struct HashedFields<'a> {
    entity_id: &'a str,
    year: i32,
    current_value: i64,
    source_type: SourceType,
    source_event_ids: &'a [String],
    is_active: bool,
    record_uuid: &'a Uuid,
    created_at: &'a DateTime<Utc>,
}

impl StateRecord {
    pub(crate) fn seal(draft: RecordDraft, stamp: AuditStamp) -> Result<Self, EngineError> {
        let mut record = StateRecord {
            entity_id: draft.entity_id,
            year: draft.year,
            current_value: draft.current_value,
            source_type: draft.source_type,
            source_event_ids: draft.source_event_ids,
            is_current: true,
            is_active: draft.is_active,
            record_uuid: stamp.record_uuid,
            created_at: stamp.created_at,
            integrity_hash: String::new(),
        };
        record.integrity_hash = record.compute_hash()?;
        Ok(record)
    }

    fn compute_hash(&self) -> Result<String, EngineError> {
        digest_json(&HashedFields {
            entity_id: &self.entity_id,
            year: self.year,
            current_value: self.current_value,
            source_type: self.source_type,
            source_event_ids: &self.source_event_ids,
            is_active: self.is_active,
            record_uuid: &self.record_uuid,
            created_at: &self.created_at,
        })
    }

    /// Same record with the view flag set for a particular as-of year
    pub(crate) fn with_current(mut self, is_current: bool) -> Self {
        self.is_current = is_current;
        self
    }

    /// Recompute the hash and compare with the stored one
    pub fn verify_integrity(&self) -> Result<bool, EngineError> {
        Ok(self.compute_hash()? == self.integrity_hash)
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn current_value(&self) -> i64 {
        self.current_value
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn source_event_ids(&self) -> &[String] {
        &self.source_event_ids
    }

    pub fn is_current(&self) -> bool {
        self.is_current
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn record_uuid(&self) -> Uuid {
        self.record_uuid
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn integrity_hash(&self) -> &str {
        &self.integrity_hash
    }
}
