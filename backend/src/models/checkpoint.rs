//! Checkpoint - immutable per-(scenario, year) completion marker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable proof that a year's state records exist and were validated
///
/// Append-only: a checkpoint is never updated in place, and its presence is
/// what makes the year's records visible to downstream consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: Uuid,
    pub scenario_id: String,
    pub year: i32,
    /// Aggregate hash over every record of the year, ordered by entity id
    pub state_hash: String,
    pub event_count: u64,
    pub record_count: u64,
    /// Hash binding scenario, year, counts and `state_hash` together
    pub validation_hash: String,
    pub created_at: DateTime<Utc>,
}
