//! Input events and baseline roster
//!
//! Both are produced by external collaborators (the business-rule layer and
//! the baseline data provider) and are read-only to the engine.
//!
//! [`YearEvents`] can only be built from events effective inside a single
//! year, which keeps later-year data structurally out of a year's
//! accumulation.

use crate::core::audit::digest_json;
use crate::error::EngineError;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A single per-entity value change produced for one year
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use multiyear_sim_core_rs::models::YearEvent;
///
/// let event = YearEvent {
///     event_id: "evt_00000042".to_string(),
///     entity_id: "EMP_001".to_string(),
///     year: 2026,
///     effective_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
///     new_value: 7_250_000,
///     deactivates: false,
/// };
/// assert_eq!(event.year, 2026);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearEvent {
    pub event_id: String,
    pub entity_id: String,
    pub year: i32,
    pub effective_date: NaiveDate,
    pub new_value: i64,
    /// Entity leaves the active population (e.g. termination)
    #[serde(default)]
    pub deactivates: bool,
}

/// Initial roster row, consumed only for the first simulated year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineEntity {
    pub entity_id: String,
    pub initial_value: i64,
    pub effective_date: NaiveDate,
}

/// Validated events for exactly one year
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearEvents {
    year: i32,
    /// Sorted by (entity, effective_date, event_id)
    events: Vec<YearEvent>,
}

impl YearEvents {
    /// Validate and order events for `year`
    ///
    /// # Errors
    ///
    /// `InvalidInput` if any event belongs to another year, has an
    /// effective date outside `year`, or repeats an `event_id`.
    pub fn new(year: i32, mut events: Vec<YearEvent>) -> Result<Self, EngineError> {
        let mut seen = HashSet::with_capacity(events.len());
        for event in &events {
            if event.year != year {
                return Err(EngineError::InvalidInput(format!(
                    "event {} belongs to year {}, expected {}",
                    event.event_id, event.year, year
                )));
            }
            if event.effective_date.year() != year {
                return Err(EngineError::InvalidInput(format!(
                    "event {} effective {} lies outside year {}",
                    event.event_id, event.effective_date, year
                )));
            }
            if !seen.insert(event.event_id.as_str()) {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate event id {}",
                    event.event_id
                )));
            }
        }

        events.sort_by(|a, b| {
            a.entity_id
                .cmp(&b.entity_id)
                .then(a.effective_date.cmp(&b.effective_date))
                .then(a.event_id.cmp(&b.event_id))
        });

        Ok(Self { year, events })
    }

    pub fn empty(year: i32) -> Self {
        Self {
            year,
            events: Vec::new(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &YearEvent> {
        self.events.iter()
    }

    /// Events grouped per entity, each group in application order
    pub fn by_entity(&self) -> BTreeMap<&str, Vec<&YearEvent>> {
        let mut grouped: BTreeMap<&str, Vec<&YearEvent>> = BTreeMap::new();
        for event in &self.events {
            grouped.entry(event.entity_id.as_str()).or_default().push(event);
        }
        grouped
    }

    /// Content fingerprint, used to validate cached transition plans
    pub fn fingerprint(&self) -> Result<String, EngineError> {
        digest_json(&(self.year, &self.events))
    }
}

/// Validated baseline roster keyed by entity id
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BaselineRoster {
    entities: BTreeMap<String, BaselineEntity>,
}

impl BaselineRoster {
    /// # Errors
    ///
    /// `InvalidInput` on duplicate entity ids.
    pub fn new(rows: Vec<BaselineEntity>) -> Result<Self, EngineError> {
        let mut entities = BTreeMap::new();
        for row in rows {
            let id = row.entity_id.clone();
            if entities.insert(id.clone(), row).is_some() {
                return Err(EngineError::InvalidInput(format!(
                    "duplicate baseline entity {}",
                    id
                )));
            }
        }
        Ok(Self { entities })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, entity_id: &str) -> Option<&BaselineEntity> {
        self.entities.get(entity_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BaselineEntity> {
        self.entities.values()
    }
}
