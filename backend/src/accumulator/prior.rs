//! Accumulation inputs
//!
//! The only two things a year may be computed from: the baseline roster
//! (first simulated year) or the previous year's current records.

use crate::core::audit::{aggregate_state_hash, digest_json};
use crate::error::EngineError;
use crate::models::{BaselineRoster, StateRecord};
use std::collections::BTreeMap;

/// Current records of one completed year, keyed by entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorYearState {
    year: i32,
    records: BTreeMap<String, StateRecord>,
    state_hash: String,
}

impl PriorYearState {
    /// Build from the records of `year`
    ///
    /// # Errors
    ///
    /// `InvalidInput` if a record belongs to another year, is not current,
    /// or an entity appears twice.
    pub fn from_records(year: i32, records: Vec<StateRecord>) -> Result<Self, EngineError> {
        let state_hash = aggregate_state_hash(year, records.iter());
        let mut by_entity = BTreeMap::new();
        for record in records {
            if record.year() != year {
                return Err(EngineError::InvalidInput(format!(
                    "record for {} is from year {}, expected {}",
                    record.entity_id(),
                    record.year(),
                    year
                )));
            }
            if !record.is_current() {
                return Err(EngineError::InvalidInput(format!(
                    "record {} for {} is not current",
                    record.record_uuid(),
                    record.entity_id()
                )));
            }
            let id = record.entity_id().to_string();
            if by_entity.insert(id.clone(), record).is_some() {
                return Err(EngineError::InvalidInput(format!(
                    "entity {} has two current records in year {}",
                    id, year
                )));
            }
        }

        Ok(Self {
            year,
            records: by_entity,
            state_hash,
        })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Aggregate hash of the records (equals the checkpoint's `state_hash`)
    pub fn state_hash(&self) -> &str {
        &self.state_hash
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, entity_id: &str) -> Option<&StateRecord> {
        self.records.get(entity_id)
    }

    /// Records in entity-id order
    pub fn records(&self) -> impl Iterator<Item = &StateRecord> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<StateRecord> {
        self.records.into_values().collect()
    }
}

/// What a year is allowed to be computed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccumulationInput {
    /// Cold start: roster seeds `first_year`
    Baseline {
        first_year: i32,
        roster: BaselineRoster,
    },
    /// Continuation from the previous year's current records
    PriorYear(PriorYearState),
}

impl AccumulationInput {
    pub fn baseline(first_year: i32, roster: BaselineRoster) -> Self {
        AccumulationInput::Baseline { first_year, roster }
    }

    /// The year this input represents (the year before the one computed)
    pub fn year(&self) -> i32 {
        match self {
            AccumulationInput::Baseline { first_year, .. } => first_year - 1,
            AccumulationInput::PriorYear(prior) => prior.year(),
        }
    }

    /// `(entity_id, is_active)` for every entity the input knows
    pub fn entities(&self) -> Box<dyn Iterator<Item = (&str, bool)> + '_> {
        match self {
            AccumulationInput::Baseline { roster, .. } => {
                Box::new(roster.iter().map(|row| (row.entity_id.as_str(), true)))
            }
            AccumulationInput::PriorYear(prior) => Box::new(
                prior
                    .records()
                    .map(|r| (r.entity_id(), r.is_active())),
            ),
        }
    }

    /// Value to carry into the next year, for active entities only
    pub fn value_of(&self, entity_id: &str) -> Option<i64> {
        match self {
            AccumulationInput::Baseline { roster, .. } => {
                roster.get(entity_id).map(|row| row.initial_value)
            }
            AccumulationInput::PriorYear(prior) => prior
                .get(entity_id)
                .filter(|r| r.is_active())
                .map(|r| r.current_value()),
        }
    }

    /// Content fingerprint used to validate cached plans
    pub fn fingerprint(&self) -> Result<String, EngineError> {
        match self {
            AccumulationInput::Baseline { first_year, roster } => {
                let rows: Vec<_> = roster.iter().collect();
                digest_json(&(first_year, rows))
            }
            AccumulationInput::PriorYear(prior) => Ok(prior.state_hash().to_string()),
        }
    }
}
