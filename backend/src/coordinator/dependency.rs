//! Year-transition dependency planning
//!
//! An event-derived value is fully determined by the entity's latest event,
//! so only entities *without* events need anything from the prior year. The
//! planner makes that explicit and partitions the next year's work:
//!
//! - **parallel**: exactly one event; resolvable independently
//! - **sequential**: several events; must be applied in timestamp order
//! - **cacheable**: untouched active entities; prior value is reused as-is
//! - **pruned**: inactive prior entities with no events; not needed at all

use crate::accumulator::AccumulationInput;
use crate::error::EngineError;
use crate::models::YearEvents;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ephemeral dependency plan for one year transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    pub from_year: i32,
    pub to_year: i32,
    pub parallel: Vec<String>,
    pub sequential: Vec<String>,
    pub cacheable: Vec<String>,
    pub pruned: Vec<String>,
    /// Fingerprint of the accumulation input the plan was built from
    pub input_fingerprint: String,
    /// Fingerprint of the events the plan was built from
    pub events_fingerprint: String,
}

impl DependencySet {
    /// Entities that will receive a record in `to_year`
    pub fn output_entities(&self) -> usize {
        self.parallel.len() + self.sequential.len() + self.cacheable.len()
    }

    /// Prior-year entities whose values the transition actually reads
    pub fn required_prior_entities(&self) -> &[String] {
        &self.cacheable
    }

    /// Whether this plan was derived from exactly these inputs
    pub fn is_valid_for(
        &self,
        input: &AccumulationInput,
        events: &YearEvents,
    ) -> Result<bool, EngineError> {
        Ok(self.to_year == events.year()
            && self.from_year == input.year()
            && self.input_fingerprint == input.fingerprint()?
            && self.events_fingerprint == events.fingerprint()?)
    }
}

/// Compute the dependency plan for `input.year() -> events.year()`
///
/// # Errors
///
/// `InvalidInput` if the years are not consecutive.
pub fn plan_transition(
    input: &AccumulationInput,
    events: &YearEvents,
) -> Result<DependencySet, EngineError> {
    let from_year = input.year();
    let to_year = events.year();
    if to_year != from_year + 1 {
        return Err(EngineError::InvalidInput(format!(
            "transition {} -> {} is not a single-year step",
            from_year, to_year
        )));
    }

    let grouped = events.by_entity();
    let mut parallel = Vec::new();
    let mut sequential = Vec::new();
    for (entity_id, entity_events) in &grouped {
        if entity_events.len() == 1 {
            parallel.push(entity_id.to_string());
        } else {
            sequential.push(entity_id.to_string());
        }
    }

    let touched: BTreeSet<&str> = grouped.keys().copied().collect();
    let mut cacheable = Vec::new();
    let mut pruned = Vec::new();
    for (entity_id, active) in input.entities() {
        if touched.contains(entity_id) {
            continue;
        }
        if active {
            cacheable.push(entity_id.to_string());
        } else {
            pruned.push(entity_id.to_string());
        }
    }

    Ok(DependencySet {
        from_year,
        to_year,
        parallel,
        sequential,
        cacheable,
        pruned,
        input_fingerprint: input.fingerprint()?,
        events_fingerprint: events.fingerprint()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BaselineEntity, BaselineRoster, YearEvent};
    use chrono::NaiveDate;

    fn roster(ids: &[&str]) -> AccumulationInput {
        let rows = ids
            .iter()
            .map(|id| BaselineEntity {
                entity_id: id.to_string(),
                initial_value: 100,
                effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            })
            .collect();
        AccumulationInput::baseline(2025, BaselineRoster::new(rows).unwrap())
    }

    fn event(id: &str, entity: &str, month: u32) -> YearEvent {
        YearEvent {
            event_id: id.to_string(),
            entity_id: entity.to_string(),
            year: 2025,
            effective_date: NaiveDate::from_ymd_opt(2025, month, 1).unwrap(),
            new_value: 1,
            deactivates: false,
        }
    }

    #[test]
    fn test_partitions_by_event_count() {
        let input = roster(&["A", "B", "C"]);
        let events = YearEvents::new(
            2025,
            vec![event("e1", "A", 1), event("e2", "B", 1), event("e3", "B", 6), event("e4", "NEW", 2)],
        )
        .unwrap();

        let plan = plan_transition(&input, &events).unwrap();
        assert_eq!(plan.from_year, 2024);
        assert_eq!(plan.parallel, vec!["A".to_string(), "NEW".to_string()]);
        assert_eq!(plan.sequential, vec!["B".to_string()]);
        assert_eq!(plan.cacheable, vec!["C".to_string()]);
        assert_eq!(plan.required_prior_entities(), &["C".to_string()]);
        assert_eq!(plan.output_entities(), 4);
    }

    #[test]
    fn test_rejects_non_consecutive_years() {
        let input = roster(&["A"]);
        let events = YearEvents::empty(2027);
        assert!(plan_transition(&input, &events).is_err());
    }

    #[test]
    fn test_plan_validity_tracks_events() {
        let input = roster(&["A"]);
        let events = YearEvents::new(2025, vec![event("e1", "A", 1)]).unwrap();
        let plan = plan_transition(&input, &events).unwrap();

        assert!(plan.is_valid_for(&input, &events).unwrap());
        let other = YearEvents::new(2025, vec![event("e9", "A", 2)]).unwrap();
        assert!(!plan.is_valid_for(&input, &other).unwrap());
    }
}
