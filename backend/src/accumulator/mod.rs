//! Temporal State Accumulator
//!
//! Computes year N's per-entity state from year N-1's state plus year N's
//! events, and from nothing else.
//!
//! # Critical Invariants
//!
//! 1. **No circular dependency**: [`TemporalStateAccumulator::compute`] only
//!    accepts an [`AccumulationInput`] (previous year or baseline) and a
//!    [`YearEvents`] (this year only). It holds no store handle, so reading
//!    this year's downstream outputs is not expressible.
//! 2. **Carry-forward completeness**: every active prior entity gets exactly
//!    one record per year, carried forward when no event touched it.
//! 3. **Latest wins**: conflicting events resolve by effective date (then
//!    event id); every contributing event id is kept for audit.
//! 4. **Determinism**: output does not depend on worker scheduling.

mod prior;

pub use prior::{AccumulationInput, PriorYearState};

use crate::coordinator::dependency::{plan_transition, DependencySet};
use crate::core::audit::AuditRecordBuilder;
use crate::error::EngineError;
use crate::models::{RecordDraft, SourceType, StateRecord, YearEvent, YearEvents};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Applies one year of events to the previous year's state
#[derive(Debug, Clone)]
pub struct TemporalStateAccumulator {
    builder: AuditRecordBuilder,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl TemporalStateAccumulator {
    pub fn new(builder: AuditRecordBuilder) -> Self {
        Self {
            builder,
            pool: None,
        }
    }

    /// Run per-entity work on a dedicated rayon pool instead of the global one
    pub fn with_pool(mut self, pool: Arc<rayon::ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Compute all state records for `year`
    ///
    /// # Errors
    ///
    /// `InvalidInput` if `input` is not the year immediately before
    /// `events.year()`.
    pub fn compute(
        &self,
        input: &AccumulationInput,
        events: &YearEvents,
    ) -> Result<Vec<StateRecord>, EngineError> {
        let plan = plan_transition(input, events)?;
        self.compute_planned(input, events, &plan)
    }

    /// Compute using a precomputed (possibly cached) dependency plan
    ///
    /// A plan that does not match `input`/`events` is rejected rather than
    /// trusted, so a stale cache entry can never change the result.
    pub fn compute_planned(
        &self,
        input: &AccumulationInput,
        events: &YearEvents,
        plan: &DependencySet,
    ) -> Result<Vec<StateRecord>, EngineError> {
        let year = events.year();
        if !plan.is_valid_for(input, events)? {
            return Err(EngineError::InvalidInput(format!(
                "dependency plan {} -> {} does not match accumulation inputs",
                plan.from_year, plan.to_year
            )));
        }

        let grouped = events.by_entity();
        let event_groups: Vec<(&str, &Vec<&YearEvent>)> = plan
            .parallel
            .iter()
            .chain(plan.sequential.iter())
            .map(|id| {
                grouped
                    .get_key_value(id.as_str())
                    .map(|(k, v)| (*k, v))
                    .ok_or_else(|| {
                        EngineError::InvalidInput(format!("plan names {} without events", id))
                    })
            })
            .collect::<Result<_, _>>()?;

        let event_drafts = self.run_parallel(|| {
            event_groups
                .par_iter()
                .map(|(entity_id, entity_events)| {
                    self.builder.seal(resolve_events(year, entity_id, entity_events))
                })
                .collect::<Result<Vec<_>, EngineError>>()
        })?;

        let carried = self.run_parallel(|| {
            plan.cacheable
                .par_iter()
                .map(|entity_id| {
                    let draft = carry_forward(year, entity_id, input)?;
                    self.builder.seal(draft)
                })
                .collect::<Result<Vec<_>, EngineError>>()
        })?;

        let mut records: BTreeMap<String, StateRecord> = BTreeMap::new();
        for record in event_drafts.into_iter().chain(carried) {
            let id = record.entity_id().to_string();
            if records.insert(id.clone(), record).is_some() {
                return Err(EngineError::InvalidInput(format!(
                    "entity {} planned twice for year {}",
                    id, year
                )));
            }
        }

        debug!(
            year,
            event_derived = plan.parallel.len() + plan.sequential.len(),
            carried_forward = plan.cacheable.len(),
            pruned = plan.pruned.len(),
            "accumulated year"
        );
        Ok(records.into_values().collect())
    }

    fn run_parallel<T, F>(&self, work: F) -> T
    where
        F: FnOnce() -> T + Send,
        T: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}

/// Latest event wins; all ids retained in application order
fn resolve_events(year: i32, entity_id: &str, events: &[&YearEvent]) -> RecordDraft {
    // `YearEvents` keeps each entity's events sorted by (effective_date, event_id)
    let latest = events[events.len() - 1];
    RecordDraft {
        entity_id: entity_id.to_string(),
        year,
        current_value: latest.new_value,
        source_type: SourceType::EventDerived,
        source_event_ids: events.iter().map(|e| e.event_id.clone()).collect(),
        is_active: !latest.deactivates,
    }
}

fn carry_forward(
    year: i32,
    entity_id: &str,
    input: &AccumulationInput,
) -> Result<RecordDraft, EngineError> {
    let value = input.value_of(entity_id).ok_or_else(|| {
        EngineError::InvalidInput(format!(
            "entity {} has no prior value for year {}",
            entity_id, year
        ))
    })?;

    let source_type = match input {
        AccumulationInput::Baseline { .. } => SourceType::Baseline,
        AccumulationInput::PriorYear(_) => SourceType::CarriedForward,
    };

    Ok(RecordDraft {
        entity_id: entity_id.to_string(),
        year,
        current_value: value,
        source_type,
        source_event_ids: Vec::new(),
        is_active: true,
    })
}
