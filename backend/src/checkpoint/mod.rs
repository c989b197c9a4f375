//! Checkpoint & Resume Manager
//!
//! Turns a year's staged records into an immutable, hash-verified
//! checkpoint, and rebuilds simulation state from any checkpoint.
//!
//! # Critical Invariants
//!
//! - **Validate-then-write**: every check runs before the store is touched;
//!   a failed validation discards the staged records and writes nothing
//! - **Immutability**: checkpoints are append-only; resume never mutates one
//! - **No silent resume**: any hash mismatch raises `CheckpointCorruption`
//! - **Completeness**: `persist` refuses a year that drops an entity its
//!   predecessor carries as active
//! - **Round-trip**: `resume(persist(y).checkpoint_id)` yields exactly the
//!   records that were staged when `persist(y)` ran

use crate::accumulator::{AccumulationInput, PriorYearState};
use crate::core::audit::{aggregate_state_hash, canonical_hash};
use crate::core::time::Clock;
use crate::error::EngineError;
use crate::models::{Checkpoint, StateRecord};
use crate::store::{StateStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// State reconstructed from a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationState {
    pub checkpoint: Checkpoint,
    pub state: PriorYearState,
}

impl SimulationState {
    pub fn year(&self) -> i32 {
        self.checkpoint.year
    }
}

/// Outcome of the pre-checkpoint validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub year: i32,
    pub record_count: usize,
    pub active_count: usize,
    pub state_hash: String,
}

#[derive(Serialize)]
struct ValidatedFields<'a> {
    checkpoint_id: &'a Uuid,
    scenario_id: &'a str,
    year: i32,
    state_hash: &'a str,
    event_count: u64,
    record_count: u64,
    created_at: &'a DateTime<Utc>,
}

fn validation_hash(checkpoint: &Checkpoint) -> Result<String, EngineError> {
    canonical_hash(&ValidatedFields {
        checkpoint_id: &checkpoint.checkpoint_id,
        scenario_id: &checkpoint.scenario_id,
        year: checkpoint.year,
        state_hash: &checkpoint.state_hash,
        event_count: checkpoint.event_count,
        record_count: checkpoint.record_count,
        created_at: &checkpoint.created_at,
    })
}

/// Persists and restores per-year checkpoints for one scenario
pub struct CheckpointManager<S: StateStore> {
    scenario: String,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: StateStore> CheckpointManager<S> {
    pub fn new(scenario: impl Into<String>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            scenario: scenario.into(),
            store,
            clock,
        }
    }

    fn integrity_error(&self, year: i32, reason: impl Into<String>) -> EngineError {
        EngineError::CheckpointIntegrity {
            scenario: self.scenario.clone(),
            year,
            reason: reason.into(),
        }
    }

    fn check_predecessor(
        &self,
        year: i32,
        predecessor: &AccumulationInput,
    ) -> Result<(), EngineError> {
        if predecessor.year() != year - 1 {
            return Err(self.integrity_error(
                year,
                format!(
                    "predecessor is year {}, expected {}",
                    predecessor.year(),
                    year - 1
                ),
            ));
        }

        match (predecessor, self.checkpoint_for_year(year - 1)?) {
            (AccumulationInput::Baseline { .. }, None) => Ok(()),
            (AccumulationInput::Baseline { .. }, Some(_)) => Err(self.integrity_error(
                year,
                format!("year {} is checkpointed; baseline cannot seed year {}", year - 1, year),
            )),
            (AccumulationInput::PriorYear(_), None) => Err(self.integrity_error(
                year,
                format!("predecessor year {} has no checkpoint", year - 1),
            )),
            (AccumulationInput::PriorYear(prior), Some(checkpoint)) => {
                if prior.state_hash() == checkpoint.state_hash {
                    Ok(())
                } else {
                    Err(self.integrity_error(
                        year,
                        format!(
                            "predecessor state does not match checkpoint {}",
                            checkpoint.checkpoint_id
                        ),
                    ))
                }
            }
        }
    }

    /// Internal consistency of a year's records
    ///
    /// Every record belongs to `year`, is current, verifies against its own
    /// integrity hash, and no entity appears twice. When `predecessor` is
    /// given, every entity it carries as active must also have a record.
    pub fn validate_records(
        &self,
        year: i32,
        records: &[StateRecord],
        predecessor: Option<&AccumulationInput>,
    ) -> Result<ValidationReport, EngineError> {
        let mut seen = BTreeSet::new();
        let mut active_count = 0;
        for record in records {
            if record.year() != year {
                return Err(self.integrity_error(
                    year,
                    format!("record for {} belongs to year {}", record.entity_id(), record.year()),
                ));
            }
            if !record.is_current() {
                return Err(self.integrity_error(
                    year,
                    format!("record for {} is not current", record.entity_id()),
                ));
            }
            if !seen.insert(record.entity_id()) {
                return Err(self.integrity_error(
                    year,
                    format!("entity {} has more than one current record", record.entity_id()),
                ));
            }
            if !record.verify_integrity()? {
                return Err(self.integrity_error(
                    year,
                    format!(
                        "integrity hash mismatch for record {} ({})",
                        record.record_uuid(),
                        record.entity_id()
                    ),
                ));
            }
            if record.is_active() {
                active_count += 1;
            }
        }

        if let Some(input) = predecessor {
            for (entity_id, active) in input.entities() {
                if active && !seen.contains(entity_id) {
                    return Err(self.integrity_error(
                        year,
                        format!("active entity {} has no record", entity_id),
                    ));
                }
            }
        }

        Ok(ValidationReport {
            year,
            record_count: records.len(),
            active_count,
            state_hash: aggregate_state_hash(year, records.iter()),
        })
    }

    /// Validate the staged records of `year` and append its checkpoint
    ///
    /// `predecessor` is what the year was computed from. It must be the
    /// year immediately before `year` and must match the persisted state
    /// of that year (a baseline only seeds a year with no checkpointed
    /// predecessor). Every entity it carries as active must have exactly
    /// one current record in the staged year.
    ///
    /// # Errors
    ///
    /// `CheckpointIntegrity` if nothing is staged, the predecessor does
    /// not line up, validation fails, or a checkpoint for `year` already
    /// exists. Staged records are discarded on validation failure;
    /// existing checkpoints are never touched.
    pub fn persist(
        &self,
        year: i32,
        event_count: u64,
        predecessor: &AccumulationInput,
    ) -> Result<Checkpoint, EngineError> {
        let records = self
            .store
            .staged_records(&self.scenario, year)?
            .ok_or_else(|| self.integrity_error(year, "no staged records"))?;

        let validated = self
            .check_predecessor(year, predecessor)
            .and_then(|()| self.validate_records(year, &records, Some(predecessor)));
        let report = match validated {
            Ok(report) => report,
            Err(e) => {
                warn!(scenario = %self.scenario, year, error = %e, "discarding staged records");
                self.store.discard_staged(&self.scenario, year)?;
                return Err(e);
            }
        };

        let mut checkpoint = Checkpoint {
            checkpoint_id: Uuid::new_v4(),
            scenario_id: self.scenario.clone(),
            year,
            state_hash: report.state_hash,
            event_count,
            record_count: report.record_count as u64,
            validation_hash: String::new(),
            created_at: self.clock.now(),
        };
        checkpoint.validation_hash = validation_hash(&checkpoint)?;

        match self.store.commit_year(&checkpoint) {
            Ok(()) => {}
            Err(StoreError::CheckpointExists { .. }) => {
                return Err(self.integrity_error(year, "checkpoint already exists"));
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            scenario = %self.scenario,
            year,
            checkpoint_id = %checkpoint.checkpoint_id,
            records = checkpoint.record_count,
            "checkpoint persisted"
        );
        Ok(checkpoint)
    }

    /// Rebuild state from a checkpoint, re-verifying every hash
    ///
    /// # Errors
    ///
    /// `MissingData` for an unknown checkpoint; `CheckpointCorruption` if
    /// the checkpoint, any record, or the aggregate hash fails to verify.
    pub fn resume(&self, checkpoint_id: Uuid) -> Result<SimulationState, EngineError> {
        let checkpoint = self
            .store
            .find_checkpoint(&self.scenario, checkpoint_id)?
            .ok_or_else(|| EngineError::MissingData {
                scenario: self.scenario.clone(),
                year: 0,
                what: format!("checkpoint {}", checkpoint_id),
            })?;
        self.restore(checkpoint)
    }

    /// Resume from the most recent checkpoint, if any
    pub fn resume_latest(&self) -> Result<Option<SimulationState>, EngineError> {
        match self.store.latest_checkpoint(&self.scenario)? {
            Some(checkpoint) => self.restore(checkpoint).map(Some),
            None => Ok(None),
        }
    }

    /// Checkpoint for `year`, if one was persisted
    pub fn checkpoint_for_year(&self, year: i32) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self
            .store
            .checkpoints(&self.scenario)?
            .into_iter()
            .find(|c| c.year == year))
    }

    pub fn latest(&self) -> Result<Option<Checkpoint>, EngineError> {
        Ok(self.store.latest_checkpoint(&self.scenario)?)
    }

    fn corruption(&self, checkpoint: &Checkpoint, expected: &str, actual: String) -> EngineError {
        EngineError::CheckpointCorruption {
            scenario: self.scenario.clone(),
            year: checkpoint.year,
            checkpoint_id: checkpoint.checkpoint_id,
            expected: expected.to_string(),
            actual,
        }
    }

    fn restore(&self, checkpoint: Checkpoint) -> Result<SimulationState, EngineError> {
        let recomputed = validation_hash(&checkpoint)?;
        if recomputed != checkpoint.validation_hash {
            return Err(self.corruption(&checkpoint, &checkpoint.validation_hash, recomputed));
        }

        let records = self
            .store
            .committed_records(&self.scenario, checkpoint.year)?
            .ok_or_else(|| {
                self.corruption(&checkpoint, &checkpoint.state_hash, "no records".to_string())
            })?;

        if records.len() as u64 != checkpoint.record_count {
            return Err(self.corruption(
                &checkpoint,
                &checkpoint.state_hash,
                format!(
                    "{} records, checkpoint expects {}",
                    records.len(),
                    checkpoint.record_count
                ),
            ));
        }

        for record in &records {
            if !record.verify_integrity()? {
                return Err(self.corruption(
                    &checkpoint,
                    &checkpoint.state_hash,
                    format!("record {} fails integrity check", record.record_uuid()),
                ));
            }
        }

        let actual = aggregate_state_hash(checkpoint.year, records.iter());
        if actual != checkpoint.state_hash {
            return Err(self.corruption(&checkpoint, &checkpoint.state_hash, actual));
        }

        let state = PriorYearState::from_records(checkpoint.year, records).map_err(|e| {
            self.corruption(&checkpoint, &checkpoint.state_hash, e.to_string())
        })?;

        info!(
            scenario = %self.scenario,
            year = checkpoint.year,
            checkpoint_id = %checkpoint.checkpoint_id,
            "state restored from checkpoint"
        );
        Ok(SimulationState { checkpoint, state })
    }

    /// Committed history of years up to `year`, oldest year first
    ///
    /// `is_current` is set on the latest record of each entity and cleared
    /// on every record it supersedes, so exactly one record per entity is
    /// current. An entity that left the population keeps its last record
    /// (inactive) as its current one.
    pub fn records_as_of(&self, year: i32) -> Result<Vec<StateRecord>, EngineError> {
        let mut history: Vec<StateRecord> = Vec::new();
        let mut latest: BTreeMap<String, usize> = BTreeMap::new();

        for checkpoint in self.store.checkpoints(&self.scenario)? {
            if checkpoint.year > year {
                break;
            }
            let records = self
                .store
                .committed_records(&self.scenario, checkpoint.year)?
                .ok_or_else(|| {
                    self.corruption(&checkpoint, &checkpoint.state_hash, "no records".to_string())
                })?;
            for record in records {
                latest.insert(record.entity_id().to_string(), history.len());
                history.push(record);
            }
        }

        let current: BTreeSet<usize> = latest.into_values().collect();
        Ok(history
            .into_iter()
            .enumerate()
            .map(|(i, record)| record.with_current(current.contains(&i)))
            .collect())
    }

    /// The current record of every entity as of `year`, by entity id
    pub fn current_as_of(&self, year: i32) -> Result<Vec<StateRecord>, EngineError> {
        let mut current: Vec<StateRecord> = self
            .records_as_of(year)?
            .into_iter()
            .filter(|r| r.is_current())
            .collect();
        current.sort_by(|a, b| a.entity_id().cmp(b.entity_id()));
        Ok(current)
    }

    /// Re-verify every checkpoint of the scenario for audit
    ///
    /// Checks that checkpoint years are contiguous and that each one
    /// restores cleanly. Returns the verified checkpoints in year order.
    pub fn verify_chain(&self) -> Result<Vec<Checkpoint>, EngineError> {
        let checkpoints = self.store.checkpoints(&self.scenario)?;
        let mut verified = Vec::with_capacity(checkpoints.len());
        let mut previous: Option<i32> = None;

        for checkpoint in checkpoints {
            if let Some(prev) = previous {
                if checkpoint.year != prev + 1 {
                    return Err(EngineError::InconsistentState {
                        scenario: self.scenario.clone(),
                        year: checkpoint.year,
                        detail: format!("checkpoint gap after year {}", prev),
                    });
                }
            }
            previous = Some(checkpoint.year);
            verified.push(self.restore(checkpoint)?.checkpoint);
        }
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::TemporalStateAccumulator;
    use crate::core::audit::AuditRecordBuilder;
    use crate::core::time::FixedClock;
    use crate::models::{BaselineEntity, BaselineRoster, YearEvents};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    struct Fixture {
        store: Arc<MemoryStore>,
        manager: CheckpointManager<MemoryStore>,
        accumulator: TemporalStateAccumulator,
        baseline: AccumulationInput,
        records: Vec<StateRecord>,
    }

    fn setup() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::from_unix_millis(1_000));
        let store = Arc::new(MemoryStore::new());
        let manager = CheckpointManager::new("s", Arc::clone(&store), Arc::clone(&clock));

        let roster = BaselineRoster::new(vec![
            BaselineEntity {
                entity_id: "A".to_string(),
                initial_value: 10,
                effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            },
            BaselineEntity {
                entity_id: "B".to_string(),
                initial_value: 20,
                effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            },
        ])
        .unwrap();
        let baseline = AccumulationInput::baseline(2025, roster);
        let accumulator = TemporalStateAccumulator::new(AuditRecordBuilder::new(3, clock));
        let records = accumulator
            .compute(&baseline, &YearEvents::empty(2025))
            .unwrap();
        Fixture {
            store,
            manager,
            accumulator,
            baseline,
            records,
        }
    }

    /// Checkpoint 2025 and return it as the predecessor of 2026
    fn persist_first_year(f: &Fixture) -> AccumulationInput {
        f.store.stage_records("s", 2025, &f.records).unwrap();
        f.manager.persist(2025, 0, &f.baseline).unwrap();
        AccumulationInput::PriorYear(PriorYearState::from_records(2025, f.records.clone()).unwrap())
    }

    #[test]
    fn test_persist_then_resume_round_trips() {
        let f = setup();
        f.store.stage_records("s", 2025, &f.records).unwrap();

        let checkpoint = f.manager.persist(2025, 0, &f.baseline).unwrap();
        let restored = f.manager.resume(checkpoint.checkpoint_id).unwrap();

        assert_eq!(restored.year(), 2025);
        assert_eq!(restored.state.into_records(), f.records);
    }

    #[test]
    fn test_duplicate_entity_rejected_and_staging_discarded() {
        let f = setup();
        let mut doubled = f.records.clone();
        doubled.push(f.records[0].clone());
        f.store.stage_records("s", 2025, &doubled).unwrap();

        let err = f.manager.persist(2025, 0, &f.baseline).unwrap_err();
        assert!(matches!(err, EngineError::CheckpointIntegrity { .. }));
        assert!(f.store.staged_records("s", 2025).unwrap().is_none());
        assert!(f.manager.latest().unwrap().is_none());
    }

    #[test]
    fn test_persist_without_staging_is_integrity_error() {
        let f = setup();
        assert!(matches!(
            f.manager.persist(2025, 0, &f.baseline),
            Err(EngineError::CheckpointIntegrity { .. })
        ));
    }

    #[test]
    fn test_persist_refuses_dropped_baseline_entity() {
        let f = setup();
        let partial: Vec<StateRecord> = f.records.iter().take(1).cloned().collect();
        f.store.stage_records("s", 2025, &partial).unwrap();

        let err = f.manager.persist(2025, 0, &f.baseline).unwrap_err();
        assert!(err.to_string().contains("no record"));
        assert!(f.manager.latest().unwrap().is_none());
    }

    #[test]
    fn test_persist_refuses_predecessor_from_wrong_year() {
        let f = setup();
        let prior = persist_first_year(&f);
        let next = f.accumulator.compute(&prior, &YearEvents::empty(2026)).unwrap();
        f.store.stage_records("s", 2027, &next).unwrap();

        assert!(matches!(
            f.manager.persist(2027, 0, &prior),
            Err(EngineError::CheckpointIntegrity { year: 2027, .. })
        ));
    }

    #[test]
    fn test_persist_refuses_baseline_once_prior_year_is_checkpointed() {
        let f = setup();
        let prior = persist_first_year(&f);
        let next = f.accumulator.compute(&prior, &YearEvents::empty(2026)).unwrap();
        f.store.stage_records("s", 2026, &next).unwrap();

        let baseline_2026 = match &f.baseline {
            AccumulationInput::Baseline { roster, .. } => {
                AccumulationInput::baseline(2026, roster.clone())
            }
            AccumulationInput::PriorYear(_) => unreachable!(),
        };
        let err = f.manager.persist(2026, 0, &baseline_2026).unwrap_err();
        assert!(err.to_string().contains("baseline cannot seed"));
    }

    #[test]
    fn test_validate_detects_missing_active_entity() {
        let f = setup();
        let input = AccumulationInput::PriorYear(
            PriorYearState::from_records(2025, f.records.clone()).unwrap(),
        );
        // B dropped from the year
        let partial: Vec<StateRecord> = f.records.into_iter().take(1).collect();
        let err = f.manager.validate_records(2025, &partial, Some(&input)).unwrap_err();
        assert!(err.to_string().contains("no record"));
    }

    #[test]
    fn test_only_latest_record_is_current_as_of_year() {
        let f = setup();
        let prior = persist_first_year(&f);
        let next = f.accumulator.compute(&prior, &YearEvents::empty(2026)).unwrap();
        f.store.stage_records("s", 2026, &next).unwrap();
        f.manager.persist(2026, 0, &prior).unwrap();

        let history = f.manager.records_as_of(2026).unwrap();
        assert_eq!(history.len(), 4);
        for record in &history {
            assert_eq!(record.is_current(), record.year() == 2026);
            assert!(record.verify_integrity().unwrap());
        }

        // Earlier as-of years ignore later checkpoints
        let as_of_2025 = f.manager.current_as_of(2025).unwrap();
        assert!(as_of_2025.iter().all(|r| r.year() == 2025));
        assert_eq!(as_of_2025.len(), 2);
    }

    #[test]
    fn test_unknown_checkpoint_is_missing_data() {
        let f = setup();
        assert!(matches!(
            f.manager.resume(Uuid::new_v4()),
            Err(EngineError::MissingData { .. })
        ));
    }
}
