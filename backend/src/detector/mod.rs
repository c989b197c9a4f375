//! System State Detector
//!
//! Classifies a requested year before any work starts: cold start,
//! continuation, interrupted, already completed, concurrent execution, or
//! an inconsistent store that needs an operator.
//!
//! Detection is a pure read. Every probe is bounded (latest checkpoint,
//! "does at least one row exist"), and a collection that was never created
//! is a typed `None`, not an error.
//!
//! The latest checkpoint is authoritative for `last_completed_year`: a
//! year only counts as completed once its checkpoint exists, so a run
//! killed between computing a year and checkpointing it is seen at the
//! previous year.

use crate::core::time::Clock;
use crate::error::EngineError;
use crate::inputs::InputProvider;
use crate::models::{RunMetadata, RunStatus};
use crate::store::{Collection, CollectionProbe, StateStore};
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Classification of the persisted state relative to a requested year
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    ColdStart,
    Continuing,
    Interrupted,
    AlreadyCompleted,
    ConcurrentExecution,
    Inconsistent,
}

/// Where the requested year should read its starting state from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallbackStrategy {
    UseBaseline,
    UsePriorYearState,
    /// No automatic strategy; an operator must decide
    ManualIntervention,
}

/// Why a year cannot proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    MissingBaselineData,
    InterruptedSimulation,
    AlreadyCompleted,
    ConcurrentExecution,
    InconsistentState,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockReason::MissingBaselineData => "MISSING_BASELINE_DATA",
            BlockReason::InterruptedSimulation => "INTERRUPTED",
            BlockReason::AlreadyCompleted => "ALREADY_COMPLETED",
            BlockReason::ConcurrentExecution => "CONCURRENT_EXECUTION",
            BlockReason::InconsistentState => "INCONSISTENT_STATE",
        }
    }
}

/// What the probes found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataAvailability {
    pub baseline: Option<CollectionProbe>,
    pub last_completed_year: Option<i32>,
    pub last_run_status: Option<RunStatus>,
    /// Committed records of `requested_year - 1`
    pub prior_year_records: Option<CollectionProbe>,
    /// A live run holding RUNNING status
    pub running_run: Option<Uuid>,
    /// RUNNING rows older than the stale timeout
    pub abandoned_runs: Vec<Uuid>,
}

/// Detector verdict for one requested year
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub requested_year: i32,
    pub state: SystemState,
    pub data_availability: DataAvailability,
    pub can_proceed: bool,
    pub block_reason: Option<BlockReason>,
    pub fallback_strategy: FallbackStrategy,
    pub recommendation: String,
}

impl Detection {
    fn proceed(
        requested_year: i32,
        state: SystemState,
        availability: DataAvailability,
        strategy: FallbackStrategy,
        recommendation: String,
    ) -> Self {
        Self {
            requested_year,
            state,
            data_availability: availability,
            can_proceed: true,
            block_reason: None,
            fallback_strategy: strategy,
            recommendation,
        }
    }

    fn blocked(
        requested_year: i32,
        state: SystemState,
        availability: DataAvailability,
        reason: BlockReason,
        recommendation: String,
    ) -> Self {
        Self {
            requested_year,
            state,
            data_availability: availability,
            can_proceed: false,
            block_reason: Some(reason),
            fallback_strategy: FallbackStrategy::ManualIntervention,
            recommendation,
        }
    }

    /// Convert a blocked verdict into the matching engine error
    pub fn ensure_can_proceed(&self, scenario: &str) -> Result<(), EngineError> {
        let Some(reason) = self.block_reason else {
            return Ok(());
        };
        let scenario = scenario.to_string();
        let year = self.requested_year;
        Err(match reason {
            BlockReason::MissingBaselineData => EngineError::ColdStart {
                scenario,
                year,
                reason: self.recommendation.clone(),
            },
            BlockReason::InterruptedSimulation => EngineError::InterruptedSimulation {
                scenario,
                last_completed_year: self.data_availability.last_completed_year,
                requested_year: year,
            },
            BlockReason::ConcurrentExecution => EngineError::ConcurrentExecution {
                scenario,
                run_id: self.data_availability.running_run.unwrap_or_default(),
            },
            BlockReason::AlreadyCompleted => EngineError::InvalidInput(format!(
                "year {} of scenario {} is already completed",
                year, scenario
            )),
            BlockReason::InconsistentState => EngineError::InconsistentState {
                scenario,
                year,
                detail: self.recommendation.clone(),
            },
        })
    }
}

/// Read-only classifier over a store and the input provider
pub struct SystemStateDetector<S: StateStore, I: InputProvider> {
    scenario: String,
    first_year: i32,
    store: Arc<S>,
    inputs: Arc<I>,
    clock: Arc<dyn Clock>,
    stale_after: Option<Duration>,
}

impl<S: StateStore, I: InputProvider> SystemStateDetector<S, I> {
    pub fn new(
        scenario: impl Into<String>,
        first_year: i32,
        store: Arc<S>,
        inputs: Arc<I>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            first_year,
            store,
            inputs,
            clock,
            stale_after: None,
        }
    }

    /// Treat RUNNING rows not updated for `timeout` as abandoned
    pub fn with_stale_timeout(mut self, timeout: Duration) -> Self {
        self.stale_after = Some(timeout);
        self
    }

    /// Classify `requested_year`
    pub fn detect(&self, requested_year: i32) -> Result<Detection, EngineError> {
        self.classify(requested_year, None)
    }

    /// Classify on behalf of a run that already holds RUNNING status
    pub fn detect_for_run(&self, requested_year: i32, own_run: Uuid) -> Result<Detection, EngineError> {
        self.classify(requested_year, Some(own_run))
    }

    fn is_stale(&self, run: &RunMetadata) -> bool {
        match self.stale_after {
            Some(timeout) => self.clock.now() - run.updated_at > timeout,
            None => false,
        }
    }

    fn classify(&self, requested_year: i32, own_run: Option<Uuid>) -> Result<Detection, EngineError> {
        let runs: Vec<RunMetadata> = self
            .store
            .runs(&self.scenario)?
            .into_iter()
            .filter(|r| Some(r.run_id) != own_run)
            .collect();

        let mut running_run = None;
        let mut abandoned_runs = Vec::new();
        for run in runs.iter().filter(|r| r.is_running()) {
            if self.is_stale(run) {
                abandoned_runs.push(run.run_id);
            } else if running_run.is_none() {
                running_run = Some(run.run_id);
            }
        }

        let latest_run = runs.last();
        let last_completed_year = self
            .store
            .latest_checkpoint(&self.scenario)?
            .map(|c| c.year);

        let availability = DataAvailability {
            baseline: self.inputs.probe_baseline(&self.scenario)?,
            last_completed_year,
            last_run_status: latest_run.map(|r| r.status),
            prior_year_records: self.store.probe(
                &self.scenario,
                Collection::StateRecords {
                    year: requested_year - 1,
                },
            )?,
            running_run,
            abandoned_runs,
        };
        let run_claims = runs.iter().filter_map(|r| r.last_completed_year).max();

        let detection = self.decide(requested_year, availability, run_claims);
        debug!(
            scenario = %self.scenario,
            requested_year,
            state = ?detection.state,
            can_proceed = detection.can_proceed,
            "system state detected"
        );
        if !detection.data_availability.abandoned_runs.is_empty() {
            warn!(
                scenario = %self.scenario,
                runs = ?detection.data_availability.abandoned_runs,
                "stale RUNNING rows ignored"
            );
        }
        Ok(detection)
    }

    fn decide(
        &self,
        requested_year: i32,
        availability: DataAvailability,
        run_claims: Option<i32>,
    ) -> Detection {
        if let Some(run_id) = availability.running_run {
            let recommendation = format!(
                "Run {} is still RUNNING for scenario {}; wait for it to finish or release it",
                run_id, self.scenario
            );
            return Detection::blocked(
                requested_year,
                SystemState::ConcurrentExecution,
                availability,
                BlockReason::ConcurrentExecution,
                recommendation,
            );
        }

        if requested_year < self.first_year {
            let recommendation = format!(
                "Requested year {} precedes first simulation year {}",
                requested_year, self.first_year
            );
            return Detection::blocked(
                requested_year,
                SystemState::Inconsistent,
                availability,
                BlockReason::InconsistentState,
                recommendation,
            );
        }

        let has_baseline = availability.baseline.is_some_and(|p| p.has_rows);

        match availability.last_completed_year {
            None => {
                if let Some(claimed) = run_claims {
                    let recommendation = format!(
                        "Run metadata reports year {} completed but no checkpoint exists; inspect the store",
                        claimed
                    );
                    return Detection::blocked(
                        requested_year,
                        SystemState::Inconsistent,
                        availability,
                        BlockReason::InconsistentState,
                        recommendation,
                    );
                }
                if !has_baseline {
                    let recommendation = format!(
                        "No baseline data and no prior state for scenario {}; load the baseline roster",
                        self.scenario
                    );
                    let state = if requested_year == self.first_year {
                        SystemState::ColdStart
                    } else {
                        SystemState::Interrupted
                    };
                    return Detection::blocked(
                        requested_year,
                        state,
                        availability,
                        BlockReason::MissingBaselineData,
                        recommendation,
                    );
                }
                if requested_year == self.first_year {
                    return Detection::proceed(
                        requested_year,
                        SystemState::ColdStart,
                        availability,
                        FallbackStrategy::UseBaseline,
                        format!("Cold start: seed year {} from baseline data", requested_year),
                    );
                }
                let recommendation = format!(
                    "No checkpoints exist; start at year {} instead of {}",
                    self.first_year, requested_year
                );
                Detection::blocked(
                    requested_year,
                    SystemState::Interrupted,
                    availability,
                    BlockReason::InterruptedSimulation,
                    recommendation,
                )
            }
            Some(last) => {
                if run_claims.is_some_and(|claimed| claimed > last) {
                    let recommendation = format!(
                        "Run metadata claims years after the last checkpoint ({}); inspect the store",
                        last
                    );
                    return Detection::blocked(
                        requested_year,
                        SystemState::Inconsistent,
                        availability,
                        BlockReason::InconsistentState,
                        recommendation,
                    );
                }

                if last >= requested_year {
                    let recommendation = format!(
                        "Year {} is already checkpointed (last completed {}); request year {} or later",
                        requested_year,
                        last,
                        last + 1
                    );
                    Detection::blocked(
                        requested_year,
                        SystemState::AlreadyCompleted,
                        availability,
                        BlockReason::AlreadyCompleted,
                        recommendation,
                    )
                } else if last == requested_year - 1 {
                    if availability.prior_year_records.is_none() {
                        let recommendation = format!(
                            "Checkpoint for year {} exists but its records are missing",
                            last
                        );
                        return Detection::blocked(
                            requested_year,
                            SystemState::Inconsistent,
                            availability,
                            BlockReason::InconsistentState,
                            recommendation,
                        );
                    }
                    Detection::proceed(
                        requested_year,
                        SystemState::Continuing,
                        availability,
                        FallbackStrategy::UsePriorYearState,
                        format!("Continue from year {} checkpoint", last),
                    )
                } else {
                    let recommendation = format!(
                        "Years {}..={} are missing; resume from year {} or supply a backfill",
                        last + 1,
                        requested_year - 1,
                        last + 1
                    );
                    Detection::blocked(
                        requested_year,
                        SystemState::Interrupted,
                        availability,
                        BlockReason::InterruptedSimulation,
                        recommendation,
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::{AccumulationInput, PriorYearState, TemporalStateAccumulator};
    use crate::checkpoint::CheckpointManager;
    use crate::core::audit::AuditRecordBuilder;
    use crate::core::time::FixedClock;
    use crate::inputs::StaticInputs;
    use crate::models::{BaselineEntity, BaselineRoster, RunTransition, YearEvents, YearRange};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    const FIRST: i32 = 2025;

    fn baseline_rows() -> Vec<BaselineEntity> {
        vec![BaselineEntity {
            entity_id: "E1".to_string(),
            initial_value: 100,
            effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }]
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::from_unix_millis(1_700_000_000_000))
    }

    fn detector(
        store: &Arc<MemoryStore>,
        inputs: StaticInputs,
    ) -> SystemStateDetector<MemoryStore, StaticInputs> {
        SystemStateDetector::new("s", FIRST, Arc::clone(store), Arc::new(inputs), clock())
    }

    /// Checkpoint years FIRST..=last with no events
    fn checkpoint_through(store: &Arc<MemoryStore>, last: i32) {
        let accumulator = TemporalStateAccumulator::new(AuditRecordBuilder::new(1, clock()));
        let manager = CheckpointManager::new("s", Arc::clone(store), clock());
        let mut input =
            AccumulationInput::baseline(FIRST, BaselineRoster::new(baseline_rows()).unwrap());
        for year in FIRST..=last {
            let records = accumulator.compute(&input, &YearEvents::empty(year)).unwrap();
            store.stage_records("s", year, &records).unwrap();
            manager.persist(year, 0, &input).unwrap();
            input = AccumulationInput::PriorYear(PriorYearState::from_records(year, records).unwrap());
        }
    }

    #[test]
    fn test_cold_start_with_baseline() {
        let store = Arc::new(MemoryStore::new());
        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .detect(FIRST)
            .unwrap();

        assert_eq!(d.state, SystemState::ColdStart);
        assert!(d.can_proceed);
        assert_eq!(d.fallback_strategy, FallbackStrategy::UseBaseline);
        assert!(d.ensure_can_proceed("s").is_ok());
    }

    #[test]
    fn test_missing_baseline_blocks() {
        let store = Arc::new(MemoryStore::new());
        let d = detector(&store, StaticInputs::new()).detect(FIRST).unwrap();

        assert!(!d.can_proceed);
        assert_eq!(d.block_reason, Some(BlockReason::MissingBaselineData));
        assert!(d.data_availability.baseline.is_none());
        assert!(matches!(
            d.ensure_can_proceed("s"),
            Err(EngineError::ColdStart { .. })
        ));
    }

    #[test]
    fn test_continuing_after_checkpoint() {
        let store = Arc::new(MemoryStore::new());
        checkpoint_through(&store, 2026);

        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .detect(2027)
            .unwrap();

        assert_eq!(d.state, SystemState::Continuing);
        assert_eq!(d.fallback_strategy, FallbackStrategy::UsePriorYearState);
        assert_eq!(d.data_availability.last_completed_year, Some(2026));
    }

    #[test]
    fn test_gap_is_interrupted() {
        let store = Arc::new(MemoryStore::new());
        checkpoint_through(&store, 2025);

        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .detect(2028)
            .unwrap();

        assert_eq!(d.state, SystemState::Interrupted);
        assert!(!d.can_proceed);
        assert!(d.recommendation.contains("2026"));
        assert!(matches!(
            d.ensure_can_proceed("s"),
            Err(EngineError::InterruptedSimulation {
                last_completed_year: Some(2025),
                requested_year: 2028,
                ..
            })
        ));
    }

    #[test]
    fn test_already_completed_year() {
        let store = Arc::new(MemoryStore::new());
        checkpoint_through(&store, 2026);

        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .detect(2026)
            .unwrap();
        assert_eq!(d.state, SystemState::AlreadyCompleted);
        assert_eq!(d.block_reason, Some(BlockReason::AlreadyCompleted));
    }

    #[test]
    fn test_running_run_is_concurrent_unless_own() {
        let store = Arc::new(MemoryStore::new());
        let range = YearRange::new(FIRST, 2027).unwrap();
        let run = RunMetadata::start("s", range, None, "h", clock().now());
        store.begin_run(&run).unwrap();

        let det = detector(&store, StaticInputs::new().with_baseline(baseline_rows()));
        let d = det.detect(FIRST).unwrap();
        assert_eq!(d.state, SystemState::ConcurrentExecution);
        assert_eq!(d.data_availability.running_run, Some(run.run_id));

        let own = det.detect_for_run(FIRST, run.run_id).unwrap();
        assert_eq!(own.state, SystemState::ColdStart);
    }

    #[test]
    fn test_stale_running_row_is_abandoned() {
        let store = Arc::new(MemoryStore::new());
        let range = YearRange::new(FIRST, 2027).unwrap();
        let started = clock().now() - Duration::hours(3);
        let run = RunMetadata::start("s", range, None, "h", started);
        store.begin_run(&run).unwrap();

        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .with_stale_timeout(Duration::hours(1))
            .detect(FIRST)
            .unwrap();

        assert_eq!(d.state, SystemState::ColdStart);
        assert_eq!(d.data_availability.abandoned_runs, vec![run.run_id]);
    }

    #[test]
    fn test_run_claiming_unchecked_year_is_inconsistent() {
        let store = Arc::new(MemoryStore::new());
        let range = YearRange::new(FIRST, 2027).unwrap();
        let at = clock().now();
        let run = RunMetadata::start("s", range, None, "h", at);
        store.begin_run(&run).unwrap();
        let run = run
            .apply(
                RunTransition::YearCompleted {
                    year: FIRST,
                    record_count: 1,
                    event_count: 0,
                },
                at,
            )
            .unwrap()
            .apply(RunTransition::Completed, at)
            .unwrap();
        store.update_run(&run).unwrap();

        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .detect(2026)
            .unwrap();
        assert_eq!(d.state, SystemState::Inconsistent);
        assert!(!d.can_proceed);
    }

    #[test]
    fn test_year_before_first_is_inconsistent() {
        let store = Arc::new(MemoryStore::new());
        let d = detector(&store, StaticInputs::new().with_baseline(baseline_rows()))
            .detect(FIRST - 1)
            .unwrap();
        assert_eq!(d.block_reason, Some(BlockReason::InconsistentState));
    }
}
