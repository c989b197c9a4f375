//! Multi-Year Orchestrator
//!
//! Drives the year loop over all other components:
//!
//! ```text
//! For each year Y in [start, end]:
//! 1. Detect       (SystemStateDetector: may block)
//! 2. Resolve      (baseline roster or year Y-1 state, cache first)
//! 3. Accumulate   (dependency plan + TemporalStateAccumulator)
//! 4. Validate     (nothing written on failure)
//! 5. Checkpoint   (stage records, then commit with the checkpoint)
//! 6. Advance      (run metadata, cache the new year state)
//! ```
//!
//! # Critical Invariants
//!
//! 1. Year Y is never started unless year Y-1 has a checkpoint (or Y is
//!    the first year and baseline data exists)
//! 2. A failed year leaves no visible records and fails the whole run;
//!    later years are not attempted
//! 3. At most one run per scenario holds `RUNNING` status
//!
//! # Example
//!
//! ```rust
//! use multiyear_sim_core_rs::{
//!     BaselineEntity, EngineConfig, FixedClock, MemoryStore, Orchestrator, StaticInputs,
//! };
//! use chrono::NaiveDate;
//! use std::sync::Arc;
//!
//! let inputs = StaticInputs::new().with_baseline(vec![BaselineEntity {
//!     entity_id: "EMP_001".to_string(),
//!     initial_value: 5_000_000,
//!     effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
//! }])
//! .with_events(2025, vec![])
//! .with_events(2026, vec![]);
//!
//! let orchestrator = Orchestrator::new(
//!     EngineConfig::new("baseline", 2025, 2026),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(inputs),
//!     Arc::new(FixedClock::from_unix_millis(0)),
//! )
//! .unwrap();
//!
//! let report = orchestrator.run(2025, 2026, false).unwrap();
//! assert_eq!(report.status_code(), "COMPLETED");
//! ```

use super::config::EngineConfig;
use crate::accumulator::{AccumulationInput, TemporalStateAccumulator};
use crate::checkpoint::CheckpointManager;
use crate::coordinator::{CacheStats, TransitionCoordinator};
use crate::core::audit::AuditRecordBuilder;
use crate::core::time::Clock;
use crate::detector::{Detection, FallbackStrategy, SystemState, SystemStateDetector};
use crate::error::EngineError;
use crate::inputs::InputProvider;
use crate::models::{
    BaselineRoster, Checkpoint, RunMetadata, RunTransition, StateRecord, YearEvents, YearRange,
};
use crate::observability::run_span;
use crate::store::{StateStore, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

// ============================================================================
// Result Types
// ============================================================================

/// Step of the per-year state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum YearPhase {
    Pending,
    Detecting,
    ResolvingInput,
    Accumulating,
    Validating,
    Checkpointing,
    Advancing,
}

/// Terminal state of a run request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Completed,
    /// The detector refused a year; nothing was written for it
    Blocked { year: i32, reason: String },
    /// A year failed mid-flight; its partial output was discarded
    Failed {
        year: i32,
        phase: YearPhase,
        reason: String,
        message: String,
    },
}

/// One checkpointed year
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    pub year: i32,
    pub detected: SystemState,
    pub checkpoint_id: Uuid,
    pub state_hash: String,
    pub record_count: u64,
    pub event_count: u64,
}

/// Everything an operator needs after `run`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario_id: String,
    /// `None` when the run was blocked before it was registered
    pub run_id: Option<Uuid>,
    pub requested_years: Option<YearRange>,
    pub outcome: RunOutcome,
    pub years: Vec<YearSummary>,
    /// Detector verdict behind a block
    pub detection: Option<Detection>,
    pub recommendation: String,
    pub cache: CacheStats,
}

impl RunReport {
    /// `COMPLETED`, `BLOCKED:<reason>` or `FAILED:<reason>`
    pub fn status_code(&self) -> String {
        match &self.outcome {
            RunOutcome::Completed => "COMPLETED".to_string(),
            RunOutcome::Blocked { reason, .. } => format!("BLOCKED:{}", reason),
            RunOutcome::Failed { reason, .. } => format!("FAILED:{}", reason),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

/// Last-checkpoint status of a scenario
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub scenario_id: String,
    pub last_completed_year: Option<i32>,
    pub last_checkpoint: Option<Checkpoint>,
    pub active_run: Option<RunMetadata>,
    pub last_run: Option<RunMetadata>,
    /// Detector verdict for the year after the last checkpoint
    pub next: Detection,
}

fn step(phase: &mut YearPhase, next: YearPhase) {
    *phase = next;
    debug!(phase = ?next, "entering phase");
}

/// Why a year stopped
enum YearStop {
    Blocked(Detection),
    Failed(YearPhase, EngineError),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinates the multi-year loop for one scenario
pub struct Orchestrator<S: StateStore, I: InputProvider> {
    config: EngineConfig,
    config_hash: String,
    store: Arc<S>,
    inputs: Arc<I>,
    clock: Arc<dyn Clock>,
    detector: SystemStateDetector<S, I>,
    checkpoints: CheckpointManager<S>,
    coordinator: TransitionCoordinator,
    accumulator: TemporalStateAccumulator,
}

impl<S: StateStore, I: InputProvider> Orchestrator<S, I> {
    /// Build an orchestrator from a validated config
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the config fails validation or the worker pool
    /// cannot be built.
    pub fn new(
        config: EngineConfig,
        store: Arc<S>,
        inputs: Arc<I>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let config_hash = config.config_hash()?;
        let scenario = config.scenario_id.clone();

        let seed = config.record_id_seed.unwrap_or_else(|| {
            let now = clock.now();
            now.timestamp_nanos_opt()
                .unwrap_or_else(|| now.timestamp_millis()) as u64
        });
        let mut accumulator =
            TemporalStateAccumulator::new(AuditRecordBuilder::new(seed, Arc::clone(&clock)));
        if let Some(threads) = config.worker_threads {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("multiyear-worker-{}", i))
                .build()
                .map_err(|e| EngineError::InvalidConfig(format!("worker pool: {}", e)))?;
            accumulator = accumulator.with_pool(Arc::new(pool));
        }

        let mut detector = SystemStateDetector::new(
            scenario.clone(),
            config.first_year,
            Arc::clone(&store),
            Arc::clone(&inputs),
            Arc::clone(&clock),
        );
        if let Some(secs) = config.stale_run_timeout_secs {
            let timeout = i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .ok_or_else(|| {
                    EngineError::InvalidConfig(format!("stale_run_timeout_secs {} out of range", secs))
                })?;
            detector = detector.with_stale_timeout(timeout);
        }

        Ok(Self {
            checkpoints: CheckpointManager::new(scenario.clone(), Arc::clone(&store), Arc::clone(&clock)),
            coordinator: TransitionCoordinator::new(scenario, config.cache.clone()),
            config,
            config_hash,
            store,
            inputs,
            clock,
            detector,
            accumulator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scenario(&self) -> &str {
        &self.config.scenario_id
    }

    pub fn detector(&self) -> &SystemStateDetector<S, I> {
        &self.detector
    }

    pub fn checkpoints(&self) -> &CheckpointManager<S> {
        &self.checkpoints
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.coordinator.stats()
    }

    /// Run the year range from the config
    pub fn run_configured(&self) -> Result<RunReport, EngineError> {
        self.run(self.config.start_year, self.config.end_year, self.config.resume)
    }

    /// Run years `start..=end`
    ///
    /// With `resume`, the run starts at the year after the last checkpoint
    /// (or the first year when there is none). A requested `start` past
    /// that year would leave a gap and is reported as `Blocked`; an
    /// earlier one is moved forward and noted in the recommendation.
    ///
    /// # Errors
    ///
    /// Only for problems outside any single year: an invalid range or a
    /// store failure while registering the run. Year-level problems are
    /// reported as `Blocked`/`Failed` outcomes.
    pub fn run(&self, start: i32, end: i32, resume: bool) -> Result<RunReport, EngineError> {
        let scenario = self.scenario().to_string();
        let requested_start = start;
        let start = if resume {
            let resumed = self
                .checkpoints
                .latest()?
                .map(|c| c.year + 1)
                .unwrap_or(self.config.first_year);
            info!(scenario = %scenario, requested = start, resumed, "resuming from last checkpoint");
            if resumed > end {
                return Ok(self.report(
                    None,
                    None,
                    RunOutcome::Completed,
                    Vec::new(),
                    None,
                    format!("All years through {} are already checkpointed", end),
                ));
            }
            if requested_start > resumed {
                let range = YearRange::new(requested_start, end)?;
                let detection = self.detector.detect(requested_start)?;
                return Ok(self.blocked(None, range, Vec::new(), detection));
            }
            resumed
        } else {
            start
        };
        let range = YearRange::new(start, end)?;
        let span = run_span(&scenario, range.start, range.end);
        let _run_guard = span.enter();

        let detection = self.detector.detect(range.start)?;
        if !detection.can_proceed {
            return Ok(self.blocked(None, range, Vec::new(), detection));
        }
        self.abandon_stale(&detection.data_availability.abandoned_runs)?;

        let run = RunMetadata::start(
            scenario.clone(),
            range,
            detection.data_availability.last_completed_year,
            self.config_hash.clone(),
            self.clock.now(),
        );
        match self.store.begin_run(&run) {
            Ok(()) => {}
            Err(StoreError::RunAlreadyActive { run_id, .. }) => {
                // Lost a race with another run registering after detection
                let recheck = self.detector.detect(range.start)?;
                warn!(scenario = %scenario, holder = %run_id, "run registration refused");
                return Ok(self.blocked(None, range, Vec::new(), recheck));
            }
            Err(e) => return Err(e.into()),
        }
        info!(
            scenario = %scenario,
            run_id = %run.run_id,
            start = range.start,
            end = range.end,
            "run started"
        );

        let mut run = run;
        let mut years = Vec::new();
        for year in range.years() {
            let span = info_span!("year", year, run_id = %run.run_id);
            let _guard = span.enter();

            let mut phase = YearPhase::Pending;
            match self.run_year(&run, year, &mut phase) {
                Ok(summary) => {
                    phase = YearPhase::Advancing;
                    debug!(?phase, "advancing");
                    run = match self.advance(run.clone(), &summary) {
                        Ok(next) => next,
                        Err(e) => return self.fail(run, range, years, year, phase, e),
                    };
                    info!(
                        checkpoint_id = %summary.checkpoint_id,
                        records = summary.record_count,
                        events = summary.event_count,
                        "year completed"
                    );
                    years.push(summary);
                }
                Err(YearStop::Blocked(detection)) => {
                    let reason = detection
                        .block_reason
                        .map(|r| r.as_str())
                        .unwrap_or("UNKNOWN");
                    run = self.finish(
                        run,
                        RunTransition::Failed {
                            reason: format!("BLOCKED:{}", reason),
                        },
                    )?;
                    return Ok(self.blocked(Some(run.run_id), range, years, detection));
                }
                Err(YearStop::Failed(phase, e)) => {
                    return self.fail(run, range, years, year, phase, e);
                }
            }
        }

        let run = self.finish(run, RunTransition::Completed)?;
        info!(scenario = %scenario, run_id = %run.run_id, years = years.len(), "run completed");
        let mut recommendation = format!("Years {}..={} checkpointed", range.start, range.end);
        if range.start != requested_start {
            recommendation.push_str(&format!(
                " (resumed at {}; requested start {})",
                range.start, requested_start
            ));
        }
        Ok(self.report(
            Some(run.run_id),
            Some(range),
            RunOutcome::Completed,
            years,
            None,
            recommendation,
        ))
    }

    fn run_year(
        &self,
        run: &RunMetadata,
        year: i32,
        phase: &mut YearPhase,
    ) -> Result<YearSummary, YearStop> {
        step(phase, YearPhase::Detecting);
        let detection = self
            .detector
            .detect_for_run(year, run.run_id)
            .map_err(|e| YearStop::Failed(*phase, e))?;
        if !detection.can_proceed {
            return Err(YearStop::Blocked(detection));
        }

        step(phase, YearPhase::ResolvingInput);
        let (input, events) = self
            .resolve_inputs(year, detection.fallback_strategy)
            .map_err(|e| YearStop::Failed(*phase, e))?;

        step(phase, YearPhase::Accumulating);
        let records = self
            .coordinator
            .plan_transition(&input, &events)
            .and_then(|plan| self.accumulator.compute_planned(&input, &events, &plan))
            .map_err(|e| YearStop::Failed(*phase, e))?;

        step(phase, YearPhase::Validating);
        self.checkpoints
            .validate_records(year, &records, Some(&input))
            .map_err(|e| YearStop::Failed(*phase, e))?;

        step(phase, YearPhase::Checkpointing);
        let checkpoint = self
            .store
            .stage_records(self.scenario(), year, &records)
            .map_err(EngineError::from)
            .and_then(|()| self.checkpoints.persist(year, events.len() as u64, &input))
            .map_err(|e| YearStop::Failed(*phase, e))?;

        self.coordinator.store_year_state(year, &records);
        Ok(YearSummary {
            year,
            detected: detection.state,
            checkpoint_id: checkpoint.checkpoint_id,
            state_hash: checkpoint.state_hash,
            record_count: checkpoint.record_count,
            event_count: checkpoint.event_count,
        })
    }

    /// Starting state and events of `year`
    fn resolve_inputs(
        &self,
        year: i32,
        strategy: FallbackStrategy,
    ) -> Result<(AccumulationInput, YearEvents), EngineError> {
        let scenario = self.scenario();
        let input = match strategy {
            FallbackStrategy::UseBaseline => {
                let rows = self.inputs.baseline(scenario)?.ok_or_else(|| {
                    EngineError::MissingData {
                        scenario: scenario.to_string(),
                        year,
                        what: "baseline roster".to_string(),
                    }
                })?;
                AccumulationInput::baseline(year, BaselineRoster::new(rows)?)
            }
            FallbackStrategy::UsePriorYearState => {
                let prior_year = year - 1;
                let checkpoint = self
                    .checkpoints
                    .checkpoint_for_year(prior_year)?
                    .ok_or_else(|| EngineError::InconsistentState {
                        scenario: scenario.to_string(),
                        year,
                        detail: format!("no checkpoint for prior year {}", prior_year),
                    })?;
                match self
                    .coordinator
                    .cached_year_state(prior_year, &checkpoint.state_hash)
                {
                    Some(prior) => {
                        debug!(prior_year, "prior year state served from cache");
                        AccumulationInput::PriorYear(prior)
                    }
                    None => AccumulationInput::PriorYear(
                        self.checkpoints.resume(checkpoint.checkpoint_id)?.state,
                    ),
                }
            }
            FallbackStrategy::ManualIntervention => {
                return Err(EngineError::InconsistentState {
                    scenario: scenario.to_string(),
                    year,
                    detail: "no automatic input strategy".to_string(),
                });
            }
        };

        let events = self
            .inputs
            .events_for_year(scenario, year)?
            .ok_or_else(|| EngineError::MissingData {
                scenario: scenario.to_string(),
                year,
                what: "event source".to_string(),
            })?;
        Ok((input, YearEvents::new(year, events)?))
    }

    fn advance(&self, run: RunMetadata, summary: &YearSummary) -> Result<RunMetadata, EngineError> {
        let run = run.apply(
            RunTransition::YearCompleted {
                year: summary.year,
                record_count: summary.record_count,
                event_count: summary.event_count,
            },
            self.clock.now(),
        )?;
        self.store.update_run(&run)?;
        Ok(run)
    }

    fn finish(&self, run: RunMetadata, transition: RunTransition) -> Result<RunMetadata, EngineError> {
        let run = run.apply(transition, self.clock.now())?;
        self.store.update_run(&run)?;
        Ok(run)
    }

    /// Roll back a failed year and mark the run FAILED
    fn fail(
        &self,
        run: RunMetadata,
        range: YearRange,
        years: Vec<YearSummary>,
        year: i32,
        phase: YearPhase,
        err: EngineError,
    ) -> Result<RunReport, EngineError> {
        error!(?phase, error = %err, reason = err.reason_code(), "year failed");

        if let Err(e) = self.store.discard_staged(self.scenario(), year) {
            warn!(error = %e, "could not discard staged records");
        }
        self.coordinator.invalidate_year(year);

        let reason = err.reason_code().to_string();
        let run = self.finish(
            run,
            RunTransition::Failed {
                reason: format!("{}: {}", reason, err),
            },
        )?;
        let recommendation = format!(
            "Year {} failed during {:?}; fix the cause and resume from year {}",
            year, phase, year
        );
        Ok(self.report(
            Some(run.run_id),
            Some(range),
            RunOutcome::Failed {
                year,
                phase,
                reason,
                message: err.to_string(),
            },
            years,
            None,
            recommendation,
        ))
    }

    fn blocked(
        &self,
        run_id: Option<Uuid>,
        range: YearRange,
        years: Vec<YearSummary>,
        detection: Detection,
    ) -> RunReport {
        let reason = detection
            .block_reason
            .map(|r| r.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();
        if let Err(e) = detection.ensure_can_proceed(self.scenario()) {
            warn!(scenario = %self.scenario(), error = %e, "run blocked");
        }
        let recommendation = detection.recommendation.clone();
        self.report(
            run_id,
            Some(range),
            RunOutcome::Blocked {
                year: detection.requested_year,
                reason,
            },
            years,
            Some(detection),
            recommendation,
        )
    }

    fn report(
        &self,
        run_id: Option<Uuid>,
        requested_years: Option<YearRange>,
        outcome: RunOutcome,
        years: Vec<YearSummary>,
        detection: Option<Detection>,
        recommendation: String,
    ) -> RunReport {
        RunReport {
            scenario_id: self.scenario().to_string(),
            run_id,
            requested_years,
            outcome,
            years,
            detection,
            recommendation,
            cache: self.coordinator.stats(),
        }
    }

    fn abandon_stale(&self, run_ids: &[Uuid]) -> Result<(), EngineError> {
        for run_id in run_ids {
            warn!(scenario = %self.scenario(), run_id = %run_id, "abandoning stale run");
            self.mark_abandoned(*run_id, "stale RUNNING row past timeout")?;
        }
        Ok(())
    }

    fn mark_abandoned(&self, run_id: Uuid, reason: &str) -> Result<RunMetadata, EngineError> {
        let run = self
            .store
            .runs(self.scenario())?
            .into_iter()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| StoreError::UnknownRun {
                scenario: self.scenario().to_string(),
                run_id,
            })?;
        let run = run.apply(
            RunTransition::Abandoned {
                reason: reason.to_string(),
            },
            self.clock.now(),
        )?;
        self.store.update_run(&run)?;
        Ok(run)
    }

    // ========================================================================
    // Operator surface
    // ========================================================================

    /// Mark an abandoned `RUNNING` run as `FAILED`
    ///
    /// # Errors
    ///
    /// `Store(UnknownRun)` for an unknown id, `InconsistentState` if the
    /// run is not `RUNNING`.
    pub fn release_run(&self, run_id: Uuid) -> Result<RunMetadata, EngineError> {
        let run = self.mark_abandoned(run_id, "released by operator")?;
        info!(scenario = %self.scenario(), run_id = %run_id, "run released");
        Ok(run)
    }

    /// Last-checkpoint status plus the verdict for the next year
    pub fn status(&self) -> Result<StatusReport, EngineError> {
        let last_checkpoint = self.checkpoints.latest()?;
        let last_completed_year = last_checkpoint.as_ref().map(|c| c.year);
        let runs = self.store.runs(self.scenario())?;
        let next_year = last_completed_year
            .map(|y| y + 1)
            .unwrap_or(self.config.first_year);

        Ok(StatusReport {
            scenario_id: self.scenario().to_string(),
            last_completed_year,
            last_checkpoint,
            active_run: runs.iter().find(|r| r.is_running()).cloned(),
            last_run: runs.last().cloned(),
            next: self.detector.detect(next_year)?,
        })
    }

    /// Every checkpointed record up to `year`, flagged current as of `year`
    pub fn records_as_of(&self, year: i32) -> Result<Vec<StateRecord>, EngineError> {
        self.checkpoints.records_as_of(year)
    }

    /// Latest record of each entity as of `year`, inactive ones included
    pub fn current_as_of(&self, year: i32) -> Result<Vec<StateRecord>, EngineError> {
        self.checkpoints.current_as_of(year)
    }

    /// Downstream view of a checkpointed year: current, active records only
    ///
    /// Years without a checkpoint return an empty view.
    pub fn current_view(&self, year: i32) -> Result<Vec<StateRecord>, EngineError> {
        if self.checkpoints.checkpoint_for_year(year)?.is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .current_as_of(year)?
            .into_iter()
            .filter(|r| r.is_active())
            .collect())
    }
}

impl<S: StateStore, I: InputProvider> std::fmt::Debug for Orchestrator<S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scenario", &self.config.scenario_id)
            .field("first_year", &self.config.first_year)
            .field("config_hash", &self.config_hash)
            .finish()
    }
}
