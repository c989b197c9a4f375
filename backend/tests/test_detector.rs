//! Integration tests for the System State Detector
//!
//! The four reference situations (cold start, continuing, interrupted,
//! concurrent execution) plus the edge cases around them.

use chrono::NaiveDate;
use multiyear_sim_core_rs::{
    BaselineEntity, BlockReason, Clock, EngineConfig, FallbackStrategy, FileStore, FixedClock,
    MemoryStore, Orchestrator, RunMetadata, RunStatus, StateStore, StaticInputs, SystemState,
    SystemStateDetector, YearRange,
};
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::from_unix_millis(1_700_000_000_000))
}

fn inputs(first_year: i32, last_year: i32) -> StaticInputs {
    let mut inputs = StaticInputs::new().with_baseline(vec![BaselineEntity {
        entity_id: "EMP_001".to_string(),
        initial_value: 5_000_000,
        effective_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
    }]);
    for year in first_year..=last_year {
        inputs = inputs.with_events(year, vec![]);
    }
    inputs
}

/// Checkpoint `first..=last` through a real run
fn completed_store(first: i32, last: i32) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let report = Orchestrator::new(
        EngineConfig::new("s", first, last),
        Arc::clone(&store),
        Arc::new(inputs(first, last)),
        clock(),
    )
    .unwrap()
    .run(first, last, false)
    .unwrap();
    assert!(report.is_completed());
    store
}

fn detector<S: StateStore>(store: Arc<S>, first_year: i32) -> SystemStateDetector<S, StaticInputs> {
    SystemStateDetector::new("s", first_year, store, Arc::new(inputs(first_year, first_year)), clock())
}

// ============================================================================
// Reference situations
// ============================================================================

#[test]
fn test_empty_store_with_baseline_is_cold_start() {
    let d = detector(Arc::new(MemoryStore::new()), 1).detect(1).unwrap();

    assert_eq!(d.state, SystemState::ColdStart);
    assert!(d.can_proceed);
    assert_eq!(d.fallback_strategy, FallbackStrategy::UseBaseline);
    assert_eq!(d.data_availability.last_completed_year, None);
    assert!(d.data_availability.baseline.unwrap().has_rows);
}

#[test]
fn test_completed_2026_continues_into_2027() {
    let store = completed_store(2025, 2026);
    assert_eq!(store.runs("s").unwrap()[0].status, RunStatus::Completed);

    let d = detector(store, 2025).detect(2027).unwrap();

    assert_eq!(d.state, SystemState::Continuing);
    assert!(d.can_proceed);
    assert_eq!(d.data_availability.last_completed_year, Some(2026));
    assert_eq!(d.data_availability.last_run_status, Some(RunStatus::Completed));
    assert!(d.data_availability.prior_year_records.unwrap().has_rows);
}

#[test]
fn test_gap_after_2025_is_interrupted_for_2028() {
    let store = completed_store(2025, 2025);
    let d = detector(store, 2025).detect(2028).unwrap();

    assert_eq!(d.state, SystemState::Interrupted);
    assert!(!d.can_proceed);
    assert_eq!(d.block_reason, Some(BlockReason::InterruptedSimulation));
    assert_eq!(d.fallback_strategy, FallbackStrategy::ManualIntervention);
}

#[test]
fn test_running_row_blocks_every_year() {
    let store = completed_store(2025, 2026);
    let range = YearRange::new(2027, 2030).unwrap();
    store
        .begin_run(&RunMetadata::start("s", range, Some(2026), "h", clock().now()))
        .unwrap();

    let det = detector(store, 2025);
    for year in [2025, 2026, 2027, 2030] {
        let d = det.detect(year).unwrap();
        assert_eq!(d.state, SystemState::ConcurrentExecution, "year {}", year);
        assert!(!d.can_proceed);
    }
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_fresh_file_store_probes_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());

    let d = detector(store, 2025).detect(2025).unwrap();
    assert_eq!(d.state, SystemState::ColdStart);
    assert!(d.data_availability.prior_year_records.is_none());
    assert!(d.data_availability.last_run_status.is_none());
}

#[test]
fn test_no_baseline_and_no_prior_state_is_missing_baseline() {
    let det = SystemStateDetector::new(
        "s",
        2025,
        Arc::new(MemoryStore::new()),
        Arc::new(StaticInputs::new()),
        clock(),
    );
    for year in [2025, 2027] {
        let d = det.detect(year).unwrap();
        assert!(!d.can_proceed);
        assert_eq!(d.block_reason, Some(BlockReason::MissingBaselineData));
    }
}

#[test]
fn test_skipping_first_year_is_interrupted() {
    let d = detector(Arc::new(MemoryStore::new()), 2025).detect(2026).unwrap();
    assert_eq!(d.state, SystemState::Interrupted);
    assert!(d.recommendation.contains("2025"));
}

#[test]
fn test_detection_serializes_with_screaming_states() {
    let d = detector(Arc::new(MemoryStore::new()), 2025).detect(2025).unwrap();
    let json = serde_json::to_value(&d).unwrap();
    assert_eq!(json["state"], "COLD_START");
    assert_eq!(json["fallback_strategy"], "USE_BASELINE");
}
