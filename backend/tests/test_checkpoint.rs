//! Integration tests for the Checkpoint & Resume Manager
//!
//! Round trips through the file store, tamper detection on disk, and
//! append-only behaviour.

use chrono::NaiveDate;
use multiyear_sim_core_rs::{
    AccumulationInput, AuditRecordBuilder, BaselineEntity, BaselineRoster, CheckpointManager,
    Clock, EngineConfig, EngineError, FileStore, FixedClock, Orchestrator, PriorYearState,
    StateRecord, StateStore, StaticInputs, TemporalStateAccumulator, YearEvent, YearEvents,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::from_unix_millis(1_700_000_000_000))
}

fn roster() -> BaselineRoster {
    BaselineRoster::new(
        ["EMP_001", "EMP_002", "EMP_003"]
            .iter()
            .enumerate()
            .map(|(i, id)| BaselineEntity {
                entity_id: id.to_string(),
                initial_value: 4_000_000 + i as i64 * 250_000,
                effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            })
            .collect(),
    )
    .unwrap()
}

fn baseline_input() -> AccumulationInput {
    AccumulationInput::baseline(2025, roster())
}

fn accumulator() -> TemporalStateAccumulator {
    TemporalStateAccumulator::new(AuditRecordBuilder::new(5, clock()))
}

fn year_2025_records() -> Vec<StateRecord> {
    let events = YearEvents::new(
        2025,
        vec![YearEvent {
            event_id: "EVT_RAISE".to_string(),
            entity_id: "EMP_002".to_string(),
            year: 2025,
            effective_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            new_value: 4_500_000,
            deactivates: false,
        }],
    )
    .unwrap();
    accumulator().compute(&baseline_input(), &events).unwrap()
}

fn persisted(dir: &Path) -> (Arc<FileStore>, CheckpointManager<FileStore>, Vec<StateRecord>) {
    let store = Arc::new(FileStore::open(dir).unwrap());
    let manager = CheckpointManager::new("s", Arc::clone(&store), clock());
    let records = year_2025_records();
    store.stage_records("s", 2025, &records).unwrap();
    manager.persist(2025, 1, &baseline_input()).unwrap();
    (store, manager, records)
}

fn edit_json(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
    let mut value: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    edit(&mut value);
    fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_resume_reconstructs_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, manager, records) = persisted(dir.path());

    let checkpoint = manager.latest().unwrap().unwrap();
    assert_eq!(checkpoint.year, 2025);
    assert_eq!(checkpoint.record_count, 3);
    assert_eq!(checkpoint.event_count, 1);

    let restored = manager.resume(checkpoint.checkpoint_id).unwrap();
    assert_eq!(restored.state.state_hash(), checkpoint.state_hash);
    for original in &records {
        let back = restored.state.get(original.entity_id()).unwrap();
        assert_eq!(back.current_value(), original.current_value());
        assert_eq!(back.source_type(), original.source_type());
        assert_eq!(back.source_event_ids(), original.source_event_ids());
    }
}

#[test]
fn test_resume_survives_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, _manager, records) = persisted(dir.path());

    let reopened = Arc::new(FileStore::open(dir.path()).unwrap());
    let manager = CheckpointManager::new("s", reopened, clock());
    let restored = manager.resume_latest().unwrap().unwrap();

    assert_eq!(restored.state.into_records(), records);
}

// ============================================================================
// Tamper detection
// ============================================================================

#[test]
fn test_edited_record_value_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, manager, _) = persisted(dir.path());

    edit_json(&dir.path().join("s/records/2025.json"), |records| {
        records[0]["current_value"] = serde_json::json!(1);
    });

    let id = manager.latest().unwrap().unwrap().checkpoint_id;
    assert!(matches!(
        manager.resume(id),
        Err(EngineError::CheckpointCorruption { year: 2025, .. })
    ));
}

#[test]
fn test_edited_checkpoint_hash_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, manager, _) = persisted(dir.path());

    edit_json(&dir.path().join("s/checkpoints/2025.json"), |checkpoint| {
        checkpoint["state_hash"] = serde_json::json!("0".repeat(64));
    });

    let err = manager.resume_latest().unwrap_err();
    assert_eq!(err.reason_code(), "CHECKPOINT_CORRUPTION");
}

#[test]
fn test_dropped_record_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let (_store, manager, _) = persisted(dir.path());

    edit_json(&dir.path().join("s/records/2025.json"), |records| {
        records.as_array_mut().unwrap().pop();
    });

    assert!(manager.verify_chain().is_err());
}

// ============================================================================
// Completeness
// ============================================================================

#[test]
fn test_persist_refuses_year_missing_an_active_entity() {
    let dir = tempfile::tempdir().unwrap();
    let (store, manager, records) = persisted(dir.path());
    let prior = AccumulationInput::PriorYear(PriorYearState::from_records(2025, records).unwrap());

    let full_2026 = accumulator().compute(&prior, &YearEvents::empty(2026)).unwrap();
    let without_emp_002: Vec<StateRecord> = full_2026
        .into_iter()
        .filter(|r| r.entity_id() != "EMP_002")
        .collect();
    store.stage_records("s", 2026, &without_emp_002).unwrap();

    let err = manager.persist(2026, 0, &prior).unwrap_err();
    assert!(matches!(err, EngineError::CheckpointIntegrity { year: 2026, .. }));
    assert!(err.to_string().contains("EMP_002"));

    // Nothing written, staging rolled back
    assert_eq!(manager.latest().unwrap().unwrap().year, 2025);
    assert!(store.staged_records("s", 2026).unwrap().is_none());
    assert!(store.committed_records("s", 2026).unwrap().is_none());
}

#[test]
fn test_persist_refuses_predecessor_not_matching_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let (store, manager, _records) = persisted(dir.path());

    // A prior state that was never checkpointed for 2025
    let forged_2025 = TemporalStateAccumulator::new(AuditRecordBuilder::new(6, clock()))
        .compute(&baseline_input(), &YearEvents::empty(2025))
        .unwrap();
    let forged = AccumulationInput::PriorYear(PriorYearState::from_records(2025, forged_2025).unwrap());
    let next = accumulator().compute(&forged, &YearEvents::empty(2026)).unwrap();
    store.stage_records("s", 2026, &next).unwrap();

    let err = manager.persist(2026, 0, &forged).unwrap_err();
    assert_eq!(err.reason_code(), "CHECKPOINT_INTEGRITY");
    assert_eq!(manager.latest().unwrap().unwrap().year, 2025);
}

#[test]
fn test_persist_accepts_complete_continuation() {
    let dir = tempfile::tempdir().unwrap();
    let (store, manager, records) = persisted(dir.path());
    let prior = AccumulationInput::PriorYear(PriorYearState::from_records(2025, records).unwrap());

    let next = accumulator().compute(&prior, &YearEvents::empty(2026)).unwrap();
    store.stage_records("s", 2026, &next).unwrap();

    let checkpoint = manager.persist(2026, 0, &prior).unwrap();
    assert_eq!(checkpoint.record_count, 3);
    assert_eq!(manager.verify_chain().unwrap().len(), 2);
}

// ============================================================================
// Append-only
// ============================================================================

#[test]
fn test_second_persist_for_same_year_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (store, manager, records) = persisted(dir.path());
    let original = manager.latest().unwrap().unwrap();

    store.stage_records("s", 2025, &records).unwrap();
    assert!(matches!(
        manager.persist(2025, 1, &baseline_input()),
        Err(EngineError::CheckpointIntegrity { .. })
    ));

    assert_eq!(manager.latest().unwrap().unwrap(), original);
    assert!(manager.resume(original.checkpoint_id).is_ok());
}

#[test]
fn test_verify_chain_over_multi_year_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path()).unwrap());
    let inputs = StaticInputs::new()
        .with_baseline(roster().iter().cloned().collect())
        .with_events(2025, vec![])
        .with_events(2026, vec![])
        .with_events(2027, vec![]);

    let orchestrator = Orchestrator::new(
        EngineConfig::new("s", 2025, 2027),
        Arc::clone(&store),
        Arc::new(inputs),
        clock(),
    )
    .unwrap();
    assert!(orchestrator.run(2025, 2027, false).unwrap().is_completed());

    let chain = orchestrator.checkpoints().verify_chain().unwrap();
    let years: Vec<i32> = chain.iter().map(|c| c.year).collect();
    assert_eq!(years, vec![2025, 2026, 2027]);
}
