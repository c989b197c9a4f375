//! Integration tests for the JSON-file store
//!
//! Cross-instance run locking, invisibility of uncommitted records, and
//! append-only checkpoints on a real directory.

use chrono::{NaiveDate, TimeZone, Utc};
use multiyear_sim_core_rs::store::Collection;
use multiyear_sim_core_rs::{
    AccumulationInput, AuditRecordBuilder, BaselineEntity, BaselineRoster, Checkpoint, FileStore,
    FixedClock, RunMetadata, RunTransition, StateRecord, StateStore, StoreError,
    TemporalStateAccumulator, YearEvents, YearRange,
};
use std::fs;
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Helpers
// ============================================================================

fn records(year: i32) -> Vec<StateRecord> {
    let roster = BaselineRoster::new(vec![BaselineEntity {
        entity_id: "EMP_001".to_string(),
        initial_value: 100,
        effective_date: NaiveDate::from_ymd_opt(year - 1, 12, 31).unwrap(),
    }])
    .unwrap();
    TemporalStateAccumulator::new(AuditRecordBuilder::new(
        1,
        Arc::new(FixedClock::from_unix_millis(0)),
    ))
    .compute(&AccumulationInput::baseline(year, roster), &YearEvents::empty(year))
    .unwrap()
}

fn checkpoint(year: i32) -> Checkpoint {
    Checkpoint {
        checkpoint_id: Uuid::new_v4(),
        scenario_id: "s".to_string(),
        year,
        state_hash: "h".to_string(),
        event_count: 0,
        record_count: 1,
        validation_hash: "v".to_string(),
        created_at: Utc.timestamp_opt(0, 0).unwrap(),
    }
}

fn run(start: i32) -> RunMetadata {
    RunMetadata::start(
        "s",
        YearRange::new(start, start + 1).unwrap(),
        None,
        "h",
        Utc.timestamp_opt(i64::from(start), 0).unwrap(),
    )
}

// ============================================================================
// Run locking
// ============================================================================

#[test]
fn test_run_lock_is_shared_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileStore::open(dir.path()).unwrap();
    let b = FileStore::open(dir.path()).unwrap();

    let first = run(2025);
    a.begin_run(&first).unwrap();

    match b.begin_run(&run(2026)) {
        Err(StoreError::RunAlreadyActive { run_id, .. }) => assert_eq!(run_id, first.run_id),
        other => panic!("expected RunAlreadyActive, got {:?}", other),
    }

    let done = first
        .apply(RunTransition::Completed, Utc.timestamp_opt(10, 0).unwrap())
        .unwrap();
    a.update_run(&done).unwrap();
    b.begin_run(&run(2026)).unwrap();

    let runs = a.runs("s").unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_id, done.run_id);
    assert_eq!(a.running_runs("s").unwrap().len(), 1);
}

#[test]
fn test_update_unknown_run_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    assert!(matches!(
        store.update_run(&run(2025)),
        Err(StoreError::UnknownRun { .. })
    ));
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn test_staged_and_orphaned_records_are_invisible() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let rows = records(2025);

    assert!(store.probe("s", Collection::StagedRecords { year: 2025 }).unwrap().is_none());
    store.stage_records("s", 2025, &rows).unwrap();
    assert!(store
        .probe("s", Collection::StagedRecords { year: 2025 })
        .unwrap()
        .unwrap()
        .has_rows);
    assert!(store.probe("s", Collection::StateRecords { year: 2025 }).unwrap().is_none());
    assert!(store.committed_records("s", 2025).unwrap().is_none());

    // Records promoted but the checkpoint never written
    let records_dir = dir.path().join("s").join("records");
    fs::create_dir_all(&records_dir).unwrap();
    fs::copy(
        dir.path().join("s").join("staging").join("2025.json"),
        records_dir.join("2025.json"),
    )
    .unwrap();
    assert!(store.committed_records("s", 2025).unwrap().is_none());

    store.commit_year(&checkpoint(2025)).unwrap();
    assert_eq!(store.committed_records("s", 2025).unwrap().unwrap(), rows);
    assert!(store.staged_records("s", 2025).unwrap().is_none());
}

#[test]
fn test_discard_staged_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    store.stage_records("s", 2025, &records(2025)).unwrap();

    store.discard_staged("s", 2025).unwrap();
    store.discard_staged("s", 2025).unwrap();
    assert!(matches!(
        store.commit_year(&checkpoint(2025)),
        Err(StoreError::NothingStaged { .. })
    ));
}

// ============================================================================
// Checkpoints
// ============================================================================

#[test]
fn test_checkpoints_are_append_only_and_ordered() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    for year in [2026, 2025] {
        store.stage_records("s", year, &records(year)).unwrap();
        store.commit_year(&checkpoint(year)).unwrap();
    }

    store.stage_records("s", 2025, &records(2025)).unwrap();
    assert!(matches!(
        store.commit_year(&checkpoint(2025)),
        Err(StoreError::CheckpointExists { year: 2025, .. })
    ));

    let years: Vec<i32> = store.checkpoints("s").unwrap().iter().map(|c| c.year).collect();
    assert_eq!(years, vec![2025, 2026]);
    assert_eq!(store.latest_checkpoint("s").unwrap().unwrap().year, 2026);

    let wanted = store.checkpoints("s").unwrap()[0].checkpoint_id;
    assert_eq!(
        store.find_checkpoint("s", wanted).unwrap().unwrap().year,
        2025
    );
}

#[test]
fn test_scenario_ids_cannot_escape_root() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("nested")).unwrap();

    for bad in ["..", "../x", "a/b", ""] {
        assert!(matches!(
            store.runs(bad),
            Err(StoreError::InvalidScenario(_))
        ));
    }
}
