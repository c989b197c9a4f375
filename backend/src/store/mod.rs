//! Persistence for run metadata, state records and checkpoints
//!
//! Two backends share one contract:
//! - [`MemoryStore`]: in-process, for tests and embedded use
//! - [`FileStore`]: JSON files with atomic renames, for durable runs
//!
//! # Critical Invariants
//!
//! 1. At most one `RUNNING` run per scenario (`begin_run` is compare-and-insert)
//! 2. Records for a year are invisible until its checkpoint exists
//! 3. Checkpoints are append-only; a second commit for the same year fails
//! 4. Absence of a collection is `Ok(None)`, never an error

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::models::{Checkpoint, RunMetadata, StateRecord};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Scenario ids name directories: ASCII alphanumerics, `-`, `_` and `.`,
/// never `.` or `..`
pub(crate) fn is_valid_scenario_id(scenario: &str) -> bool {
    !scenario.is_empty()
        && scenario
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && scenario != "."
        && scenario != ".."
}

/// Errors reported by storage backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run {run_id} already holds RUNNING status for scenario {scenario}")]
    RunAlreadyActive { scenario: String, run_id: Uuid },

    #[error("Checkpoint for scenario {scenario} year {year} already exists")]
    CheckpointExists { scenario: String, year: i32 },

    #[error("No staged records for scenario {scenario} year {year}")]
    NothingStaged { scenario: String, year: i32 },

    #[error("Unknown run {run_id} for scenario {scenario}")]
    UnknownRun { scenario: String, run_id: Uuid },

    #[error("Invalid scenario id {0:?}")]
    InvalidScenario(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

/// Collections that can be probed for existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    RunMetadata,
    Checkpoints,
    /// Committed (checkpointed) records of one year
    StateRecords { year: i32 },
    /// Records written but not yet checkpointed
    StagedRecords { year: i32 },
}

/// Result of a bounded existence probe
///
/// Obtaining one never requires scanning the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionProbe {
    /// At least one row exists
    pub has_rows: bool,
}

/// Storage contract shared by every backend
pub trait StateStore: Send + Sync {
    /// Bounded probe: `Ok(None)` when the collection was never created
    fn probe(&self, scenario: &str, collection: Collection)
        -> Result<Option<CollectionProbe>, StoreError>;

    /// All runs of a scenario, oldest first
    fn runs(&self, scenario: &str) -> Result<Vec<RunMetadata>, StoreError>;

    /// Insert a `RUNNING` run unless another run is already `RUNNING`
    fn begin_run(&self, run: &RunMetadata) -> Result<(), StoreError>;

    /// Replace a run row by `run_id`
    fn update_run(&self, run: &RunMetadata) -> Result<(), StoreError>;

    /// Write (or overwrite) the uncommitted records of a year
    fn stage_records(
        &self,
        scenario: &str,
        year: i32,
        records: &[StateRecord],
    ) -> Result<(), StoreError>;

    fn staged_records(&self, scenario: &str, year: i32)
        -> Result<Option<Vec<StateRecord>>, StoreError>;

    fn discard_staged(&self, scenario: &str, year: i32) -> Result<(), StoreError>;

    /// Promote the staged records of `checkpoint.year` and append `checkpoint`
    fn commit_year(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Records of a checkpointed year; `None` if the year has no checkpoint
    fn committed_records(
        &self,
        scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<StateRecord>>, StoreError>;

    /// All checkpoints of a scenario, ordered by year
    fn checkpoints(&self, scenario: &str) -> Result<Vec<Checkpoint>, StoreError>;

    fn latest_checkpoint(&self, scenario: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoints(scenario)?.into_iter().last())
    }

    fn find_checkpoint(
        &self,
        scenario: &str,
        checkpoint_id: Uuid,
    ) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .checkpoints(scenario)?
            .into_iter()
            .find(|c| c.checkpoint_id == checkpoint_id))
    }

    /// Runs currently holding `RUNNING` status
    fn running_runs(&self, scenario: &str) -> Result<Vec<RunMetadata>, StoreError> {
        Ok(self
            .runs(scenario)?
            .into_iter()
            .filter(|r| r.is_running())
            .collect())
    }
}
