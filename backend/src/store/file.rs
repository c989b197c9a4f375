//! JSON-file store
//!
//! Layout under `<root>/<scenario>/`:
//!
//! ```text
//! runs/<run_id>.json        one file per run attempt
//! runs/ACTIVE.lock          run id holding RUNNING status (O_EXCL)
//! staging/<year>.json       records written but not yet checkpointed
//! records/<year>.json       committed records
//! checkpoints/<year>.json   append-only commit markers
//! ```
//!
//! Every write goes to a temp file first and is then renamed into place.
//! Checkpoints are published with a hard link, which fails instead of
//! overwriting, so a committed year can never be replaced. The checkpoint
//! file is written last: a records file without its checkpoint is an
//! orphan of an interrupted commit and stays invisible.

use super::{is_valid_scenario_id, Collection, CollectionProbe, StateStore, StoreError};
use crate::models::{Checkpoint, RunMetadata, StateRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const RUNS_DIR: &str = "runs";
const STAGING_DIR: &str = "staging";
const RECORDS_DIR: &str = "records";
const CHECKPOINTS_DIR: &str = "checkpoints";
const ACTIVE_LOCK: &str = "ACTIVE.lock";

/// Durable [`StateStore`] rooted at a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scenario_dir(&self, scenario: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_scenario_id(scenario) {
            return Err(StoreError::InvalidScenario(scenario.to_string()));
        }
        Ok(self.root.join(scenario))
    }

    fn dir(&self, scenario: &str, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.scenario_dir(scenario)?.join(name))
    }

    fn year_file(&self, scenario: &str, dir: &str, year: i32) -> Result<PathBuf, StoreError> {
        Ok(self.dir(scenario, dir)?.join(format!("{}.json", year)))
    }

    fn years_in(&self, scenario: &str, dir: &str) -> Result<Vec<i32>, StoreError> {
        let path = self.dir(scenario, dir)?;
        let entries = match fs::read_dir(&path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut years = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(year) = name.strip_suffix(".json").and_then(|s| s.parse::<i32>().ok()) {
                years.push(year);
            }
        }
        years.sort_unstable();
        Ok(years)
    }

    fn write_temp<T: Serialize + ?Sized>(dir: &Path, value: &T) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(dir)?;
        let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let bytes = serde_json::to_vec(value)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(tmp)
    }

    fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
        let dir = path
            .parent()
            .ok_or_else(|| StoreError::Corrupt(format!("no parent for {}", path.display())))?;
        let tmp = Self::write_temp(dir, value)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn has_checkpoint(&self, scenario: &str, year: i32) -> Result<bool, StoreError> {
        Ok(self.year_file(scenario, CHECKPOINTS_DIR, year)?.exists())
    }

    fn probe_file(path: &Path) -> Result<Option<CollectionProbe>, StoreError> {
        match fs::metadata(path) {
            // "[]" is the encoding of an empty record set
            Ok(meta) => Ok(Some(CollectionProbe {
                has_rows: meta.len() > 2,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn probe_dir(path: &Path) -> Result<Option<CollectionProbe>, StoreError> {
        match fs::read_dir(path) {
            Ok(mut entries) => {
                let has_rows = entries.any(|e| {
                    e.map(|e| e.file_name().to_string_lossy().ends_with(".json"))
                        .unwrap_or(false)
                });
                Ok(Some(CollectionProbe { has_rows }))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl StateStore for FileStore {
    fn probe(
        &self,
        scenario: &str,
        collection: Collection,
    ) -> Result<Option<CollectionProbe>, StoreError> {
        match collection {
            Collection::RunMetadata => Self::probe_dir(&self.dir(scenario, RUNS_DIR)?),
            Collection::Checkpoints => Self::probe_dir(&self.dir(scenario, CHECKPOINTS_DIR)?),
            Collection::StateRecords { year } => {
                if !self.has_checkpoint(scenario, year)? {
                    return Ok(None);
                }
                Self::probe_file(&self.year_file(scenario, RECORDS_DIR, year)?)
            }
            Collection::StagedRecords { year } => {
                Self::probe_file(&self.year_file(scenario, STAGING_DIR, year)?)
            }
        }
    }

    fn runs(&self, scenario: &str) -> Result<Vec<RunMetadata>, StoreError> {
        let dir = self.dir(scenario, RUNS_DIR)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_run_file = path
                .file_name()
                .map(|n| {
                    let n = n.to_string_lossy();
                    n.ends_with(".json") && !n.starts_with('.')
                })
                .unwrap_or(false);
            if !is_run_file {
                continue;
            }
            if let Some(run) = Self::read_json::<RunMetadata>(&path)? {
                runs.push(run);
            }
        }
        runs.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
        Ok(runs)
    }

    fn begin_run(&self, run: &RunMetadata) -> Result<(), StoreError> {
        let dir = self.dir(&run.scenario_id, RUNS_DIR)?;
        fs::create_dir_all(&dir)?;
        let lock = dir.join(ACTIVE_LOCK);

        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(mut file) => {
                file.write_all(run.run_id.to_string().as_bytes())?;
                file.sync_all()?;
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock)?;
                let run_id = Uuid::parse_str(holder.trim()).map_err(|_| {
                    StoreError::Corrupt(format!("unreadable lock file {}", lock.display()))
                })?;
                return Err(StoreError::RunAlreadyActive {
                    scenario: run.scenario_id.clone(),
                    run_id,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let path = dir.join(format!("{}.json", run.run_id));
        if let Err(e) = Self::write_atomic(&path, run) {
            // Never leave a lock behind for a run that was not recorded
            let _ = fs::remove_file(&lock);
            return Err(e);
        }
        debug!(scenario = %run.scenario_id, run_id = %run.run_id, "run lock acquired");
        Ok(())
    }

    fn update_run(&self, run: &RunMetadata) -> Result<(), StoreError> {
        let dir = self.dir(&run.scenario_id, RUNS_DIR)?;
        let path = dir.join(format!("{}.json", run.run_id));
        if !path.exists() {
            return Err(StoreError::UnknownRun {
                scenario: run.scenario_id.clone(),
                run_id: run.run_id,
            });
        }
        Self::write_atomic(&path, run)?;

        if !run.is_running() {
            let lock = dir.join(ACTIVE_LOCK);
            match fs::read_to_string(&lock) {
                Ok(holder) if holder.trim() == run.run_id.to_string() => {
                    fs::remove_file(&lock)?;
                    debug!(scenario = %run.scenario_id, run_id = %run.run_id, "run lock released");
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn stage_records(
        &self,
        scenario: &str,
        year: i32,
        records: &[StateRecord],
    ) -> Result<(), StoreError> {
        Self::write_atomic(&self.year_file(scenario, STAGING_DIR, year)?, records)
    }

    fn staged_records(
        &self,
        scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<StateRecord>>, StoreError> {
        Self::read_json(&self.year_file(scenario, STAGING_DIR, year)?)
    }

    fn discard_staged(&self, scenario: &str, year: i32) -> Result<(), StoreError> {
        match fs::remove_file(self.year_file(scenario, STAGING_DIR, year)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn commit_year(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let scenario = checkpoint.scenario_id.as_str();
        let year = checkpoint.year;

        let checkpoint_path = self.year_file(scenario, CHECKPOINTS_DIR, year)?;
        if checkpoint_path.exists() {
            return Err(StoreError::CheckpointExists {
                scenario: scenario.to_string(),
                year,
            });
        }

        let staged = self.year_file(scenario, STAGING_DIR, year)?;
        if !staged.exists() {
            return Err(StoreError::NothingStaged {
                scenario: scenario.to_string(),
                year,
            });
        }

        let records_path = self.year_file(scenario, RECORDS_DIR, year)?;
        fs::create_dir_all(self.dir(scenario, RECORDS_DIR)?)?;
        fs::rename(&staged, &records_path)?;

        let checkpoint_dir = self.dir(scenario, CHECKPOINTS_DIR)?;
        let tmp = Self::write_temp(&checkpoint_dir, checkpoint)?;
        let linked = fs::hard_link(&tmp, &checkpoint_path);
        fs::remove_file(&tmp)?;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(scenario, year, "checkpoint appeared concurrently; commit refused");
                Err(StoreError::CheckpointExists {
                    scenario: scenario.to_string(),
                    year,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn committed_records(
        &self,
        scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<StateRecord>>, StoreError> {
        if !self.has_checkpoint(scenario, year)? {
            return Ok(None);
        }
        let records = Self::read_json(&self.year_file(scenario, RECORDS_DIR, year)?)?;
        match records {
            Some(records) => Ok(Some(records)),
            None => Err(StoreError::Corrupt(format!(
                "checkpoint for {} year {} has no records file",
                scenario, year
            ))),
        }
    }

    fn checkpoints(&self, scenario: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let mut checkpoints = Vec::new();
        for year in self.years_in(scenario, CHECKPOINTS_DIR)? {
            if let Some(c) = Self::read_json(&self.year_file(scenario, CHECKPOINTS_DIR, year)?)? {
                checkpoints.push(c);
            }
        }
        Ok(checkpoints)
    }

    fn latest_checkpoint(&self, scenario: &str) -> Result<Option<Checkpoint>, StoreError> {
        match self.years_in(scenario, CHECKPOINTS_DIR)?.last() {
            Some(year) => Self::read_json(&self.year_file(scenario, CHECKPOINTS_DIR, *year)?),
            None => Ok(None),
        }
    }
}
