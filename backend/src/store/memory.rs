//! In-memory store
//!
//! One `RwLock` guards all scenarios; every trait call takes it exactly once,
//! so each operation (notably `begin_run` and `commit_year`) is atomic.

use super::{Collection, CollectionProbe, StateStore, StoreError};
use crate::models::{Checkpoint, RunMetadata, StateRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct ScenarioData {
    runs: Vec<RunMetadata>,
    staged: BTreeMap<i32, Vec<StateRecord>>,
    committed: BTreeMap<i32, Vec<StateRecord>>,
    checkpoints: BTreeMap<i32, Checkpoint>,
}

/// Thread-safe in-memory [`StateStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    scenarios: RwLock<HashMap<String, ScenarioData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn probe(
        &self,
        scenario: &str,
        collection: Collection,
    ) -> Result<Option<CollectionProbe>, StoreError> {
        let scenarios = self.scenarios.read();
        let Some(data) = scenarios.get(scenario) else {
            return Ok(None);
        };

        let probe = match collection {
            Collection::RunMetadata => (!data.runs.is_empty()).then_some(CollectionProbe { has_rows: true }),
            Collection::Checkpoints => {
                (!data.checkpoints.is_empty()).then_some(CollectionProbe { has_rows: true })
            }
            Collection::StateRecords { year } => {
                if data.checkpoints.contains_key(&year) {
                    data.committed.get(&year).map(|r| CollectionProbe {
                        has_rows: !r.is_empty(),
                    })
                } else {
                    None
                }
            }
            Collection::StagedRecords { year } => data.staged.get(&year).map(|r| CollectionProbe {
                has_rows: !r.is_empty(),
            }),
        };
        Ok(probe)
    }

    fn runs(&self, scenario: &str) -> Result<Vec<RunMetadata>, StoreError> {
        Ok(self
            .scenarios
            .read()
            .get(scenario)
            .map(|d| d.runs.clone())
            .unwrap_or_default())
    }

    fn begin_run(&self, run: &RunMetadata) -> Result<(), StoreError> {
        let mut scenarios = self.scenarios.write();
        let data = scenarios.entry(run.scenario_id.clone()).or_default();
        if let Some(active) = data.runs.iter().find(|r| r.is_running()) {
            return Err(StoreError::RunAlreadyActive {
                scenario: run.scenario_id.clone(),
                run_id: active.run_id,
            });
        }
        data.runs.push(run.clone());
        Ok(())
    }

    fn update_run(&self, run: &RunMetadata) -> Result<(), StoreError> {
        let mut scenarios = self.scenarios.write();
        let slot = scenarios
            .get_mut(&run.scenario_id)
            .and_then(|d| d.runs.iter_mut().find(|r| r.run_id == run.run_id))
            .ok_or_else(|| StoreError::UnknownRun {
                scenario: run.scenario_id.clone(),
                run_id: run.run_id,
            })?;
        *slot = run.clone();
        Ok(())
    }

    fn stage_records(
        &self,
        scenario: &str,
        year: i32,
        records: &[StateRecord],
    ) -> Result<(), StoreError> {
        let mut scenarios = self.scenarios.write();
        scenarios
            .entry(scenario.to_string())
            .or_default()
            .staged
            .insert(year, records.to_vec());
        Ok(())
    }

    fn staged_records(
        &self,
        scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<StateRecord>>, StoreError> {
        Ok(self
            .scenarios
            .read()
            .get(scenario)
            .and_then(|d| d.staged.get(&year).cloned()))
    }

    fn discard_staged(&self, scenario: &str, year: i32) -> Result<(), StoreError> {
        if let Some(data) = self.scenarios.write().get_mut(scenario) {
            data.staged.remove(&year);
        }
        Ok(())
    }

    fn commit_year(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let scenario = checkpoint.scenario_id.as_str();
        let year = checkpoint.year;
        let mut scenarios = self.scenarios.write();
        let data = scenarios
            .get_mut(scenario)
            .ok_or_else(|| StoreError::NothingStaged {
                scenario: scenario.to_string(),
                year,
            })?;

        if data.checkpoints.contains_key(&year) {
            return Err(StoreError::CheckpointExists {
                scenario: scenario.to_string(),
                year,
            });
        }
        let records = data
            .staged
            .remove(&year)
            .ok_or_else(|| StoreError::NothingStaged {
                scenario: scenario.to_string(),
                year,
            })?;

        data.committed.insert(year, records);
        data.checkpoints.insert(year, checkpoint.clone());
        Ok(())
    }

    fn committed_records(
        &self,
        scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<StateRecord>>, StoreError> {
        let scenarios = self.scenarios.read();
        Ok(scenarios.get(scenario).and_then(|d| {
            if d.checkpoints.contains_key(&year) {
                d.committed.get(&year).cloned()
            } else {
                None
            }
        }))
    }

    fn checkpoints(&self, scenario: &str) -> Result<Vec<Checkpoint>, StoreError> {
        Ok(self
            .scenarios
            .read()
            .get(scenario)
            .map(|d| d.checkpoints.values().cloned().collect())
            .unwrap_or_default())
    }

    fn latest_checkpoint(&self, scenario: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self
            .scenarios
            .read()
            .get(scenario)
            .and_then(|d| d.checkpoints.values().next_back().cloned()))
    }
}
