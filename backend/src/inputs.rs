//! External inputs: baseline roster and per-year event streams
//!
//! The engine only reads these. Absence is modelled as `Ok(None)` so the
//! detector can tell "never produced" apart from "produced, but empty".

use crate::error::EngineError;
use crate::models::{BaselineEntity, YearEvent};
use crate::store::{is_valid_scenario_id, CollectionProbe, StoreError};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Read-only access to baseline data and business-rule events
pub trait InputProvider: Send + Sync {
    /// Bounded existence probe for the baseline roster
    fn probe_baseline(&self, scenario: &str) -> Result<Option<CollectionProbe>, EngineError>;

    /// Baseline rows, `None` when no roster was ever provided
    fn baseline(&self, scenario: &str) -> Result<Option<Vec<BaselineEntity>>, EngineError>;

    /// Events effective in `year`, `None` when the year was never produced
    fn events_for_year(&self, scenario: &str, year: i32)
        -> Result<Option<Vec<YearEvent>>, EngineError>;
}

/// In-memory inputs shared by every scenario
#[derive(Debug, Clone, Default)]
pub struct StaticInputs {
    baseline: Option<Vec<BaselineEntity>>,
    events: BTreeMap<i32, Vec<YearEvent>>,
}

impl StaticInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(mut self, rows: Vec<BaselineEntity>) -> Self {
        self.baseline = Some(rows);
        self
    }

    pub fn with_events(mut self, year: i32, events: Vec<YearEvent>) -> Self {
        self.events.insert(year, events);
        self
    }
}

impl InputProvider for StaticInputs {
    fn probe_baseline(&self, _scenario: &str) -> Result<Option<CollectionProbe>, EngineError> {
        Ok(self.baseline.as_ref().map(|rows| CollectionProbe {
            has_rows: !rows.is_empty(),
        }))
    }

    fn baseline(&self, _scenario: &str) -> Result<Option<Vec<BaselineEntity>>, EngineError> {
        Ok(self.baseline.clone())
    }

    fn events_for_year(
        &self,
        _scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<YearEvent>>, EngineError> {
        Ok(self.events.get(&year).cloned())
    }
}

/// Inputs read from `<root>/<scenario>/baseline.json` and
/// `<root>/<scenario>/events/<year>.json`
#[derive(Debug, Clone)]
pub struct JsonInputs {
    root: PathBuf,
}

impl JsonInputs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn scenario_dir(&self, scenario: &str) -> Result<PathBuf, EngineError> {
        if !is_valid_scenario_id(scenario) {
            return Err(StoreError::InvalidScenario(scenario.to_string()).into());
        }
        Ok(self.root.join(scenario))
    }

    fn baseline_path(&self, scenario: &str) -> Result<PathBuf, EngineError> {
        Ok(self.scenario_dir(scenario)?.join("baseline.json"))
    }

    fn events_path(&self, scenario: &str, year: i32) -> Result<PathBuf, EngineError> {
        Ok(self
            .scenario_dir(scenario)?
            .join("events")
            .join(format!("{}.json", year)))
    }

    fn read<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, EngineError> {
        match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                EngineError::InvalidInput(format!("{}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Store(e.into())),
        }
    }
}

impl InputProvider for JsonInputs {
    fn probe_baseline(&self, scenario: &str) -> Result<Option<CollectionProbe>, EngineError> {
        match fs::metadata(self.baseline_path(scenario)?) {
            Ok(meta) => Ok(Some(CollectionProbe {
                has_rows: meta.len() > 2,
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Store(e.into())),
        }
    }

    fn baseline(&self, scenario: &str) -> Result<Option<Vec<BaselineEntity>>, EngineError> {
        Self::read(&self.baseline_path(scenario)?)
    }

    fn events_for_year(
        &self,
        scenario: &str,
        year: i32,
    ) -> Result<Option<Vec<YearEvent>>, EngineError> {
        Self::read(&self.events_path(scenario, year)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_static_inputs_distinguish_absent_and_empty() {
        let inputs = StaticInputs::new().with_events(2026, vec![]);
        assert!(inputs.events_for_year("s", 2026).unwrap().is_some());
        assert!(inputs.events_for_year("s", 2027).unwrap().is_none());
        assert!(inputs.probe_baseline("s").unwrap().is_none());
    }

    #[test]
    fn test_static_baseline_probe_reports_rows() {
        let inputs = StaticInputs::new().with_baseline(vec![BaselineEntity {
            entity_id: "A".to_string(),
            initial_value: 1,
            effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }]);
        assert_eq!(
            inputs.probe_baseline("s").unwrap(),
            Some(CollectionProbe { has_rows: true })
        );
    }

    #[test]
    fn test_json_inputs_read_scenario_files() {
        let dir = tempfile::tempdir().unwrap();
        let events_dir = dir.path().join("s").join("events");
        fs::create_dir_all(&events_dir).unwrap();
        fs::write(events_dir.join("2025.json"), "[]").unwrap();

        let inputs = JsonInputs::new(dir.path());
        assert_eq!(inputs.events_for_year("s", 2025).unwrap(), Some(vec![]));
        assert!(inputs.events_for_year("s", 2026).unwrap().is_none());
        assert!(inputs.probe_baseline("s").unwrap().is_none());
    }

    #[test]
    fn test_json_inputs_reject_scenario_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("inputs");
        fs::create_dir_all(&root).unwrap();
        fs::write(dir.path().join("baseline.json"), "[]").unwrap();

        let inputs = JsonInputs::new(&root);
        for scenario in ["..", "../inputs", "a/b", ""] {
            assert!(
                matches!(
                    inputs.baseline(scenario),
                    Err(EngineError::Store(StoreError::InvalidScenario(_)))
                ),
                "{:?}",
                scenario
            );
        }
        assert!(inputs.probe_baseline("..").is_err());
        assert!(inputs.events_for_year("..", 2025).is_err());
    }
}
