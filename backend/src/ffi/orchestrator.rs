//! PyO3 wrapper for the multi-year orchestrator
//!
//! Python callers get a file-backed orchestrator: checkpoints live under
//! `store_dir`, baseline and events are read from `inputs_dir`.
//!
//! # Example (from Python)
//!
//! ```python
//! from multiyear_sim_core_rs import Orchestrator
//!
//! orch = Orchestrator(config_json, "/data/state", "/data/inputs")
//! result = orch.run(2025, 2029, resume=False)
//! print(result["status"], result["recommendation"])
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::time::SystemClock;
use crate::error::EngineError;
use crate::inputs::JsonInputs;
use crate::orchestrator::{EngineConfig, Orchestrator, RunReport, StatusReport};
use crate::store::FileStore;

fn to_py_err(err: EngineError) -> PyErr {
    match err {
        EngineError::InvalidConfig(_) | EngineError::InvalidInput(_) => {
            PyValueError::new_err(err.to_string())
        }
        other => PyRuntimeError::new_err(format!("{}: {}", other.reason_code(), other)),
    }
}

fn report_to_py(py: Python<'_>, report: &RunReport) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("scenario_id", &report.scenario_id)?;
    dict.set_item("run_id", report.run_id.map(|id| id.to_string()))?;
    dict.set_item("status", report.status_code())?;
    dict.set_item("recommendation", &report.recommendation)?;

    let years = PyList::empty_bound(py);
    for summary in &report.years {
        let year = PyDict::new_bound(py);
        year.set_item("year", summary.year)?;
        year.set_item("checkpoint_id", summary.checkpoint_id.to_string())?;
        year.set_item("state_hash", &summary.state_hash)?;
        year.set_item("record_count", summary.record_count)?;
        year.set_item("event_count", summary.event_count)?;
        years.append(year)?;
    }
    dict.set_item("years", years)?;

    let cache = PyDict::new_bound(py);
    cache.set_item("hot_hits", report.cache.hot_hits)?;
    cache.set_item("warm_hits", report.cache.warm_hits)?;
    cache.set_item("cold_hits", report.cache.cold_hits)?;
    cache.set_item("misses", report.cache.misses)?;
    dict.set_item("cache", cache)?;

    Ok(dict.unbind())
}

fn status_to_py(py: Python<'_>, status: &StatusReport) -> PyResult<Py<PyDict>> {
    let dict = PyDict::new_bound(py);
    dict.set_item("scenario_id", &status.scenario_id)?;
    dict.set_item("last_completed_year", status.last_completed_year)?;
    dict.set_item(
        "last_checkpoint_id",
        status.last_checkpoint.as_ref().map(|c| c.checkpoint_id.to_string()),
    )?;
    dict.set_item(
        "active_run_id",
        status.active_run.as_ref().map(|r| r.run_id.to_string()),
    )?;
    dict.set_item("next_year", status.next.requested_year)?;
    dict.set_item("can_proceed", status.next.can_proceed)?;
    dict.set_item("recommendation", &status.next.recommendation)?;
    Ok(dict.unbind())
}

/// Python wrapper for the file-backed orchestrator
#[pyclass(name = "Orchestrator")]
pub struct PyOrchestrator {
    inner: Orchestrator<FileStore, JsonInputs>,
}

#[pymethods]
impl PyOrchestrator {
    /// Create an orchestrator from a JSON config string
    ///
    /// Raises ValueError for an invalid config.
    #[new]
    fn new(config_json: &str, store_dir: &str, inputs_dir: &str) -> PyResult<Self> {
        let config: EngineConfig = serde_json::from_str(config_json)
            .map_err(|e| PyValueError::new_err(format!("Invalid config JSON: {}", e)))?;
        let store = FileStore::open(store_dir).map_err(|e| to_py_err(e.into()))?;

        let inner = Orchestrator::new(
            config,
            Arc::new(store),
            Arc::new(JsonInputs::new(inputs_dir)),
            Arc::new(SystemClock),
        )
        .map_err(to_py_err)?;
        Ok(Self { inner })
    }

    /// Run years `start..=end`; returns a dict with `status` and `years`
    #[pyo3(signature = (start, end, resume = false))]
    fn run(&self, py: Python<'_>, start: i32, end: i32, resume: bool) -> PyResult<Py<PyDict>> {
        let report = py
            .allow_threads(|| self.inner.run(start, end, resume))
            .map_err(to_py_err)?;
        report_to_py(py, &report)
    }

    /// Last-checkpoint status of the scenario
    fn status(&self, py: Python<'_>) -> PyResult<Py<PyDict>> {
        let status = self.inner.status().map_err(to_py_err)?;
        status_to_py(py, &status)
    }

    /// Mark an abandoned RUNNING run as FAILED
    fn release_run(&self, run_id: &str) -> PyResult<()> {
        let run_id = Uuid::parse_str(run_id)
            .map_err(|e| PyValueError::new_err(format!("Invalid run id: {}", e)))?;
        self.inner.release_run(run_id).map_err(to_py_err)?;
        Ok(())
    }
}
