//! Python bindings (enabled with the `pyo3` feature)
//!
//! The host application drives runs through [`orchestrator::PyOrchestrator`];
//! everything crossing the boundary is plain dicts, lists and strings.

pub mod orchestrator;
