//! Multi-Year Simulation Core - Rust Engine
//!
//! State accumulation and coordination for simulations that advance one
//! year at a time, where year N depends only on year N-1 plus year N's
//! events.
//!
//! # Architecture
//!
//! - **accumulator**: Temporal state accumulation (year N-1 + events -> year N)
//! - **detector**: Classifies the persisted state before a year starts
//! - **checkpoint**: Hash-verified checkpoints and resume
//! - **coordinator**: Dependency planning and the hot/warm/cold cache
//! - **orchestrator**: The multi-year loop
//! - **store**: Persistence backends (memory, JSON files)
//! - **inputs**: Baseline roster and per-year event sources
//! - **core**: Clock and audit stamping
//! - **rng**: Deterministic random streams for record ids
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 (cents)
//! 2. Year N never reads year N's own outputs
//! 3. A year's records are invisible until its checkpoint exists
//! 4. Results do not depend on worker scheduling or cache state

// Module declarations
pub mod accumulator;
pub mod checkpoint;
pub mod coordinator;
pub mod core;
pub mod detector;
pub mod error;
pub mod inputs;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod rng;
pub mod store;

// Re-exports for convenience
pub use accumulator::{AccumulationInput, PriorYearState, TemporalStateAccumulator};
pub use checkpoint::{CheckpointManager, SimulationState, ValidationReport};
pub use coordinator::{
    CacheConfig, CacheStats, CacheTier, DependencySet, TieredCache, TransitionCoordinator,
};
pub use crate::core::audit::AuditRecordBuilder;
pub use crate::core::time::{Clock, FixedClock, SteppingClock, SystemClock};
pub use detector::{
    BlockReason, DataAvailability, Detection, FallbackStrategy, SystemState, SystemStateDetector,
};
pub use error::EngineError;
pub use inputs::{InputProvider, JsonInputs, StaticInputs};
pub use models::{
    BaselineEntity, BaselineRoster, Checkpoint, RecordDraft, RunMetadata, RunStatus,
    RunTransition, SourceType, StateRecord, YearEvent, YearEvents, YearRange,
};
pub use observability::{init_logging, LogFormat};
pub use orchestrator::{
    EngineConfig, Orchestrator, RunOutcome, RunReport, StatusReport, YearPhase, YearSummary,
};
pub use rng::RngManager;
pub use store::{FileStore, MemoryStore, StateStore, StoreError};

// FFI module (when feature enabled)
#[cfg(feature = "pyo3")]
pub mod ffi;

// PyO3 exports (when feature enabled)
#[cfg(feature = "pyo3")]
use pyo3::prelude::*;

#[cfg(feature = "pyo3")]
#[pymodule]
fn multiyear_sim_core_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<ffi::orchestrator::PyOrchestrator>()?;
    Ok(())
}
