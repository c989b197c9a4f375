//! Engine error taxonomy
//!
//! Every error here is fatal to the current run attempt but never to
//! previously persisted checkpoints. Errors carry the scenario, year and
//! detected state so an operator can act on them without re-running
//! detection.

use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the multi-year coordination engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// No usable baseline data for a cold start
    #[error("Cold start impossible for scenario {scenario} year {year}: {reason}")]
    ColdStart {
        scenario: String,
        year: i32,
        reason: String,
    },

    /// A required input is absent
    #[error("Missing data for scenario {scenario} year {year}: {what}")]
    MissingData {
        scenario: String,
        year: i32,
        what: String,
    },

    /// Year gap between the last checkpoint and the requested year
    #[error(
        "Simulation interrupted for scenario {scenario}: last completed year {last_completed_year:?}, requested {requested_year}"
    )]
    InterruptedSimulation {
        scenario: String,
        last_completed_year: Option<i32>,
        requested_year: i32,
    },

    /// Another run already holds RUNNING status
    #[error("Concurrent execution for scenario {scenario}: run {run_id} is RUNNING")]
    ConcurrentExecution { scenario: String, run_id: Uuid },

    /// Validation failed before a checkpoint write; nothing was written
    #[error("Checkpoint integrity check failed for scenario {scenario} year {year}: {reason}")]
    CheckpointIntegrity {
        scenario: String,
        year: i32,
        reason: String,
    },

    /// Resume-time hash mismatch between checkpoint and stored records
    #[error(
        "Checkpoint {checkpoint_id} corrupted for scenario {scenario} year {year}: expected state hash {expected}, got {actual}"
    )]
    CheckpointCorruption {
        scenario: String,
        year: i32,
        checkpoint_id: Uuid,
        expected: String,
        actual: String,
    },

    /// State the detector cannot classify
    #[error("Inconsistent state for scenario {scenario} year {year}: {detail}")]
    InconsistentState {
        scenario: String,
        year: i32,
        detail: String,
    },

    /// Malformed caller input (events, baseline rows, prior state)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration validation error
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Canonical serialization failed while hashing or caching
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage backend failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Machine-readable reason used in `BLOCKED:<reason>` / `FAILED:<reason>`
    pub fn reason_code(&self) -> &'static str {
        match self {
            EngineError::ColdStart { .. } => "COLD_START_ERROR",
            EngineError::MissingData { .. } => "MISSING_DATA",
            EngineError::InterruptedSimulation { .. } => "INTERRUPTED",
            EngineError::ConcurrentExecution { .. } => "CONCURRENT_EXECUTION",
            EngineError::CheckpointIntegrity { .. } => "CHECKPOINT_INTEGRITY",
            EngineError::CheckpointCorruption { .. } => "CHECKPOINT_CORRUPTION",
            EngineError::InconsistentState { .. } => "INCONSISTENT_STATE",
            EngineError::InvalidInput(_) => "INVALID_INPUT",
            EngineError::InvalidConfig(_) => "INVALID_CONFIG",
            EngineError::Serialization(_) => "SERIALIZATION",
            EngineError::Store(_) => "STORE",
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
