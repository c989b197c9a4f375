//! Run Metadata - one per simulation run attempt
//!
//! Run state is an explicit value threaded through the orchestrator. The
//! only way to change it is [`RunMetadata::apply`], which consumes the old
//! value and returns the next one.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle status of a run attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Inclusive year range requested for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidInput(format!(
                "year range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

/// A state change of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTransition {
    /// Checkpoint for `year` was committed
    YearCompleted {
        year: i32,
        record_count: u64,
        event_count: u64,
    },
    /// All requested years are checkpointed
    Completed,
    /// Unrecoverable error during the current year
    Failed { reason: String },
    /// Operator or stale-run detection declared the run dead
    Abandoned { reason: String },
}

/// Run attempt bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub scenario_id: String,
    pub requested_years: YearRange,
    pub status: RunStatus,
    pub last_completed_year: Option<i32>,
    /// Cumulative row counts per table written by this run
    pub record_counts: BTreeMap<String, u64>,
    pub config_hash: String,
    pub failure_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const STATE_RECORDS_TABLE: &str = "state_records";
pub const EVENTS_TABLE: &str = "events";
pub const CHECKPOINTS_TABLE: &str = "checkpoints";

impl RunMetadata {
    /// New `RUNNING` row
    ///
    /// `last_completed_year` is the year already checkpointed before this
    /// run begins (`None` on a cold start).
    pub fn start(
        scenario_id: impl Into<String>,
        requested_years: YearRange,
        last_completed_year: Option<i32>,
        config_hash: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario_id: scenario_id.into(),
            requested_years,
            status: RunStatus::Running,
            last_completed_year,
            record_counts: BTreeMap::new(),
            config_hash: config_hash.into(),
            failure_reason: None,
            started_at: at,
            updated_at: at,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Apply a transition, returning the next run value
    ///
    /// # Errors
    ///
    /// `InconsistentState` when the run is already terminal, or when a
    /// completed year does not directly follow the last completed one.
    pub fn apply(mut self, transition: RunTransition, at: DateTime<Utc>) -> Result<Self, EngineError> {
        if !self.is_running() {
            return Err(self.inconsistent(format!(
                "run {} is {:?}; cannot apply {:?}",
                self.run_id, self.status, transition
            )));
        }

        match transition {
            RunTransition::YearCompleted {
                year,
                record_count,
                event_count,
            } => {
                let expected = self
                    .last_completed_year
                    .map(|y| y + 1)
                    .unwrap_or(self.requested_years.start);
                if year != expected {
                    return Err(self.inconsistent(format!(
                        "year {} completed out of order, expected {}",
                        year, expected
                    )));
                }
                self.last_completed_year = Some(year);
                *self.record_counts.entry(STATE_RECORDS_TABLE.to_string()).or_default() += record_count;
                *self.record_counts.entry(EVENTS_TABLE.to_string()).or_default() += event_count;
                *self.record_counts.entry(CHECKPOINTS_TABLE.to_string()).or_default() += 1;
            }
            RunTransition::Completed => {
                self.status = RunStatus::Completed;
            }
            RunTransition::Failed { reason } | RunTransition::Abandoned { reason } => {
                self.status = RunStatus::Failed;
                self.failure_reason = Some(reason);
            }
        }

        self.updated_at = at;
        Ok(self)
    }

    fn inconsistent(&self, detail: String) -> EngineError {
        EngineError::InconsistentState {
            scenario: self.scenario_id.clone(),
            year: self
                .last_completed_year
                .unwrap_or(self.requested_years.start),
            detail,
        }
    }
}
