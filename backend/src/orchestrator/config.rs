//! Engine configuration
//!
//! Read once when the orchestrator is built and immutable for the run.
//! Its canonical hash is stored with every run so an operator can tell
//! which settings produced a checkpoint chain.

use crate::coordinator::CacheConfig;
use crate::core::audit::canonical_hash;
use crate::error::EngineError;
use crate::models::YearRange;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ============================================================================
// Configuration Types
// ============================================================================

/// Complete engine configuration
///
/// # Fields
///
/// * `scenario_id` - Scenario whose state is accumulated
/// * `first_year` - First simulation year; seeded from baseline data
/// * `start_year` / `end_year` - Default inclusive year range for `run`
/// * `resume` - Start from the year after the last checkpoint instead
/// * `record_id_seed` - Fixes record uuid generation for reproducible runs
/// * `worker_threads` - Size of a dedicated rayon pool (global pool if unset)
/// * `stale_run_timeout_secs` - RUNNING rows idle this long count as abandoned
/// * `cache` - Tiered cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scenario_id: String,

    pub first_year: i32,

    pub start_year: i32,

    pub end_year: i32,

    #[serde(default)]
    pub resume: bool,

    #[serde(default)]
    pub record_id_seed: Option<u64>,

    #[serde(default)]
    pub worker_threads: Option<usize>,

    #[serde(default)]
    pub stale_run_timeout_secs: Option<u64>,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl EngineConfig {
    /// Minimal config for `scenario_id` covering `first_year..=end_year`
    pub fn new(scenario_id: impl Into<String>, first_year: i32, end_year: i32) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            first_year,
            start_year: first_year,
            end_year,
            resume: false,
            record_id_seed: None,
            worker_threads: None,
            stale_run_timeout_secs: None,
            cache: CacheConfig::default(),
        }
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            EngineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.scenario_id.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "scenario_id must not be empty".to_string(),
            ));
        }
        if self.start_year > self.end_year {
            return Err(EngineError::InvalidConfig(format!(
                "start_year {} is after end_year {}",
                self.start_year, self.end_year
            )));
        }
        if self.start_year < self.first_year {
            return Err(EngineError::InvalidConfig(format!(
                "start_year {} precedes first_year {}",
                self.start_year, self.first_year
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(EngineError::InvalidConfig(
                "worker_threads must be positive".to_string(),
            ));
        }
        if self.stale_run_timeout_secs == Some(0) {
            return Err(EngineError::InvalidConfig(
                "stale_run_timeout_secs must be positive".to_string(),
            ));
        }

        let cache = &self.cache;
        if cache.enabled {
            if cache.hot_capacity == 0 || cache.warm_capacity == 0 {
                return Err(EngineError::InvalidConfig(
                    "cache tier capacities must be positive".to_string(),
                ));
            }
            if cache.promote_after_hits == 0 || cache.promotion_window == 0 {
                return Err(EngineError::InvalidConfig(
                    "cache promotion threshold and window must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Default year range of `run`
    pub fn year_range(&self) -> Result<YearRange, EngineError> {
        YearRange::new(self.start_year, self.end_year)
    }

    /// Canonical SHA-256 of this config
    pub fn config_hash(&self) -> Result<String, EngineError> {
        canonical_hash(self)
    }
}
