//! Dependency & Cache Coordinator
//!
//! Consulted at every year boundary: plans the minimal dependency set for
//! the next transition and keeps reusable results in a [`TieredCache`].
//!
//! The cache is strictly an optimization. Every cached value is validated
//! against an authoritative fingerprint before use (a plan against its
//! inputs, a year state against its checkpoint hash); anything that fails
//! validation is discarded and recomputed.

pub mod cache;
pub mod dependency;

pub use cache::{CacheConfig, CacheKey, CacheStats, CacheTier, ContentKind, TieredCache};
pub use dependency::{plan_transition, DependencySet};

use crate::accumulator::{AccumulationInput, PriorYearState};
use crate::error::EngineError;
use crate::models::{StateRecord, YearEvents};
use tracing::{debug, warn};

/// Per-scenario coordinator owning the cache
#[derive(Debug)]
pub struct TransitionCoordinator {
    scenario: String,
    cache: TieredCache,
}

impl TransitionCoordinator {
    pub fn new(scenario: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            scenario: scenario.into(),
            cache: TieredCache::new(config),
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Dependency plan for `input.year() -> events.year()`, reusing a
    /// cached plan only if it was built from identical inputs
    pub fn plan_transition(
        &self,
        input: &AccumulationInput,
        events: &YearEvents,
    ) -> Result<DependencySet, EngineError> {
        let key = CacheKey::new(&self.scenario, events.year(), ContentKind::DependencyPlan);

        if let Some(plan) = self.cache.get_json::<DependencySet>(&key) {
            if plan.is_valid_for(input, events)? {
                debug!(year = events.year(), "dependency plan cache hit");
                return Ok(plan);
            }
            debug!(year = events.year(), "stale dependency plan discarded");
            self.cache.remove(&key);
        }

        let plan = plan_transition(input, events)?;
        self.cache.put_json(key, &plan);
        Ok(plan)
    }

    /// Remember a checkpointed year's records for the next transition
    pub fn store_year_state(&self, year: i32, records: &[StateRecord]) {
        let key = CacheKey::new(&self.scenario, year, ContentKind::YearState);
        self.cache.put_json(key, &records);
    }

    /// Cached records of `year`, only if they hash to `expected_state_hash`
    pub fn cached_year_state(&self, year: i32, expected_state_hash: &str) -> Option<PriorYearState> {
        let key = CacheKey::new(&self.scenario, year, ContentKind::YearState);
        let records: Vec<StateRecord> = self.cache.get_json(&key)?;

        match PriorYearState::from_records(year, records) {
            Ok(prior) if prior.state_hash() == expected_state_hash => Some(prior),
            Ok(_) => {
                warn!(year, "cached year state does not match checkpoint; discarding");
                self.cache.remove(&key);
                None
            }
            Err(e) => {
                warn!(year, error = %e, "cached year state invalid; discarding");
                self.cache.remove(&key);
                None
            }
        }
    }

    /// Drop cached state for `year` (e.g. after a failed attempt)
    pub fn invalidate_year(&self, year: i32) {
        self.cache
            .remove(&CacheKey::new(&self.scenario, year, ContentKind::YearState));
        self.cache
            .remove(&CacheKey::new(&self.scenario, year, ContentKind::DependencyPlan));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::TemporalStateAccumulator;
    use crate::core::audit::AuditRecordBuilder;
    use crate::core::time::FixedClock;
    use crate::models::{BaselineEntity, BaselineRoster};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn year_one() -> Vec<StateRecord> {
        let roster = BaselineRoster::new(vec![BaselineEntity {
            entity_id: "A".to_string(),
            initial_value: 10,
            effective_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        }])
        .unwrap();
        TemporalStateAccumulator::new(AuditRecordBuilder::new(1, Arc::new(FixedClock::from_unix_millis(0))))
            .compute(&AccumulationInput::baseline(2025, roster), &YearEvents::empty(2025))
            .unwrap()
    }

    #[test]
    fn test_cached_state_requires_matching_hash() {
        let coordinator = TransitionCoordinator::new("s", CacheConfig::default());
        let records = year_one();
        let prior = PriorYearState::from_records(2025, records.clone()).unwrap();
        coordinator.store_year_state(2025, &records);

        assert!(coordinator.cached_year_state(2025, "wrong").is_none());
        // Mismatch evicts the entry
        assert!(coordinator
            .cached_year_state(2025, prior.state_hash())
            .is_none());

        coordinator.store_year_state(2025, &records);
        let cached = coordinator
            .cached_year_state(2025, prior.state_hash())
            .unwrap();
        assert_eq!(cached, prior);
    }

    #[test]
    fn test_plan_reused_for_identical_inputs() {
        let coordinator = TransitionCoordinator::new("s", CacheConfig::default());
        let prior = AccumulationInput::PriorYear(PriorYearState::from_records(2025, year_one()).unwrap());
        let events = YearEvents::empty(2026);

        let first = coordinator.plan_transition(&prior, &events).unwrap();
        let second = coordinator.plan_transition(&prior, &events).unwrap();
        assert_eq!(first, second);
        assert_eq!(coordinator.stats().hot_hits, 1);
    }
}
