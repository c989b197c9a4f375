//! Three-tier cache for reusable year-boundary results
//!
//! - **hot**: bounded, recency-ordered (LRU); overflow demotes to warm
//! - **warm**: larger bound, frequency-ordered (LFU); overflow demotes to cold
//! - **cold**: unbounded; in memory or spilled to a directory
//!
//! A warm entry accessed `promote_after_hits` times within the last
//! `promotion_window` cache operations is promoted to hot. Cold hits are
//! promoted to warm.
//!
//! Each tier has its own lock and no code path holds two tier locks at
//! once. An entry in flight between tiers may briefly miss; a miss only
//! means recomputation, never an error.

use crate::core::audit::sha256_hex;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a cached value holds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Current records of a checkpointed year
    YearState,
    /// Dependency plan for the transition into a year
    DependencyPlan,
}

/// Cache key: (scenario, year, content kind)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub scenario: String,
    pub year: i32,
    pub kind: ContentKind,
}

impl CacheKey {
    pub fn new(scenario: impl Into<String>, year: i32, kind: ContentKind) -> Self {
        Self {
            scenario: scenario.into(),
            year,
            kind,
        }
    }

    fn file_name(&self) -> String {
        let raw = format!("{}\u{1f}{}\u{1f}{:?}", self.scenario, self.year, self.kind);
        format!("{}.json", sha256_hex(raw.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Hot,
    Warm,
    Cold,
}

/// Cache sizing and promotion policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// When false every lookup misses and every insert is dropped
    pub enabled: bool,
    pub hot_capacity: usize,
    pub warm_capacity: usize,
    /// Warm accesses within the window needed for promotion to hot
    pub promote_after_hits: usize,
    /// Sliding window length, in cache operations
    pub promotion_window: u64,
    /// Spill the cold tier to this directory instead of memory
    pub cold_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hot_capacity: 8,
            warm_capacity: 32,
            promote_after_hits: 2,
            promotion_window: 64,
            cold_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub hot_len: usize,
    pub warm_len: usize,
    pub cold_len: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    cold_hits: AtomicU64,
    misses: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
}

type Value = Arc<Vec<u8>>;

#[derive(Debug, Default)]
struct HotTier {
    entries: HashMap<CacheKey, (Value, u64)>,
    /// last-access tick -> key; first entry is least recently used
    recency: BTreeMap<u64, CacheKey>,
}

impl HotTier {
    fn touch(&mut self, key: &CacheKey, tick: u64) -> Option<Value> {
        let (value, last) = self.entries.get_mut(key)?;
        self.recency.remove(last);
        *last = tick;
        self.recency.insert(tick, key.clone());
        Some(Arc::clone(value))
    }

    fn insert(&mut self, key: CacheKey, value: Value, tick: u64) {
        if let Some((_, last)) = self.entries.insert(key.clone(), (value, tick)) {
            self.recency.remove(&last);
        }
        self.recency.insert(tick, key);
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Value> {
        let (value, last) = self.entries.remove(key)?;
        self.recency.remove(&last);
        Some(value)
    }

    fn pop_lru(&mut self) -> Option<(CacheKey, Value)> {
        let (_, key) = self.recency.pop_first()?;
        let (value, _) = self.entries.remove(&key)?;
        Some((key, value))
    }
}

#[derive(Debug)]
struct WarmEntry {
    value: Value,
    frequency: u64,
    last_access: u64,
    recent: VecDeque<u64>,
}

#[derive(Debug, Default)]
struct WarmTier {
    entries: HashMap<CacheKey, WarmEntry>,
}

impl WarmTier {
    fn pop_lfu(&mut self) -> Option<(CacheKey, Value)> {
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.frequency, e.last_access))
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&victim).map(|e| (victim, e.value))
    }
}

#[derive(Debug)]
enum ColdTier {
    Memory(HashMap<CacheKey, Value>),
    Directory { dir: PathBuf, len: usize },
}

/// Hot/warm/cold cache of serialized values
#[derive(Debug)]
pub struct TieredCache {
    config: CacheConfig,
    hot: Mutex<HotTier>,
    warm: Mutex<WarmTier>,
    cold: RwLock<ColdTier>,
    ticks: AtomicU64,
    counters: Counters,
}

impl TieredCache {
    pub fn new(config: CacheConfig) -> Self {
        let cold = match &config.cold_dir {
            Some(dir) => match fs::create_dir_all(dir) {
                Ok(()) => ColdTier::Directory {
                    dir: dir.clone(),
                    len: 0,
                },
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "cold cache directory unusable; keeping cold tier in memory");
                    ColdTier::Memory(HashMap::new())
                }
            },
            None => ColdTier::Memory(HashMap::new()),
        };

        Self {
            config,
            hot: Mutex::new(HotTier::default()),
            warm: Mutex::new(WarmTier::default()),
            cold: RwLock::new(cold),
            ticks: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert or replace; new entries always land in hot
    pub fn put(&self, key: CacheKey, value: Vec<u8>) {
        if !self.config.enabled {
            return;
        }
        let tick = self.tick();
        self.warm.lock().entries.remove(&key);
        self.remove_cold(&key);
        self.insert_hot(key, Arc::new(value), tick);
    }

    /// Look up a key across tiers, applying promotion policy
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        if !self.config.enabled {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let tick = self.tick();

        if let Some(value) = self.hot.lock().touch(key, tick) {
            self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(value) = self.get_warm(key, tick) {
            self.counters.warm_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(value) = self.take_cold(key) {
            self.counters.cold_hits.fetch_add(1, Ordering::Relaxed);
            self.counters.promotions.fetch_add(1, Ordering::Relaxed);
            self.insert_warm(key.clone(), Arc::clone(&value), tick);
            return Some(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Serialize and insert
    pub fn put_json<T: Serialize>(&self, key: CacheKey, value: &T) {
        if !self.config.enabled {
            return;
        }
        match serde_json::to_vec(value) {
            Ok(bytes) => self.put(key, bytes),
            Err(e) => warn!(?key, error = %e, "value not cacheable"),
        }
    }

    /// Look up and deserialize; undecodable entries are dropped and miss
    pub fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(?key, error = %e, "dropping undecodable cache entry");
                self.remove(key);
                None
            }
        }
    }

    /// Remove a key from whichever tier holds it
    pub fn remove(&self, key: &CacheKey) {
        self.hot.lock().remove(key);
        self.warm.lock().entries.remove(key);
        self.remove_cold(key);
    }

    /// Which tier currently holds `key`, if any (no promotion side effects)
    pub fn tier_of(&self, key: &CacheKey) -> Option<CacheTier> {
        if self.hot.lock().entries.contains_key(key) {
            return Some(CacheTier::Hot);
        }
        if self.warm.lock().entries.contains_key(key) {
            return Some(CacheTier::Warm);
        }
        let cold = self.cold.read();
        let present = match &*cold {
            ColdTier::Memory(map) => map.contains_key(key),
            ColdTier::Directory { dir, .. } => dir.join(key.file_name()).exists(),
        };
        present.then_some(CacheTier::Cold)
    }

    pub fn stats(&self) -> CacheStats {
        let hot_len = self.hot.lock().entries.len();
        let warm_len = self.warm.lock().entries.len();
        let cold_len = match &*self.cold.read() {
            ColdTier::Memory(map) => map.len(),
            ColdTier::Directory { len, .. } => *len,
        };
        CacheStats {
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.counters.warm_hits.load(Ordering::Relaxed),
            cold_hits: self.counters.cold_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            demotions: self.counters.demotions.load(Ordering::Relaxed),
            hot_len,
            warm_len,
            cold_len,
        }
    }

    fn insert_hot(&self, key: CacheKey, value: Value, tick: u64) {
        let victim = {
            let mut hot = self.hot.lock();
            hot.insert(key, value, tick);
            if hot.entries.len() > self.config.hot_capacity {
                hot.pop_lru()
            } else {
                None
            }
        };
        if let Some((key, value)) = victim {
            debug!(?key, "demoting hot entry to warm");
            self.counters.demotions.fetch_add(1, Ordering::Relaxed);
            self.insert_warm(key, value, tick);
        }
    }

    fn insert_warm(&self, key: CacheKey, value: Value, tick: u64) {
        let victim = {
            let mut warm = self.warm.lock();
            warm.entries.insert(
                key,
                WarmEntry {
                    value,
                    frequency: 0,
                    last_access: tick,
                    recent: VecDeque::new(),
                },
            );
            if warm.entries.len() > self.config.warm_capacity {
                warm.pop_lfu()
            } else {
                None
            }
        };
        if let Some((key, value)) = victim {
            debug!(?key, "demoting warm entry to cold");
            self.counters.demotions.fetch_add(1, Ordering::Relaxed);
            self.insert_cold(key, value);
        }
    }

    fn get_warm(&self, key: &CacheKey, tick: u64) -> Option<Value> {
        let promoted = {
            let mut warm = self.warm.lock();
            let entry = warm.entries.get_mut(key)?;
            entry.frequency += 1;
            entry.last_access = tick;
            entry.recent.push_back(tick);
            let horizon = tick.saturating_sub(self.config.promotion_window);
            while entry.recent.front().is_some_and(|t| *t <= horizon) {
                entry.recent.pop_front();
            }

            if entry.recent.len() >= self.config.promote_after_hits {
                warm.entries.remove(key).map(|e| e.value)
            } else {
                return Some(Arc::clone(&entry.value));
            }
        };

        let value = promoted?;
        debug!(?key, "promoting warm entry to hot");
        self.counters.promotions.fetch_add(1, Ordering::Relaxed);
        self.insert_hot(key.clone(), Arc::clone(&value), tick);
        Some(value)
    }

    fn insert_cold(&self, key: CacheKey, value: Value) {
        let mut cold = self.cold.write();
        match &mut *cold {
            ColdTier::Memory(map) => {
                map.insert(key, value);
            }
            ColdTier::Directory { dir, len } => {
                let path = dir.join(key.file_name());
                let existed = path.exists();
                match fs::write(&path, value.as_slice()) {
                    Ok(()) if !existed => *len += 1,
                    Ok(()) => {}
                    Err(e) => warn!(?key, error = %e, "cold cache write failed; entry dropped"),
                }
            }
        }
    }

    fn take_cold(&self, key: &CacheKey) -> Option<Value> {
        let mut cold = self.cold.write();
        match &mut *cold {
            ColdTier::Memory(map) => map.remove(key),
            ColdTier::Directory { dir, len } => {
                let path = dir.join(key.file_name());
                let bytes = fs::read(&path).ok()?;
                if fs::remove_file(&path).is_ok() {
                    *len = len.saturating_sub(1);
                }
                Some(Arc::new(bytes))
            }
        }
    }

    fn remove_cold(&self, key: &CacheKey) {
        let mut cold = self.cold.write();
        match &mut *cold {
            ColdTier::Memory(map) => {
                map.remove(key);
            }
            ColdTier::Directory { dir, len } => {
                if fs::remove_file(dir.join(key.file_name())).is_ok() {
                    *len = len.saturating_sub(1);
                }
            }
        }
    }
}
