//! Time sources for audit stamping and run bookkeeping
//!
//! Wall-clock time only ever enters the engine through a [`Clock`]. Tests and
//! reproducible runs swap in [`FixedClock`] (or [`SteppingClock`]) so that
//! record uuids, timestamps and therefore integrity hashes are deterministic.

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of high-resolution UTC timestamps
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a single instant
///
/// # Example
/// ```
/// use multiyear_sim_core_rs::core::time::{Clock, FixedClock};
///
/// let clock = FixedClock::from_unix_millis(1_700_000_000_000);
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self { instant }
    }

    /// Build from milliseconds since the unix epoch (out-of-range values clamp to the epoch)
    pub fn from_unix_millis(millis: i64) -> Self {
        let instant = Utc
            .timestamp_millis_opt(millis)
            .single()
            .unwrap_or_default();
        Self { instant }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
    }
}

/// Deterministic clock that advances by a fixed step on every read
///
/// Useful when ordering between stamps matters (run `updated_at`,
/// stale-run detection) but the run must still be reproducible.
#[derive(Debug)]
pub struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            next: Mutex::new(start),
            step,
        }
    }

    /// Jump the clock forward without reading it
    pub fn advance(&self, by: Duration) {
        let mut next = self.next.lock();
        *next += by;
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock();
        let current = *next;
        *next += self.step;
        current
    }
}
