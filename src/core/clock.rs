use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{Error, Result};

/// A source of timestamps for points added without an explicit time.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in nanoseconds since the UNIX epoch.
    fn now(&self) -> u64;
}

/// Wall-clock time from `std::time::SystemTime`.
///
/// Susceptible to NTP adjustments; a clock that reads before the epoch
/// reports 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        timestamp_ns(SystemTime::now()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one copy to a store and
/// keep another to advance time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ns: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(now_ns: u64) -> Self {
        Self {
            now_ns: Arc::new(AtomicU64::new(now_ns)),
        }
    }

    pub fn set(&self, now_ns: u64) {
        self.now_ns.store(now_ns, Ordering::Release);
    }

    pub fn advance(&self, by: std::time::Duration) {
        let by_ns = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(by_ns, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::Acquire)
    }
}

/// Convert a wall-clock time into nanoseconds since the UNIX epoch.
///
/// # Errors
///
/// - `Error::Config`: `time` is before the epoch or past the u64 nanosecond range
pub fn timestamp_ns(time: SystemTime) -> Result<u64> {
    let since_epoch = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| Error::Config("timestamp before UNIX epoch".to_string()))?;
    u64::try_from(since_epoch.as_nanos())
        .map_err(|_| Error::Config("timestamp exceeds nanosecond range".to_string()))
}
