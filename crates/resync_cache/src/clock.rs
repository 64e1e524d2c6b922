//! Time sources.

use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time, in seconds since the Unix epoch.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64())
    }
}

/// A clock that only moves when told to.
///
/// ```rust
/// use resync_cache::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new(100.0);
/// clock.advance(Duration::from_millis(1500));
/// assert_eq!(clock.now(), 101.5);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Creates a clock reading `start` seconds since the epoch.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_secs_f64();
    }

    /// Sets the current reading.
    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000.0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
