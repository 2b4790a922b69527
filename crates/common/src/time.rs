//! Wall-clock abstraction
//!
//! Lease expiry is decided by comparing the local wall clock against the
//! deadline stored at grant time. All timestamps handed out here are truncated
//! to microseconds so they survive a round trip through PostgreSQL
//! `TIMESTAMPTZ` unchanged; conditional updates compare them for equality.

use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    /// Current UTC time, truncated to microseconds
    fn now(&self) -> DateTime<Utc>;
}

/// The process wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }
}

/// A clock that only moves when told to
///
/// Cloning shares the underlying instant, so one handle can drive several
/// components in tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start.trunc_subsecs(6))),
        }
    }

    /// Create a clock frozen at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write();
        *now = deadline_after(*now, by);
    }

    /// Jump to an arbitrary instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write() = to.trunc_subsecs(6);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// `from + duration`, saturating at the maximum representable instant
pub fn deadline_after(from: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| from.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_system_clock_truncates_to_micros() {
        let now = SystemClock.now();
        assert_eq!(now.nanosecond() % 1_000, 0);
    }

    #[test]
    fn test_manual_clock_advance_is_shared() {
        let clock = ManualClock::starting_now();
        let handle = clock.clone();
        let before = clock.now();

        handle.advance(Duration::from_secs(31));

        assert_eq!(clock.now() - before, chrono::Duration::seconds(31));
    }

    #[test]
    fn test_deadline_after_saturates() {
        let now = SystemClock.now();
        let deadline = deadline_after(now, Duration::from_secs(u64::MAX));
        assert!(deadline > now);
    }
}
