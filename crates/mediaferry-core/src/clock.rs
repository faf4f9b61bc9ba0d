//! Wall-clock abstraction for hand-off expiry.
//!
//! Tickets and resume records are stamped with Unix milliseconds and
//! checked against a TTL when read, possibly after a full page reload.
//! [`SystemClock`] reads real time through `web-time`, which maps to
//! `Date.now()` on WASM and `std::time::SystemTime` on native targets.

use std::cell::Cell;
use std::time::Duration;

/// Source of the current Unix time in milliseconds.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        web_time::SystemTime::now()
            .duration_since(web_time::UNIX_EPOCH)
            .map_or(0, duration_millis)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    /// Start the clock at `millis` since the epoch.
    #[must_use]
    pub const fn at(millis: u64) -> Self {
        Self {
            now: Cell::new(millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get().saturating_add(duration_millis(by)));
    }

    /// Jump to an absolute time.
    pub fn set(&self, millis: u64) {
        self.now.set(millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
#[must_use]
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 3_000);
        clock.set(5);
        assert_eq!(clock.now_millis(), 5);
    }

    #[test]
    fn manual_clock_saturates() {
        let clock = ManualClock::at(u64::MAX - 1);
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.now_millis(), u64::MAX);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn borrowed_clock_delegates() {
        let clock = ManualClock::at(42);
        let by_ref: &ManualClock = &clock;
        assert_eq!(Clock::now_millis(&by_ref), 42);
    }
}
