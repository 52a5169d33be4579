//! Device clocks

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::DeviceClock;
use crate::domain::{Duration, Timestamp};

/// Nanoseconds since the clock was created
///
/// Stands in for the device clock when the target runs on this host.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for MonotonicClock {
    fn now(&self) -> Timestamp {
        let elapsed: Duration = self.origin.elapsed().into();
        Timestamp(elapsed.0)
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self { now_ns: AtomicU64::new(start.0) }
    }

    pub fn set(&self, now: Timestamp) {
        self.now_ns.store(now.0, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns.fetch_add(by.0, Ordering::SeqCst);
    }
}

impl DeviceClock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ns.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_on_request() {
        let clock = ManualClock::new(Timestamp(1_000));
        assert_eq!(clock.now(), Timestamp(1_000));
        clock.advance(Duration::from_micros(5));
        assert_eq!(clock.now(), Timestamp(6_000));
        clock.set(Timestamp(42));
        assert_eq!(clock.now(), Timestamp(42));
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
