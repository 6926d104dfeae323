//! Wall clock abstraction.

use crate::protocol::UnixTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use chrono::Utc;

/// Source of the current Unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> UnixTime;
}

/// Real system time
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixTime {
        // Pre-epoch clocks read as zero
        Utc::now().timestamp().max(0) as UnixTime
    }
}

/// Simulated time, shared between the mock ledger and a session under test
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: UnixTime) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: UnixTime) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Advance simulated time by seconds
    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UnixTime {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(5);
        assert_eq!(other.now(), 1_005);
        other.set(42);
        assert_eq!(clock.now(), 42);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }

    #[test]
    fn test_system_clock_matches_utc_seconds() {
        let before = Utc::now().timestamp() as UnixTime;
        let now = SystemClock.now();
        let after = Utc::now().timestamp() as UnixTime;
        assert!(before <= now && now <= after);
    }
}
