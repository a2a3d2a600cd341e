//! Scripted wall clock for deterministic merge timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use git_storage::core::time::{override_clock_for_tests, ClockOverride, TimeSource};

pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Install a manual clock; the guard serializes clocked tests and puts
/// the process back on the system clock on drop.
pub fn install(start_ms: u64) -> (ClockOverride, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock(AtomicU64::new(start_ms)));
    let guard = override_clock_for_tests(clock.clone());
    (guard, clock)
}
