//! Wall-clock primitives.
//!
//! All record ordering in this store is plain wall-clock milliseconds:
//! `updated_at` decides merges, with the record id as tiebreak. Production
//! code always reads the system clock; tests install a scripted
//! [`TimeSource`] through a process-global override slot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WallClock(pub u64);

impl WallClock {
    pub fn now() -> Self {
        Self(current_millis())
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

/// Pluggable clock, implemented by test fixtures that script timestamps.
pub trait TimeSource: Send + Sync {
    fn millis(&self) -> u64;
}

/// Active override, if any. `None` means the system clock; overrides never
/// nest because [`override_clock_for_tests`] serializes its callers, so
/// restoring is just clearing the slot.
static CLOCK_OVERRIDE: RwLock<Option<Arc<dyn TimeSource>>> = RwLock::new(None);

fn current_millis() -> u64 {
    if let Some(scripted) = CLOCK_OVERRIDE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return scripted.millis();
    }
    system_millis()
}

fn system_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

fn override_slot() -> RwLockWriteGuard<'static, Option<Arc<dyn TimeSource>>> {
    CLOCK_OVERRIDE.write().unwrap_or_else(PoisonError::into_inner)
}

/// Puts the process back on the system clock when dropped. Holding it
/// also keeps other clock-scripting tests out of the override slot.
#[doc(hidden)]
pub struct ClockOverride {
    _serial: MutexGuard<'static, ()>,
}

impl Drop for ClockOverride {
    fn drop(&mut self) {
        *override_slot() = None;
    }
}

/// Route [`WallClock::now`] through a scripted source until the returned
/// guard drops. Test-only; callers are serialized so scripted clocks
/// cannot observe each other.
#[doc(hidden)]
pub fn override_clock_for_tests(source: Arc<dyn TimeSource>) -> ClockOverride {
    static SERIAL: Mutex<()> = Mutex::new(());
    let serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    *override_slot() = Some(source);
    ClockOverride { _serial: serial }
}
