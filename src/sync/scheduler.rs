//! Sync scheduling with debounce and a periodic interval.
//!
//! Both triggers funnel into one channel drained by the store's background
//! worker. Timers are plain sleeping threads; a generation counter makes
//! re-arming cheap — superseded timers wake up, notice the generation moved
//! on, and exit without sending.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Sender;

/// A request for a background sync round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncTrigger {
    pub reason: String,
}

pub struct SyncScheduler {
    trigger_tx: Sender<SyncTrigger>,
    debounce_generation: Arc<AtomicU64>,
    interval_generation: Arc<AtomicU64>,
}

impl SyncScheduler {
    pub fn new(trigger_tx: Sender<SyncTrigger>) -> Self {
        Self {
            trigger_tx,
            debounce_generation: Arc::new(AtomicU64::new(0)),
            interval_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// (Re)arm the debounce timer. Rapid mutations keep pushing the fire
    /// time out; only the last timer in a burst actually sends.
    pub fn schedule_debounced(&self, reason: impl Into<String>, delay: Duration) {
        let generation = self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let reason = reason.into();
        let guard = Arc::clone(&self.debounce_generation);
        let tx = self.trigger_tx.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if guard.load(Ordering::SeqCst) == generation {
                // Receiver may be gone during shutdown; nothing to do then.
                let _ = tx.send(SyncTrigger { reason });
            }
        });
    }

    /// Drop any pending debounce without firing.
    pub fn cancel_debounce(&self) {
        self.debounce_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Rebuild the periodic trigger. `None` stops it.
    pub fn set_interval(&self, every: Option<Duration>) {
        let generation = self.interval_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(every) = every else {
            return;
        };
        let guard = Arc::clone(&self.interval_generation);
        let tx = self.trigger_tx.clone();
        std::thread::spawn(move || loop {
            std::thread::sleep(every);
            if guard.load(Ordering::SeqCst) != generation {
                break;
            }
            if tx
                .send(SyncTrigger {
                    reason: "interval".to_string(),
                })
                .is_err()
            {
                break;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crossbeam::channel;

    #[test]
    fn debounce_fires_once_for_a_burst() {
        let (tx, rx) = channel::unbounded();
        let scheduler = SyncScheduler::new(tx);

        for _ in 0..10 {
            scheduler.schedule_debounced("set", Duration::from_millis(40));
            std::thread::sleep(Duration::from_millis(5));
        }

        let trigger = rx
            .recv_timeout(Duration::from_millis(500))
            .expect("debounced trigger");
        assert_eq!(trigger.reason, "set");
        // The superseded timers must not fire.
        assert!(rx.recv_timeout(Duration::from_millis(120)).is_err());
    }

    #[test]
    fn cancel_suppresses_pending_debounce() {
        let (tx, rx) = channel::unbounded();
        let scheduler = SyncScheduler::new(tx);

        scheduler.schedule_debounced("set", Duration::from_millis(30));
        scheduler.cancel_debounce();

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
    }

    #[test]
    fn interval_ticks_until_rebuilt() {
        let (tx, rx) = channel::unbounded();
        let scheduler = SyncScheduler::new(tx);

        scheduler.set_interval(Some(Duration::from_millis(20)));
        let first = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(first.reason, "interval");

        scheduler.set_interval(None);
        // Drain anything already queued, then expect silence.
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
