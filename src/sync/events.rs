//! Sync lifecycle events.
//!
//! Subscribers get a bounded channel; dropping the subscription
//! unsubscribes (disconnected receivers are pruned on the next publish).
//! A subscriber that falls behind loses events rather than blocking the
//! sync path.

use std::sync::{Arc, Mutex};

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};

use crate::core::WallClock;

use super::SyncState;

/// Queue depth per subscriber.
const SUBSCRIBER_QUEUE: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEventKind {
    Start,
    Finish,
    Error,
}

impl SyncEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncEventKind::Start => "sync:start",
            SyncEventKind::Finish => "sync:finish",
            SyncEventKind::Error => "sync:error",
        }
    }
}

impl std::fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncEvent {
    pub kind: SyncEventKind,
    pub at: WallClock,
    pub reason: String,
    pub state: SyncState,
}

/// Receiving half handed to subscribers.
pub struct EventSubscription {
    receiver: Receiver<SyncEvent>,
}

impl EventSubscription {
    pub fn recv(&self) -> Result<SyncEvent, crossbeam::channel::RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<SyncEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SyncEvent, crossbeam::channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<SyncEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = crossbeam::channel::bounded(SUBSCRIBER_QUEUE);
        self.lock().push(sender);
        EventSubscription { receiver }
    }

    pub fn publish(&self, event: SyncEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            // Lagging subscriber: drop this event for them, keep the slot.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<SyncEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: SyncEventKind, state: SyncState) -> SyncEvent {
        SyncEvent {
            kind,
            at: WallClock(1),
            reason: "manual".to_string(),
            state,
        }
    }

    #[test]
    fn delivers_in_order() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.publish(event(SyncEventKind::Start, SyncState::Syncing));
        bus.publish(event(SyncEventKind::Finish, SyncState::Idle));

        assert_eq!(sub.recv().unwrap().kind, SyncEventKind::Start);
        assert_eq!(sub.recv().unwrap().kind, SyncEventKind::Finish);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        bus.publish(event(SyncEventKind::Start, SyncState::Syncing));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn kind_strings_match_wire_names() {
        assert_eq!(SyncEventKind::Start.to_string(), "sync:start");
        assert_eq!(SyncEventKind::Finish.to_string(), "sync:finish");
        assert_eq!(SyncEventKind::Error.to_string(), "sync:error");
    }
}
