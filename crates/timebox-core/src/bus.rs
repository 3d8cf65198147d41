//! Multi-consumer event fan-out
//!
//! A thin wrapper over `tokio::sync::broadcast`: every subscriber gets its
//! own bounded buffer, a slow subscriber only loses its own oldest events,
//! and publishing never blocks on anyone.

use thiserror::Error;
use tokio::sync::broadcast;

use crate::TimerEvent;

/// Per-subscriber buffer size. Overflow drops the oldest buffered events
/// for that subscriber only.
pub const EVENT_BUFFER: usize = 64;

/// Broadcast bus for [`TimerEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TimerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Deliver an event to every active subscriber. A bus with no
    /// subscribers swallows the event; there is no replay.
    pub fn publish(&self, event: TimerEvent) {
        let _ = self.tx.send(event);
    }

    /// Register a new subscriber. It sees events published from this point
    /// on, in publish order. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle yielding events in publish order until dropped.
pub struct EventSubscription {
    rx: broadcast::Receiver<TimerEvent>,
}

impl EventSubscription {
    /// Wait for the next event.
    ///
    /// `Lagged(n)` means this subscriber's buffer overflowed and its `n`
    /// oldest events were discarded; the stream continues from the oldest
    /// retained event on the next call.
    pub async fn recv(&mut self) -> Result<TimerEvent, SubscriptionError> {
        match self.rx.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(SubscriptionError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("subscriber lagged, {0} events dropped")]
    Lagged(u64),

    #[error("event bus closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebox_api::{Origin, Session, SessionStatus};
    use timebox_util::SessionId;

    fn tick(n: u64) -> TimerEvent {
        TimerEvent::Tick {
            remaining_secs: n,
            session: Session {
                id: SessionId::new(),
                label: "bus test".into(),
                duration_secs: 60,
                started_at: timebox_util::now(),
                ended_at: None,
                origin: Origin::Human,
                status: SessionStatus::Running,
            },
        }
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        for n in 0..5 {
            bus.publish(tick(n));
        }

        for n in 0..5 {
            match sub.recv().await.unwrap() {
                TimerEvent::Tick { remaining_secs, .. } => assert_eq!(remaining_secs, n),
                other => panic!("expected Tick, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn subscribers_are_independent() {
        let bus = EventBus::new();
        let mut fast = bus.subscribe();
        let mut slow = bus.subscribe();

        bus.publish(tick(1));
        bus.publish(tick(2));

        // The fast subscriber drains immediately; the slow one reads later
        // and still sees the same sequence.
        assert!(matches!(fast.recv().await.unwrap(), TimerEvent::Tick { remaining_secs: 1, .. }));
        assert!(matches!(fast.recv().await.unwrap(), TimerEvent::Tick { remaining_secs: 2, .. }));

        assert!(matches!(slow.recv().await.unwrap(), TimerEvent::Tick { remaining_secs: 1, .. }));
        assert!(matches!(slow.recv().await.unwrap(), TimerEvent::Tick { remaining_secs: 2, .. }));
    }

    #[tokio::test]
    async fn overflow_drops_oldest_for_lagging_subscriber_only() {
        let bus = EventBus::new();
        let mut lagging = bus.subscribe();

        let extra = 6;
        for n in 0..(EVENT_BUFFER as u64 + extra) {
            bus.publish(tick(n));
        }

        // A subscriber joining now is unaffected by the earlier overflow.
        let mut fresh = bus.subscribe();
        bus.publish(tick(999));
        assert!(matches!(fresh.recv().await.unwrap(), TimerEvent::Tick { remaining_secs: 999, .. }));

        // The lagging subscriber is told how much it missed, then resumes
        // from the oldest retained event.
        match lagging.recv().await {
            Err(SubscriptionError::Lagged(n)) => assert_eq!(n, extra + 1),
            other => panic!("expected Lagged, got {:?}", other),
        }
        match lagging.recv().await.unwrap() {
            TimerEvent::Tick { remaining_secs, .. } => assert_eq!(remaining_secs, extra + 1),
            other => panic!("expected Tick, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        // Publishing into the void is fine.
        bus.publish(tick(0));
    }
}
