//! Outbound event fan-out.
//!
//! [`EventBus`] wraps a tokio broadcast channel. Publishing never blocks and
//! never fails: with no subscribers the event is dropped.

use peatnet_types::EngineEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the event channel.
///
/// If a subscriber falls behind by more than this many messages it will
/// receive a [`broadcast::error::RecvError::Lagged`] and skip to the
/// newest message.
const BUS_CAPACITY: usize = 256;

/// Broadcast channel for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// A bus with the default capacity.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Returns how many subscribers received it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        let kind = event.kind();
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(event = kind, delivered, "event published");
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use peatnet_types::{ChatId, UserId};

    use super::*;

    fn event() -> EngineEvent {
        EngineEvent::PerforationInflicted {
            chat_id: ChatId(1),
            user_id: UserId(2),
            health_loss: 20,
            at: Utc::now(),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(event()), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(event()), 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind(), "perforation_inflicted");
    }
}
