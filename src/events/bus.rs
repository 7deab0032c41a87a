//! The Bus: fans out appended events to WebSocket subscribers via
//! `tokio::sync::broadcast`. A subscriber that falls behind the channel's
//! bounded buffer is disconnected (the `Lagged` error) rather than blocking
//! the publisher — per SPEC_FULL §4.8 it resyncs via an id-range query on
//! reconnect.

use super::types::Event;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is not an error; it just means nobody is watching.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{EventPayload, LifecycleLevel};
    use chrono::Utc;

    fn event(id: u64) -> Event {
        Event {
            id,
            timestamp: Utc::now(),
            cycle: 0,
            payload: EventPayload::AgentLifecycleEvent {
                level: LifecycleLevel::Info,
                message: "test".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(event(1));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(event(1));
    }
}
