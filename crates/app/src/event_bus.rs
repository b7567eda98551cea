//! In-process event bus backed by a tokio broadcast channel.

use std::future::Future;

use tokio::sync::broadcast;

use crate::bridge_event::BridgeEvent;
use crate::error::BridgeError;
use crate::ports::EventPublisher;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped).
#[derive(Debug, Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<BridgeEvent>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; the configuration layer rejects it first.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events on this bus.
    ///
    /// Returns a receiver that will get all events published *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(
        &self,
        event: BridgeEvent,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        // broadcast::send fails only when there are zero receivers
        let _ = self.sender.send(event);
        async { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmvirt_domain::event::DeviceEventKind;
    use hmvirt_domain::parameter::ParamValue;

    fn event(name: &str) -> BridgeEvent {
        BridgeEvent {
            kind: DeviceEventKind::DeviceChannelValueChange,
            device: "HMV_001".to_string(),
            channel: "HMV_001:1".to_string(),
            name: name.to_string(),
            new_value: ParamValue::Bool(true),
            old_value: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn should_deliver_event_to_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(event("PRESS_SHORT")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name, "PRESS_SHORT");
    }

    #[tokio::test]
    async fn should_deliver_event_to_multiple_subscribers() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(event("STATE")).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().name, "STATE");
        assert_eq!(rx2.recv().await.unwrap().name, "STATE");
    }

    #[tokio::test]
    async fn should_succeed_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        let result = bus.publish(event("STATE")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn should_not_deliver_events_published_before_subscription() {
        let bus = InProcessEventBus::new(16);
        bus.publish(event("EARLY")).await.unwrap();

        let mut rx = bus.subscribe();
        bus.publish(event("LATER")).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name, "LATER");
    }
}
