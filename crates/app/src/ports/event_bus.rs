//! Event bus port: publish/subscribe for device events.

use std::future::Future;

use crate::bridge_event::BridgeEvent;
use crate::error::BridgeError;

/// Publishes device events to interested subscribers.
pub trait EventPublisher {
    /// Publish an event to all current subscribers.
    fn publish(&self, event: BridgeEvent)
    -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl<T: EventPublisher + Send + Sync> EventPublisher for std::sync::Arc<T> {
    fn publish(
        &self,
        event: BridgeEvent,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        (**self).publish(event)
    }
}
