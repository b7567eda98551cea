//! Change events and the observer registry that carries them.
//!
//! Value changes flow bottom-up: a [`Channel`](crate::channel::Channel)
//! raises [`ChannelEvent`]s, its owning [`Device`](crate::device::Device)
//! re-emits them as [`DeviceEvent`]s with the device address injected, and
//! external subscribers (protocol bridge, plugins) observe the device.
//!
//! Delivery is synchronous: [`Observers::dispatch`] calls every matching
//! handler, in registration order, before it returns.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::parameter::ParamValue;

/// Name of the maintenance trigger parameter that is re-routed instead of
/// being reported as a value change.
pub const INSTALL_TEST: &str = "INSTALL_TEST";

/// An event that can be routed by kind.
pub trait Event {
    type Kind: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Kinds raised by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventKind {
    /// Local-origin write; must be announced upstream.
    ChannelValueChange,
    /// Controller-origin update; never echoed back to the controller.
    EventChannelValueChange,
}

impl ChannelEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChannelValueChange => "channel_value_change",
            Self::EventChannelValueChange => "event_channel_value_change",
        }
    }
}

/// Kinds raised by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventKind {
    DeviceChannelValueChange,
    EventDeviceChannelValueChange,
    DeviceChannelInstallTest,
}

impl DeviceEventKind {
    pub const ALL: [Self; 3] = [
        Self::DeviceChannelValueChange,
        Self::EventDeviceChannelValueChange,
        Self::DeviceChannelInstallTest,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceChannelValueChange => "device_channel_value_change",
            Self::EventDeviceChannelValueChange => "event_device_channel_value_change",
            Self::DeviceChannelInstallTest => "device_channel_install_test",
        }
    }
}

impl fmt::Display for DeviceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value change raised by a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEvent {
    #[serde(skip)]
    pub kind: ChannelEventKind,
    pub name: String,
    pub new_value: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<ParamValue>,
    pub channel: String,
}

impl Event for ChannelEvent {
    type Kind = ChannelEventKind;

    fn kind(&self) -> ChannelEventKind {
        self.kind
    }
}

/// A channel event re-emitted at device scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    #[serde(skip)]
    pub kind: DeviceEventKind,
    pub name: String,
    pub new_value: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<ParamValue>,
    pub channel: String,
    pub device: String,
}

impl DeviceEvent {
    /// Lift a channel event to device scope.
    ///
    /// Local-origin `INSTALL_TEST` writes become
    /// [`DeviceChannelInstallTest`](DeviceEventKind::DeviceChannelInstallTest).
    #[must_use]
    pub fn from_channel(event: &ChannelEvent, device: &str) -> Self {
        let kind = match event.kind {
            ChannelEventKind::ChannelValueChange if event.name == INSTALL_TEST => {
                DeviceEventKind::DeviceChannelInstallTest
            }
            ChannelEventKind::ChannelValueChange => DeviceEventKind::DeviceChannelValueChange,
            ChannelEventKind::EventChannelValueChange => {
                DeviceEventKind::EventDeviceChannelValueChange
            }
        };
        Self {
            kind,
            name: event.name.clone(),
            new_value: event.new_value.clone(),
            old_value: event.old_value.clone(),
            channel: event.channel.clone(),
            device: device.to_string(),
        }
    }
}

impl Event for DeviceEvent {
    type Kind = DeviceEventKind;

    fn kind(&self) -> DeviceEventKind {
        self.kind
    }
}

/// Handle returned by [`Observers::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Callback invoked for each matching event.
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Subscription<E: Event> {
    id: SubscriptionId,
    kind: E::Kind,
    handler: Handler<E>,
}

/// Registry of event handlers keyed by event kind.
pub struct Observers<E: Event> {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription<E>>>,
}

impl<E: Event> Default for Observers<E> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Event> fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscriptions", &self.len())
            .finish()
    }
}

impl<E: Event> Observers<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Subscription {
            id,
            kind,
            handler: Arc::new(handler),
        });
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// The handler list is snapshotted first, so handlers may subscribe or
    /// unsubscribe while being called.
    pub fn dispatch(&self, event: &E) {
        let kind = event.kind();
        let handlers: Vec<Handler<E>> = self
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscription<E>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
