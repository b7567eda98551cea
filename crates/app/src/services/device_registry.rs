//! Device registry: the set of devices published to the controller.
//!
//! The registry owns every published [`SharedDevice`], persists its state
//! through a [`DeviceStore`] and forwards each device event to an
//! [`EventPublisher`] as a [`BridgeEvent`].

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use hmvirt_domain::channel::{ChannelDescription, Notify};
use hmvirt_domain::device::DeviceDescription;
use hmvirt_domain::event::{DeviceEventKind, SubscriptionId};
use hmvirt_domain::parameter::ParamValue;

use crate::bridge_event::BridgeEvent;
use crate::error::BridgeError;
use crate::ports::{DeviceStore, EventPublisher};
use crate::shared_device::SharedDevice;

/// One entry of a `listDevices` style reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Description {
    Device(DeviceDescription),
    Channel(ChannelDescription),
}

struct Entry {
    device: SharedDevice,
    subscriptions: Vec<SubscriptionId>,
}

impl Entry {
    fn detach(self) {
        let Self {
            device,
            subscriptions,
        } = self;
        let result = device.read(|d| {
            for id in subscriptions {
                d.unsubscribe(id);
            }
        });
        if let Err(err) = result {
            tracing::warn!(%err, address = %device.address(), "could not detach device");
        }
    }
}

/// Registry of published devices.
pub struct DeviceRegistry<S> {
    store: S,
    entries: Mutex<Vec<Entry>>,
    forward: mpsc::UnboundedSender<BridgeEvent>,
}

impl<S> std::fmt::Debug for DeviceRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.len())
            .finish_non_exhaustive()
    }
}

impl<S> DeviceRegistry<S> {
    /// Number of published devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The published device at `address`.
    #[must_use]
    pub fn device(&self, address: &str) -> Option<SharedDevice> {
        self.entries
            .lock()
            .iter()
            .find(|e| e.device.address() == address)
            .map(|e| e.device.clone())
    }

    /// All published devices, in publication order.
    #[must_use]
    pub fn devices(&self) -> Vec<SharedDevice> {
        self.entries.lock().iter().map(|e| e.device.clone()).collect()
    }

    /// Published devices whose address starts with `prefix`.
    #[must_use]
    pub fn devices_with_name_like(&self, prefix: &str) -> Vec<SharedDevice> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.device.address().starts_with(prefix))
            .map(|e| e.device.clone())
            .collect()
    }

    /// Device and channel descriptions of every published device: each
    /// device record is followed by the records of its channels.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Busy`] when a device is being written on the
    /// calling thread.
    pub fn device_descriptions(&self) -> Result<Vec<Description>, BridgeError> {
        let mut descriptions = Vec::new();
        for device in self.devices() {
            device.read(|d| {
                descriptions.push(Description::Device(d.description()));
                descriptions.extend(d.channel_descriptions().into_iter().map(Description::Channel));
            })?;
        }
        Ok(descriptions)
    }

    /// Local-origin write addressed by channel address (`<device>:<index>`).
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] when no device owns the channel, or
    /// the device's write error.
    pub fn set_value(
        &self,
        channel: &str,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), BridgeError> {
        self.owner_of(channel)?.set_value(channel, name, value)
    }

    /// Controller-origin write addressed by channel address.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] when no device owns the channel, or
    /// the device's write error.
    pub fn update_value(
        &self,
        channel: &str,
        name: &str,
        value: impl Into<ParamValue>,
        notify: Notify,
    ) -> Result<(), BridgeError> {
        self.owner_of(channel)?
            .update_value(channel, name, value, notify)
    }

    fn owner_of(&self, channel: &str) -> Result<SharedDevice, BridgeError> {
        let address = channel.split_once(':').map_or(channel, |(device, _)| device);
        self.device(address).ok_or_else(|| BridgeError::NotFound {
            address: address.to_string(),
        })
    }

    fn take(&self, address: &str) -> Option<Entry> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|e| e.device.address() == address)?;
        Some(entries.remove(position))
    }
}

impl<S: DeviceStore + Send + Sync> DeviceRegistry<S> {
    /// Create a registry persisting to `store` and forwarding events to
    /// `publisher`.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime: the event forwarder runs
    /// as a spawned task.
    pub fn new<P>(store: S, publisher: P) -> Self
    where
        P: EventPublisher + Send + Sync + 'static,
    {
        let (forward, events) = mpsc::unbounded_channel();
        tokio::spawn(forward_events(events, publisher));
        Self {
            store,
            entries: Mutex::new(Vec::new()),
            forward,
        }
    }

    /// Publish an initialized device, start forwarding its events and
    /// persist it. A device already published at the same address is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotInitialized`] for a device that was never
    /// built, or a storage error from the store.
    #[tracing::instrument(skip(self, device), fields(address = %device.address()))]
    pub async fn add_device(&self, device: SharedDevice) -> Result<(), BridgeError> {
        let address = device.address().to_string();
        let subscriptions = device.write(|d| {
            if !d.is_initialized() {
                return Err(BridgeError::NotInitialized {
                    address: address.clone(),
                });
            }
            d.mark_published();
            Ok(DeviceEventKind::ALL
                .into_iter()
                .map(|kind| {
                    let forward = self.forward.clone();
                    d.subscribe(kind, move |event| {
                        if forward.send(BridgeEvent::from(event)).is_err() {
                            tracing::debug!("event forwarder stopped, dropping device event");
                        }
                    })
                })
                .collect::<Vec<_>>())
        })??;

        let replaced = {
            let mut entries = self.entries.lock();
            let replaced = entries
                .iter()
                .position(|e| e.device.address() == address)
                .map(|position| entries.remove(position));
            entries.push(Entry {
                device,
                subscriptions,
            });
            replaced
        };
        if let Some(old) = replaced {
            tracing::warn!("replacing a device published at the same address");
            old.detach();
        }
        tracing::info!("device published");

        self.persist(&address).await
    }

    /// Unpublish a device and delete its stored document. Returns whether
    /// the device was published.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the store.
    #[tracing::instrument(skip(self))]
    pub async fn delete_device(&self, address: &str) -> Result<bool, BridgeError> {
        let Some(entry) = self.take(address) else {
            tracing::debug!("no device to delete");
            return Ok(false);
        };
        entry.detach();
        self.store.delete(address).await?;
        tracing::info!("device deleted");
        Ok(true)
    }

    /// Write the current state of a published device to the store.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotFound`] for an unknown address, or a
    /// serialization or storage error.
    #[tracing::instrument(skip(self))]
    pub async fn persist(&self, address: &str) -> Result<(), BridgeError> {
        let device = self.device(address).ok_or_else(|| BridgeError::NotFound {
            address: address.to_string(),
        })?;
        let document = device.read(hmvirt_domain::device::Device::save_persistent)??;
        self.store.save(address, document).await
    }

    /// Persist every published device, logging failures. Returns how many
    /// were written.
    pub async fn persist_all(&self) -> usize {
        let mut written = 0;
        for device in self.devices() {
            match self.persist(device.address()).await {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::warn!(%err, address = %device.address(), "failed to persist device");
                }
            }
        }
        written
    }

    /// The stored document for `address`.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the store.
    pub async fn stored_data(&self, address: &str) -> Result<Option<String>, BridgeError> {
        self.store.load(address).await
    }

    /// Drop the stored document for `address` without unpublishing it.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the store.
    #[tracing::instrument(skip(self))]
    pub async fn remove_stored_data(&self, address: &str) -> Result<bool, BridgeError> {
        self.store.delete(address).await
    }
}

async fn forward_events<P: EventPublisher>(
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
    publisher: P,
) {
    while let Some(event) = events.recv().await {
        if let Err(err) = publisher.publish(event).await {
            tracing::warn!(%err, "failed to publish device event");
        }
    }
    tracing::debug!("event forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::InProcessEventBus;
    use crate::services::device_factory::DeviceFactory;
    use hmvirt_domain::template::StaticTemplates;
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    #[derive(Default)]
    struct InMemoryStore {
        documents: std::sync::Mutex<HashMap<String, String>>,
    }

    impl DeviceStore for InMemoryStore {
        fn load(
            &self,
            address: &str,
        ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send {
            let result = self.documents.lock().unwrap().get(address).cloned();
            async { Ok(result) }
        }

        fn save(
            &self,
            address: &str,
            document: String,
        ) -> impl Future<Output = Result<(), BridgeError>> + Send {
            self.documents
                .lock()
                .unwrap()
                .insert(address.to_string(), document);
            async { Ok(()) }
        }

        fn delete(&self, address: &str) -> impl Future<Output = Result<bool, BridgeError>> + Send {
            let existed = self.documents.lock().unwrap().remove(address).is_some();
            async move { Ok(existed) }
        }

        fn list(&self) -> impl Future<Output = Result<Vec<String>, BridgeError>> + Send {
            let result = self.documents.lock().unwrap().keys().cloned().collect();
            async { Ok(result) }
        }
    }

    const DIMMER: &str = r#"{
        "type": "HM-LC-Dim1T-Pl",
        "channels": [
            {"adress": 0, "type": "MAINTENANCE", "paramsets": [
                {"name": "VALUES", "id": "maint_ch_values", "parameter": [
                    {"name": "UNREACH", "type": "BOOL", "operations": 5}
                ]}
            ]},
            {"adress": 1, "type": "DIMMER", "paramsets": [
                {"name": "VALUES", "id": "dimmer_ch_values", "parameter": [
                    {"name": "LEVEL", "type": "FLOAT", "min": 0.0, "max": 1.0, "operations": 7},
                    {"name": "WORKING", "type": "BOOL", "operations": 5}
                ]}
            ]}
        ],
        "paramsets": []
    }"#;

    fn factory() -> DeviceFactory<StaticTemplates> {
        DeviceFactory::new(StaticTemplates::new().with("HM-LC-Dim1T-Pl", DIMMER))
    }

    fn dimmer(address: &str) -> SharedDevice {
        SharedDevice::new(factory().create("HM-LC-Dim1T-Pl", address).unwrap())
    }

    fn registry() -> (
        DeviceRegistry<Arc<InMemoryStore>>,
        Arc<InMemoryStore>,
        broadcast::Receiver<BridgeEvent>,
    ) {
        let store = Arc::new(InMemoryStore::default());
        let bus = InProcessEventBus::new(16);
        let rx = bus.subscribe();
        (DeviceRegistry::new(Arc::clone(&store), bus), store, rx)
    }

    async fn next_event(rx: &mut broadcast::Receiver<BridgeEvent>) -> BridgeEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn should_reject_uninitialized_device() {
        let (registry, store, _rx) = registry();
        let device = SharedDevice::new(hmvirt_domain::device::Device::new(None));

        let result = registry.add_device(device).await;

        assert!(matches!(result, Err(BridgeError::NotInitialized { .. })));
        assert!(registry.is_empty());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_publish_and_persist_device() {
        let (registry, store, _rx) = registry();

        registry.add_device(dimmer("DIM01")).await.unwrap();

        assert_eq!(registry.len(), 1);
        let device = registry.device("DIM01").unwrap();
        assert!(device.read(|d| d.was_published()).unwrap());
        let stored = store.load("DIM01").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(json["adress"], "DIM01");
        assert_eq!(json["wasPublished"], true);
    }

    #[tokio::test]
    async fn should_forward_device_events_to_bus() {
        let (registry, _store, mut rx) = registry();
        registry.add_device(dimmer("DIM01")).await.unwrap();

        registry.set_value("DIM01:1", "LEVEL", 0.5).unwrap();

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind, DeviceEventKind::DeviceChannelValueChange);
        assert_eq!(event.device, "DIM01");
        assert_eq!(event.channel, "DIM01:1");
        assert_eq!(event.new_value, ParamValue::Float(0.5));
    }

    #[tokio::test]
    async fn should_forward_controller_updates_with_their_own_kind() {
        let (registry, _store, mut rx) = registry();
        registry.add_device(dimmer("DIM01")).await.unwrap();

        registry
            .update_value("DIM01:1", "WORKING", true, Notify::Always)
            .unwrap();

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind, DeviceEventKind::EventDeviceChannelValueChange);
        assert!(!event.is_upstream());
    }

    #[tokio::test]
    async fn should_stop_forwarding_after_delete() {
        let (registry, store, mut rx) = registry();
        let device = dimmer("DIM01");
        registry.add_device(device.clone()).await.unwrap();

        assert!(registry.delete_device("DIM01").await.unwrap());
        device.set_value("DIM01:1", "LEVEL", 1.0).unwrap();

        assert!(registry.device("DIM01").is_none());
        assert!(store.load("DIM01").await.unwrap().is_none());
        let pending = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(pending.is_err());
    }

    #[tokio::test]
    async fn should_report_deleting_unknown_device() {
        let (registry, _store, _rx) = registry();
        assert!(!registry.delete_device("NOPE").await.unwrap());
    }

    #[tokio::test]
    async fn should_replace_device_at_same_address() {
        let (registry, _store, mut rx) = registry();
        let first = dimmer("DIM01");
        registry.add_device(first.clone()).await.unwrap();
        registry.add_device(dimmer("DIM01")).await.unwrap();

        assert_eq!(registry.len(), 1);
        assert!(!registry.device("DIM01").unwrap().ptr_eq(&first));
        first.set_value("DIM01:1", "LEVEL", 1.0).unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(pending.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn should_keep_one_entry_when_same_address_published_concurrently() {
        let (registry, _store, _rx) = registry();
        let registry = Arc::new(registry);

        for _ in 0..50 {
            let tasks: Vec<_> = (0..8)
                .map(|_| {
                    let registry = Arc::clone(&registry);
                    tokio::spawn(async move { registry.add_device(dimmer("DIM01")).await })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }
            assert_eq!(registry.len(), 1);
        }
    }

    #[tokio::test]
    async fn should_find_devices_with_name_like() {
        let (registry, _store, _rx) = registry();
        for address in ["HMV_001", "HMV_002", "OTHER01"] {
            registry.add_device(dimmer(address)).await.unwrap();
        }

        let found = registry.devices_with_name_like("HMV_");

        let addresses: Vec<_> = found.iter().map(SharedDevice::address).collect();
        assert_eq!(addresses, vec!["HMV_001", "HMV_002"]);
    }

    #[tokio::test]
    async fn should_report_unknown_channel_owner() {
        let (registry, _store, _rx) = registry();
        let result = registry.set_value("NOPE:1", "LEVEL", 0.5);
        assert!(matches!(result, Err(BridgeError::NotFound { address }) if address == "NOPE"));
    }

    #[tokio::test]
    async fn should_list_device_then_channel_descriptions() {
        let (registry, _store, _rx) = registry();
        registry.add_device(dimmer("DIM01")).await.unwrap();

        let descriptions = registry.device_descriptions().unwrap();

        assert_eq!(descriptions.len(), 3);
        assert!(matches!(&descriptions[0], Description::Device(d) if d.address == "DIM01"));
        assert!(matches!(&descriptions[2], Description::Channel(c) if c.address == "DIM01:1"));
        let json = serde_json::to_value(&descriptions).unwrap();
        assert_eq!(json[1]["PARENT"], "DIM01");
    }

    #[tokio::test]
    async fn should_remove_stored_data_without_unpublishing() {
        let (registry, store, _rx) = registry();
        registry.add_device(dimmer("DIM01")).await.unwrap();

        assert!(registry.remove_stored_data("DIM01").await.unwrap());

        assert!(registry.device("DIM01").is_some());
        assert!(store.load("DIM01").await.unwrap().is_none());
        assert!(registry.stored_data("DIM01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn should_persist_current_values() {
        let (registry, _store, _rx) = registry();
        registry.add_device(dimmer("DIM01")).await.unwrap();
        registry.set_value("DIM01:1", "LEVEL", 0.25).unwrap();

        assert_eq!(registry.persist_all().await, 1);

        let stored = registry.stored_data("DIM01").await.unwrap().unwrap();
        let restored = factory()
            .restore_or_create(Some(&stored), "HM-LC-Dim1T-Pl", "DIM01")
            .unwrap();
        assert_eq!(
            restored.get_value("DIM01:1", "LEVEL"),
            Some(&ParamValue::Float(0.25))
        );
    }
}
