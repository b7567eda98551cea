//! [`PluginContext`] backed by the [`DeviceRegistry`].

use crate::error::BridgeError;
use crate::ports::{DeviceStore, PluginContext};
use crate::services::device_registry::DeviceRegistry;
use crate::shared_device::SharedDevice;

impl<S> PluginContext for DeviceRegistry<S>
where
    S: DeviceStore + Send + Sync + 'static,
{
    async fn add_device(&self, device: SharedDevice) -> Result<(), BridgeError> {
        DeviceRegistry::add_device(self, device).await
    }

    async fn delete_device(&self, address: &str) -> Result<bool, BridgeError> {
        DeviceRegistry::delete_device(self, address).await
    }

    fn devices_with_name_like(&self, prefix: &str) -> Vec<SharedDevice> {
        DeviceRegistry::devices_with_name_like(self, prefix)
    }

    async fn stored_data(&self, address: &str) -> Result<Option<String>, BridgeError> {
        DeviceRegistry::stored_data(self, address).await
    }

    async fn remove_stored_data(&self, address: &str) -> Result<bool, BridgeError> {
        DeviceRegistry::remove_stored_data(self, address).await
    }

    async fn persist(&self, address: &str) -> Result<(), BridgeError> {
        DeviceRegistry::persist(self, address).await
    }
}
