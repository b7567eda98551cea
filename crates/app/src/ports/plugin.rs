//! Plugin port: lifecycle of the backends that publish virtual devices.
//!
//! A plugin bridges an external system (scenes, lights, media players, …)
//! into the controller. It builds devices through a
//! [`DeviceFactory`](crate::services::device_factory::DeviceFactory) handed
//! to it at construction, publishes them through the [`PluginContext`] and
//! reacts to their events.

use std::future::Future;

use crate::error::BridgeError;
use crate::shared_device::SharedDevice;

/// What a plugin may do with the registry of published devices.
///
/// Implemented by
/// [`DeviceRegistry`](crate::services::device_registry::DeviceRegistry).
pub trait PluginContext: Send + Sync {
    /// Publish an initialized device to the controller and persist it.
    fn add_device(
        &self,
        device: SharedDevice,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Unpublish a device and drop its stored document.
    fn delete_device(&self, address: &str)
    -> impl Future<Output = Result<bool, BridgeError>> + Send;

    /// Published devices whose address starts with `prefix`.
    fn devices_with_name_like(&self, prefix: &str) -> Vec<SharedDevice>;

    /// The stored document of a device, used to restore it on startup.
    fn stored_data(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<Option<String>, BridgeError>> + Send;

    /// Forget the stored document of a device without unpublishing it.
    fn remove_stored_data(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<bool, BridgeError>> + Send;

    /// Write the current state of a published device to storage.
    fn persist(&self, address: &str) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// A pluggable device backend.
///
/// The binary crate calls the lifecycle methods in order:
///
/// 1. [`setup`](Self::setup): build, restore and publish devices
/// 2. (the bridge runs, devices raise events the plugin reacts to)
/// 3. [`teardown`](Self::teardown): persist state and release resources
pub trait Plugin {
    /// Unique name identifying this plugin (e.g. `"virtual"`).
    fn name(&self) -> &'static str;

    /// Build and publish the plugin's devices.
    fn setup(
        &mut self,
        ctx: &impl PluginContext,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;

    /// Called on graceful shutdown.
    fn teardown(
        &mut self,
        ctx: &impl PluginContext,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}
