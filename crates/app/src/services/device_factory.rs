//! Device factory: builds devices from injected templates or stored
//! documents.

use hmvirt_domain::device::Device;
use hmvirt_domain::template::TemplateSource;

use crate::error::BridgeError;

/// Builds [`Device`]s from an injected template source.
#[derive(Debug, Clone)]
pub struct DeviceFactory<T> {
    templates: T,
    owner: Option<String>,
}

impl<T: TemplateSource> DeviceFactory<T> {
    /// Create a factory reading shared templates only.
    pub fn new(templates: T) -> Self {
        Self {
            templates,
            owner: None,
        }
    }

    /// A factory for `owner` that prefers `<type>_<owner>` templates.
    #[must_use]
    pub fn for_owner(&self, owner: impl Into<String>) -> Self
    where
        T: Clone,
    {
        Self {
            templates: self.templates.clone(),
            owner: Some(owner.into()),
        }
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Build a fresh device from the template of `device_type`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Device`] when the template is missing or
    /// malformed. This is a configuration error for the calling plugin.
    #[tracing::instrument(skip(self), fields(owner = ?self.owner))]
    pub fn create(&self, device_type: &str, address: &str) -> Result<Device, BridgeError> {
        let mut device = Device::new(self.owner.as_deref());
        if let Err(err) = device.try_init_with_type(&self.templates, device_type, address) {
            tracing::error!(error = %err, "device template unusable");
            return Err(err.into());
        }
        Ok(device)
    }

    /// Restore a device from its stored document, or build a fresh one when
    /// there is none or it cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Device`] when the fallback template build fails.
    #[tracing::instrument(skip(self, stored), fields(owner = ?self.owner))]
    pub fn restore_or_create(
        &self,
        stored: Option<&str>,
        device_type: &str,
        address: &str,
    ) -> Result<Device, BridgeError> {
        if let Some(stored) = stored {
            let mut device = Device::new(self.owner.as_deref());
            if device.init_with_stored_data(stored) {
                tracing::debug!(address = %device.address(), "device restored");
                return Ok(device);
            }
        }
        self.create(device_type, address)
    }
}
