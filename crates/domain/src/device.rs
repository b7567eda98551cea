//! The top-level emulated entity exposed to the controller.
//!
//! A [`Device`] starts uninitialized and is built exactly once, either from
//! a device type template ([`Device::init_with_type`]) or from a document it
//! previously produced ([`Device::init_with_stored_data`]). A failed build
//! leaves it uninitialized for good; the owner discards it and, after a
//! failed restore, builds a fresh one from the template instead.
//!
//! Channel events are re-emitted at device scope with the device address
//! injected when they fire (see [`DeviceEvent`]), so channels registered
//! before the build report the address the build assigns.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::channel::{Channel, ChannelDescription, Notification, Notify};
use crate::document::{ChannelIndex, DeviceTemplate, StoredDevice};
use crate::error::DeviceError;
use crate::event::{
    ChannelEventKind, DeviceEvent, DeviceEventKind, INSTALL_TEST, Observers, SubscriptionId,
};
use crate::parameter::{ParamValue, ParameterDescription};
use crate::paramset::{LINK, MASTER, ParameterSet};
use crate::template::{self, TemplateSource};

/// Type of the status channel every device carries at index 0.
pub const MAINTENANCE: &str = "MAINTENANCE";

/// Status flags cleared whenever a device comes (back) online.
pub const MAINTENANCE_FLAGS: [&str; 4] = ["LOWBAT", "CONFIG_PENDING", "STICKY_UNREACH", "UNREACH"];

/// Interface name reported in device descriptions.
pub const DEFAULT_INTERFACE: &str = "HVL;";

const DEFAULT_FIRMWARE: &str = "1.0";

/// Normalize a backend identifier into a controller address: spaces become
/// `_` and `:` is dropped.
#[must_use]
pub fn sanitize_address(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != ':')
        .map(|c| if c == ' ' { '_' } else { c })
        .collect()
}

/// Controller-visible description of a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct DeviceDescription {
    pub address: String,
    pub children: Vec<String>,
    pub firmware: String,
    pub flags: u32,
    pub interface: String,
    pub paramsets: Vec<String>,
    pub parent: Option<String>,
    pub rf_address: u32,
    pub roaming: u32,
    pub rx_mode: u32,
    #[serde(rename = "TYPE")]
    pub kind: String,
    pub updatable: u32,
    pub version: u32,
}

/// An emulated device: channels, device-level parameter sets and the
/// event fan-out to external subscribers.
#[derive(Debug)]
pub struct Device {
    owner: Option<String>,
    address: Arc<OnceLock<String>>,
    serial_number: String,
    kind: String,
    firmware: String,
    version: u32,
    interface_name: String,
    channels: Vec<Channel>,
    paramsets: Vec<ParameterSet>,
    initialized: bool,
    was_published: bool,
    observers: Arc<Observers<DeviceEvent>>,
}

impl Default for Device {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Device {
    /// Create an uninitialized device. `owner` selects owner-scoped
    /// templates (`<type>_<owner>`).
    #[must_use]
    pub fn new(owner: Option<&str>) -> Self {
        Self {
            owner: owner.map(str::to_string),
            address: Arc::new(OnceLock::new()),
            serial_number: String::new(),
            kind: String::new(),
            firmware: DEFAULT_FIRMWARE.to_string(),
            version: 1,
            interface_name: DEFAULT_INTERFACE.to_string(),
            channels: Vec::new(),
            paramsets: Vec::new(),
            initialized: false,
            was_published: false,
            observers: Arc::new(Observers::new()),
        }
    }

    /// Build from the template of `device_type`.
    ///
    /// Failures are logged and reported as `false`; the device then stays
    /// uninitialized.
    pub fn init_with_type<S>(&mut self, templates: &S, device_type: &str, address: &str) -> bool
    where
        S: TemplateSource + ?Sized,
    {
        match self.try_init_with_type(templates, device_type, address) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    %device_type,
                    %address,
                    "device template unusable, giving up on this device"
                );
                false
            }
        }
    }

    /// Build from the template of `device_type`, returning the failure.
    ///
    /// Each channel entry whose address is a list is fanned out into one
    /// channel per entry. Once built, the maintenance channel's status flags
    /// are cleared through the local-origin path so subscribers see the
    /// device announce a clean status.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::AlreadyInitialized`], a template lookup error,
    /// [`DeviceError::Parse`] for malformed JSON, or a structural error from
    /// channel/paramset construction.
    pub fn try_init_with_type<S>(
        &mut self,
        templates: &S,
        device_type: &str,
        address: &str,
    ) -> Result<(), DeviceError>
    where
        S: TemplateSource + ?Sized,
    {
        if self.initialized {
            return Err(DeviceError::AlreadyInitialized);
        }
        tracing::debug!(%device_type, owner = ?self.owner, "init with type");
        let address = sanitize_address(address);
        let resolved = template::resolve(templates, device_type, self.owner.as_deref())?;
        tracing::debug!(template = %resolved.name, "template found");
        let template: DeviceTemplate = serde_json::from_str(&resolved.content)?;

        let mut channels = Vec::new();
        for entry in template.channels {
            for index in entry.address.into_indices() {
                channels.push(Channel::new(
                    &address,
                    &template.kind,
                    index,
                    entry.definition.clone(),
                )?);
            }
        }
        let paramsets = template
            .paramsets
            .into_iter()
            .map(ParameterSet::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_addresses(self.channels.iter().chain(&channels))?;

        self.assign_address(&address)?;
        self.serial_number = address;
        self.kind = template.kind;
        self.version = template.version;
        for channel in channels {
            self.attach_channel(channel);
        }
        self.paramsets = paramsets;

        if let Some(maintenance) = self.channel_with_type_and_index_mut(MAINTENANCE, 0u32) {
            for flag in MAINTENANCE_FLAGS {
                if let Err(err) = maintenance.set_value(flag, false) {
                    tracing::debug!(error = %err, %flag, "maintenance flag not reset");
                }
            }
        }

        self.initialized = true;
        tracing::debug!(address = %self.address(), channels = self.channels.len(), "device init completed");
        Ok(())
    }

    /// Rebuild from a document produced by [`save_persistent`](Self::save_persistent).
    ///
    /// Returns `false` when the document is unusable; the caller should then
    /// build a fresh device with [`init_with_type`](Self::init_with_type).
    pub fn init_with_stored_data(&mut self, stored: &str) -> bool {
        match self.try_init_with_stored_data(stored) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(
                    error = %err,
                    "cannot restore device from stored data, a fresh one will be built"
                );
                false
            }
        }
    }

    /// Rebuild from a persisted document, returning the failure.
    ///
    /// The maintenance flags are cleared through the controller-origin path
    /// without notification: a restore must not look like live changes.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::MissingField`] when `serialNumber`, `adress` or
    /// `channels` is absent, [`DeviceError::Parse`] for malformed JSON, or a
    /// structural error from channel/paramset construction.
    pub fn try_init_with_stored_data(&mut self, stored: &str) -> Result<(), DeviceError> {
        if self.initialized {
            return Err(DeviceError::AlreadyInitialized);
        }
        tracing::debug!("init with stored data");
        let stored: StoredDevice = serde_json::from_str(stored)?;
        let serial_number = stored
            .serial_number
            .as_deref()
            .map(sanitize_address)
            .ok_or(DeviceError::MissingField("serialNumber"))?;
        let address = stored
            .address
            .as_deref()
            .map(sanitize_address)
            .ok_or(DeviceError::MissingField("adress"))?;
        let stored_channels = stored.channels.ok_or(DeviceError::MissingField("channels"))?;
        let kind = stored.kind.unwrap_or_default();

        let channels = stored_channels
            .into_iter()
            .map(|c| Channel::new(&address, &kind, c.index, c.definition))
            .collect::<Result<Vec<_>, _>>()?;
        let paramsets = stored
            .paramsets
            .unwrap_or_default()
            .into_iter()
            .map(ParameterSet::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique_addresses(self.channels.iter().chain(&channels))?;

        self.assign_address(&address)?;
        self.serial_number = serial_number;
        self.kind = kind;
        if let Some(firmware) = stored.firmware {
            self.firmware = firmware;
        }
        if let Some(version) = stored.version {
            self.version = version;
        }
        if let Some(interface_name) = stored.interface_name {
            self.interface_name = interface_name;
        }
        self.was_published = stored.was_published.unwrap_or(false);
        for channel in channels {
            self.attach_channel(channel);
        }
        self.paramsets = paramsets;

        if let Some(maintenance) = self.channel_with_type_and_index_mut(MAINTENANCE, 0u32) {
            tracing::debug!("clearing maintenance flags");
            for flag in MAINTENANCE_FLAGS {
                if let Err(err) = maintenance.update_value(flag, false, Notify::Silent) {
                    tracing::debug!(error = %err, %flag, "maintenance flag not reset");
                }
            }
        } else {
            tracing::warn!(address = %self.address(), "maintenance channel not found");
        }

        self.initialized = true;
        Ok(())
    }

    /// Register a channel and re-emit its events at device scope.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::DuplicateChannel`] when a channel with the same
    /// address is already registered.
    pub fn add_channel(&mut self, channel: Channel) -> Result<(), DeviceError> {
        if self.channel(channel.address()).is_some() {
            return Err(DeviceError::DuplicateChannel(channel.address().to_string()));
        }
        self.attach_channel(channel);
        Ok(())
    }

    fn assign_address(&self, address: &str) -> Result<(), DeviceError> {
        self.address
            .set(address.to_string())
            .map_err(|_| DeviceError::AlreadyInitialized)
    }

    fn attach_channel(&mut self, channel: Channel) {
        for kind in [
            ChannelEventKind::ChannelValueChange,
            ChannelEventKind::EventChannelValueChange,
        ] {
            let observers = Arc::clone(&self.observers);
            let device = Arc::clone(&self.address);
            channel.subscribe(kind, move |event| {
                let address = device.get().map_or("", String::as_str);
                let lifted = DeviceEvent::from_channel(event, address);
                if lifted.kind == DeviceEventKind::DeviceChannelInstallTest {
                    tracing::info!(channel = %event.channel, "install test");
                } else {
                    tracing::debug!(name = %event.name, channel = %event.channel, "channel value event");
                }
                observers.dispatch(&lifted);
            });
        }
        self.channels.push(channel);
    }

    /// Register a handler for one of the device's event kinds.
    pub fn subscribe<F>(&self, kind: DeviceEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    #[must_use]
    pub fn channel(&self, address: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.address() == address)
    }

    pub fn channel_mut(&mut self, address: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.address() == address)
    }

    /// Find a channel by type and index. A numeric index (or numeric string)
    /// is compared numerically; anything else by label.
    #[must_use]
    pub fn channel_with_type_and_index(
        &self,
        kind: &str,
        index: impl Into<ChannelIndex>,
    ) -> Option<&Channel> {
        let index = index.into();
        self.channels
            .iter()
            .find(|c| c.kind() == kind && index_matches(c.index(), &index))
    }

    pub fn channel_with_type_and_index_mut(
        &mut self,
        kind: &str,
        index: impl Into<ChannelIndex>,
    ) -> Option<&mut Channel> {
        let index = index.into();
        self.channels
            .iter_mut()
            .find(|c| c.kind() == kind && index_matches(c.index(), &index))
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn paramsets(&self) -> impl Iterator<Item = &ParameterSet> {
        self.paramsets.iter()
    }

    /// Value of a parameter on one of this device's channels.
    #[must_use]
    pub fn get_value(&self, channel: &str, name: &str) -> Option<&ParamValue> {
        self.channel(channel)?.get_value(name)
    }

    /// Local-origin write on one of this device's channels.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ChannelNotFound`] or the channel's write error.
    pub fn set_value(
        &mut self,
        channel: &str,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), DeviceError> {
        self.stage_set_value(channel, name, value.into())?.deliver();
        Ok(())
    }

    /// Apply a local-origin write and return the pending announcement.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ChannelNotFound`] or the channel's write error.
    pub fn stage_set_value(
        &mut self,
        channel: &str,
        name: &str,
        value: ParamValue,
    ) -> Result<Notification, DeviceError> {
        self.channel_mut(channel)
            .ok_or_else(|| DeviceError::ChannelNotFound(channel.to_string()))?
            .stage_set_value(name, value)
    }

    /// Controller-origin write on one of this device's channels.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ChannelNotFound`] or the channel's write error.
    pub fn update_value(
        &mut self,
        channel: &str,
        name: &str,
        value: impl Into<ParamValue>,
        notify: Notify,
    ) -> Result<(), DeviceError> {
        if let Some(notification) = self.stage_update_value(channel, name, value.into(), notify)? {
            notification.deliver();
        }
        Ok(())
    }

    /// Apply a controller-origin write and return the pending event, if any.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ChannelNotFound`] or the channel's write error.
    pub fn stage_update_value(
        &mut self,
        channel: &str,
        name: &str,
        value: ParamValue,
        notify: Notify,
    ) -> Result<Option<Notification>, DeviceError> {
        self.channel_mut(channel)
            .ok_or_else(|| DeviceError::ChannelNotFound(channel.to_string()))?
            .stage_update_value(name, value, notify)
    }

    /// Clear `CONFIG_PENDING` on the maintenance channel (local origin).
    /// Returns whether the maintenance channel exists.
    pub fn reset_config_pending(&mut self) -> bool {
        let Some(maintenance) = self.channel_with_type_and_index_mut(MAINTENANCE, 0u32) else {
            return false;
        };
        tracing::debug!("reset config pending");
        if let Err(err) = maintenance.set_value("CONFIG_PENDING", false) {
            tracing::debug!(error = %err, "CONFIG_PENDING not reset");
        }
        true
    }

    /// Controller-visible description record.
    #[must_use]
    pub fn description(&self) -> DeviceDescription {
        DeviceDescription {
            address: self.address().to_string(),
            children: self.channels.iter().map(|c| c.address().to_string()).collect(),
            firmware: self.firmware.clone(),
            flags: 1,
            interface: self.interface_name.clone(),
            paramsets: self.paramsets.iter().map(|s| s.name().to_string()).collect(),
            parent: None,
            rf_address: 0,
            roaming: 0,
            rx_mode: 1,
            kind: self.kind.clone(),
            updatable: 1,
            version: self.version,
        }
    }

    /// Descriptions of all channels, in registration order.
    #[must_use]
    pub fn channel_descriptions(&self) -> Vec<ChannelDescription> {
        self.channels.iter().map(Channel::description).collect()
    }

    /// Map a requested paramset name onto a device-level set name:
    /// none → `MASTER`, the device's own address → `LINK`.
    #[must_use]
    pub fn resolve_paramset_name<'a>(&self, name: Option<&'a str>) -> &'a str {
        match name {
            None => MASTER,
            Some(n) if n == self.address() => LINK,
            Some(n) => n,
        }
    }

    fn find_paramset(&self, name: Option<&str>) -> Option<&ParameterSet> {
        let name = self.resolve_paramset_name(name);
        self.paramsets.iter().find(|s| s.name() == name)
    }

    #[must_use]
    pub fn paramset_id(&self, name: Option<&str>) -> Option<&str> {
        self.find_paramset(name).map(ParameterSet::paramset_id)
    }

    #[must_use]
    pub fn paramset(&self, name: Option<&str>) -> Option<BTreeMap<String, ParamValue>> {
        self.find_paramset(name).map(ParameterSet::paramset)
    }

    #[must_use]
    pub fn paramset_description(
        &self,
        name: Option<&str>,
    ) -> Option<BTreeMap<String, ParameterDescription>> {
        self.find_paramset(name).map(ParameterSet::paramset_description)
    }

    /// Best-effort bulk write into a device-level set; returns its new values.
    pub fn put_paramset(
        &mut self,
        name: Option<&str>,
        values: &BTreeMap<String, ParamValue>,
    ) -> Option<BTreeMap<String, ParamValue>> {
        let name = self.resolve_paramset_name(name);
        let set = self.paramsets.iter_mut().find(|s| s.name() == name)?;
        for (key, value) in values {
            set.put_paramset_value(key, value);
        }
        Some(set.paramset())
    }

    /// The persisted form of this device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotInitialized`] for a device that was never
    /// built.
    pub fn to_document(&self) -> Result<StoredDevice, DeviceError> {
        if !self.initialized {
            return Err(DeviceError::NotInitialized);
        }
        Ok(StoredDevice {
            serial_number: Some(self.serial_number.clone()),
            address: Some(self.address().to_string()),
            firmware: Some(self.firmware.clone()),
            kind: Some(self.kind.clone()),
            version: Some(self.version),
            was_published: Some(self.was_published),
            interface_name: Some(self.interface_name.clone()),
            channels: Some(self.channels.iter().map(Channel::to_record).collect()),
            paramsets: Some(self.paramsets.iter().map(ParameterSet::to_record).collect()),
        })
    }

    /// Serialize the whole device into a document accepted by
    /// [`init_with_stored_data`](Self::init_with_stored_data).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::NotInitialized`] for a device that was never
    /// built.
    pub fn save_persistent(&self) -> Result<String, DeviceError> {
        Ok(serde_json::to_string(&self.to_document()?)?)
    }

    #[must_use]
    pub fn address(&self) -> &str {
        self.address.get().map_or("", String::as_str)
    }

    #[must_use]
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Device type (`HM-RC-19`, …).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    #[must_use]
    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn set_interface_name(&mut self, name: impl Into<String>) {
        self.interface_name = name.into();
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn was_published(&self) -> bool {
        self.was_published
    }

    /// Record that the device has been exposed to the controller.
    pub fn mark_published(&mut self) {
        self.was_published = true;
    }
}

fn index_matches(candidate: &ChannelIndex, wanted: &ChannelIndex) -> bool {
    match wanted.number() {
        Some(n) => candidate.number() == Some(n),
        None => candidate.label() == wanted.label(),
    }
}

fn ensure_unique_addresses<'a>(
    channels: impl IntoIterator<Item = &'a Channel>,
) -> Result<(), DeviceError> {
    let mut seen = HashSet::new();
    for channel in channels {
        if !seen.insert(channel.address()) {
            return Err(DeviceError::DuplicateChannel(channel.address().to_string()));
        }
    }
    Ok(())
}
