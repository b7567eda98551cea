//! Addressable sub-units of a device.
//!
//! A channel owns its parameter sets and turns value writes into
//! [`ChannelEvent`]s. Two write paths exist and must not be confused:
//!
//! - [`Channel::set_value`] is a **local-origin** write: something on this
//!   side changed and the controller must hear about it
//!   ([`ChannelValueChange`](ChannelEventKind::ChannelValueChange)).
//! - [`Channel::update_value`] is a **controller-origin** write: the value is
//!   already known upstream, so it raises at most an
//!   [`EventChannelValueChange`](ChannelEventKind::EventChannelValueChange),
//!   which is never written back to the controller.
//!
//! Both paths have a staged form (`stage_*`) that applies the change and
//! hands back a [`Notification`] to deliver once the caller has released any
//! borrow of the channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::document::{ChannelDefinition, ChannelIndex, StoredChannel};
use crate::error::DeviceError;
use crate::event::{ChannelEvent, ChannelEventKind, INSTALL_TEST, Observers, SubscriptionId};
use crate::parameter::{ParamValue, ParameterDescription};
use crate::paramset::{ParameterSet, VALUES};

/// When a controller-origin write raises an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notify {
    /// Never.
    #[default]
    Silent,
    /// Only if the stored value actually changed.
    OnChange,
    /// Always, even when the value is unchanged.
    Always,
}

/// A change that has been applied but not yet announced.
#[must_use = "a notification does nothing until delivered"]
pub struct Notification {
    observers: Arc<Observers<ChannelEvent>>,
    event: ChannelEvent,
}

impl Notification {
    #[must_use]
    pub fn event(&self) -> &ChannelEvent {
        &self.event
    }

    /// Dispatch the event to the channel's subscribers.
    pub fn deliver(self) {
        self.observers.dispatch(&self.event);
    }
}

impl std::fmt::Debug for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notification")
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

/// Controller-visible description of a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChannelDescription {
    pub address: String,
    pub aes_active: u8,
    pub direction: u32,
    pub flags: u32,
    pub index: ChannelIndex,
    pub link_source_roles: String,
    pub link_target_roles: String,
    pub paramsets: Vec<String>,
    pub parent: String,
    pub parent_type: String,
    #[serde(rename = "TYPE")]
    pub kind: String,
    pub version: u32,
}

/// An addressable sub-unit of a [`Device`](crate::device::Device).
#[derive(Debug)]
pub struct Channel {
    address: String,
    parent_address: String,
    parent_type: String,
    index: ChannelIndex,
    kind: String,
    flags: u32,
    direction: u32,
    version: u32,
    link_source_roles: Option<String>,
    link_target_roles: Option<String>,
    paramsets: Vec<ParameterSet>,
    observers: Arc<Observers<ChannelEvent>>,
}

impl Channel {
    /// Build a channel at `<parent_address>:<index>`.
    ///
    /// # Errors
    ///
    /// Fails when one of the parameter set records is invalid; no partially
    /// built channel is returned.
    pub fn new(
        parent_address: &str,
        parent_type: &str,
        index: ChannelIndex,
        definition: ChannelDefinition,
    ) -> Result<Self, DeviceError> {
        let paramsets = definition
            .paramsets
            .into_iter()
            .map(ParameterSet::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            address: format!("{parent_address}:{index}"),
            parent_address: parent_address.to_string(),
            parent_type: parent_type.to_string(),
            index,
            kind: definition.kind,
            flags: definition.flags,
            direction: definition.direction,
            version: definition.version,
            link_source_roles: definition.link_source_roles,
            link_target_roles: definition.link_target_roles,
            paramsets,
            observers: Arc::new(Observers::new()),
        })
    }

    /// Serialize into the persisted channel shape.
    #[must_use]
    pub fn to_record(&self) -> StoredChannel {
        StoredChannel {
            index: self.index.clone(),
            definition: ChannelDefinition {
                kind: self.kind.clone(),
                flags: self.flags,
                direction: self.direction,
                paramsets: self.paramsets.iter().map(ParameterSet::to_record).collect(),
                version: self.version,
                link_source_roles: self.link_source_roles.clone(),
                link_target_roles: self.link_target_roles.clone(),
            },
        }
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn parent_address(&self) -> &str {
        &self.parent_address
    }

    #[must_use]
    pub fn index(&self) -> &ChannelIndex {
        &self.index
    }

    /// Channel type (`MAINTENANCE`, `KEY`, `DIMMER`, …).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn paramsets(&self) -> impl Iterator<Item = &ParameterSet> {
        self.paramsets.iter()
    }

    /// Register a handler for one of the channel's event kinds.
    pub fn subscribe<F>(&self, kind: ChannelEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Current value of a parameter, searching `VALUES` first.
    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&ParamValue> {
        self.ordered_paramsets()
            .find_map(|set| set.parameter(name))
            .map(crate::parameter::Parameter::value)
    }

    /// Local-origin write, announced as
    /// [`ChannelValueChange`](ChannelEventKind::ChannelValueChange).
    ///
    /// # Errors
    ///
    /// See [`stage_set_value`](Self::stage_set_value).
    pub fn set_value(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
    ) -> Result<(), DeviceError> {
        self.stage_set_value(name, value.into())?.deliver();
        Ok(())
    }

    /// Apply a local-origin write and return the pending announcement.
    ///
    /// `INSTALL_TEST` is a trigger, not a value: nothing is stored and the
    /// announcement is raised whether or not the channel declares it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ParameterNotFound`] for an unknown name and
    /// [`DeviceError::InvalidValue`] when the value cannot be coerced.
    pub fn stage_set_value(
        &mut self,
        name: &str,
        value: ParamValue,
    ) -> Result<Notification, DeviceError> {
        let (new_value, old_value) = if name == INSTALL_TEST {
            (value, None)
        } else {
            let (new_value, old_value) = self.write(name, &value)?;
            (new_value, Some(old_value))
        };
        Ok(self.notification(ChannelEventKind::ChannelValueChange, name, new_value, old_value))
    }

    /// Controller-origin write.
    ///
    /// # Errors
    ///
    /// See [`stage_update_value`](Self::stage_update_value).
    pub fn update_value(
        &mut self,
        name: &str,
        value: impl Into<ParamValue>,
        notify: Notify,
    ) -> Result<(), DeviceError> {
        if let Some(notification) = self.stage_update_value(name, value.into(), notify)? {
            notification.deliver();
        }
        Ok(())
    }

    /// Apply a controller-origin write and return the pending
    /// [`EventChannelValueChange`](ChannelEventKind::EventChannelValueChange),
    /// if `notify` asks for one.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::ParameterNotFound`] for an unknown name and
    /// [`DeviceError::InvalidValue`] when the value cannot be coerced.
    pub fn stage_update_value(
        &mut self,
        name: &str,
        value: ParamValue,
        notify: Notify,
    ) -> Result<Option<Notification>, DeviceError> {
        let (new_value, old_value) = self.write(name, &value)?;
        let raise = match notify {
            Notify::Silent => false,
            Notify::OnChange => new_value != old_value,
            Notify::Always => true,
        };
        Ok(raise.then(|| {
            self.notification(
                ChannelEventKind::EventChannelValueChange,
                name,
                new_value,
                Some(old_value),
            )
        }))
    }

    fn write(
        &mut self,
        name: &str,
        value: &ParamValue,
    ) -> Result<(ParamValue, ParamValue), DeviceError> {
        let position = self
            .paramsets
            .iter()
            .position(|set| set.name() == VALUES && set.parameter(name).is_some())
            .or_else(|| self.paramsets.iter().position(|set| set.parameter(name).is_some()))
            .ok_or_else(|| DeviceError::ParameterNotFound {
                channel: self.address.clone(),
                name: name.to_string(),
            })?;
        let parameter = self.paramsets[position]
            .parameter_mut(name)
            .ok_or_else(|| DeviceError::ParameterNotFound {
                channel: self.address.clone(),
                name: name.to_string(),
            })?;
        let old_value = parameter.set_value(value)?;
        Ok((parameter.value().clone(), old_value))
    }

    fn notification(
        &self,
        kind: ChannelEventKind,
        name: &str,
        new_value: ParamValue,
        old_value: Option<ParamValue>,
    ) -> Notification {
        Notification {
            observers: Arc::clone(&self.observers),
            event: ChannelEvent {
                kind,
                name: name.to_string(),
                new_value,
                old_value,
                channel: self.address.clone(),
            },
        }
    }

    fn ordered_paramsets(&self) -> impl Iterator<Item = &ParameterSet> {
        self.paramsets
            .iter()
            .filter(|set| set.name() == VALUES)
            .chain(self.paramsets.iter().filter(|set| set.name() != VALUES))
    }

    fn find_paramset(&self, name: Option<&str>) -> Option<&ParameterSet> {
        let name = name.unwrap_or(VALUES);
        self.paramsets.iter().find(|set| set.name() == name)
    }

    /// Template identifier of a channel paramset (`None` → `VALUES`).
    #[must_use]
    pub fn paramset_id(&self, name: Option<&str>) -> Option<&str> {
        self.find_paramset(name).map(ParameterSet::paramset_id)
    }

    /// Current values of a channel paramset (`None` → `VALUES`).
    #[must_use]
    pub fn paramset(&self, name: Option<&str>) -> Option<BTreeMap<String, ParamValue>> {
        self.find_paramset(name).map(ParameterSet::paramset)
    }

    /// Metadata of a channel paramset (`None` → `VALUES`).
    #[must_use]
    pub fn paramset_description(
        &self,
        name: Option<&str>,
    ) -> Option<BTreeMap<String, ParameterDescription>> {
        self.find_paramset(name).map(ParameterSet::paramset_description)
    }

    /// Silent bulk write into a channel paramset; returns its new values.
    pub fn put_paramset(
        &mut self,
        name: Option<&str>,
        values: &BTreeMap<String, ParamValue>,
    ) -> Option<BTreeMap<String, ParamValue>> {
        let name = name.unwrap_or(VALUES);
        let set = self.paramsets.iter_mut().find(|set| set.name() == name)?;
        for (key, value) in values {
            set.put_paramset_value(key, value);
        }
        Some(set.paramset())
    }

    /// Controller-visible description record.
    #[must_use]
    pub fn description(&self) -> ChannelDescription {
        ChannelDescription {
            address: self.address.clone(),
            aes_active: 0,
            direction: self.direction,
            flags: self.flags,
            index: self.index.clone(),
            link_source_roles: self.link_source_roles.clone().unwrap_or_default(),
            link_target_roles: self.link_target_roles.clone().unwrap_or_default(),
            paramsets: self.paramsets.iter().map(|s| s.name().to_string()).collect(),
            parent: self.parent_address.clone(),
            parent_type: self.parent_type.clone(),
            kind: self.kind.clone(),
            version: self.version,
        }
    }
}
