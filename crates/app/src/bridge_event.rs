//! Device events as they leave the device model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use hmvirt_domain::event::{DeviceEvent, DeviceEventKind};
use hmvirt_domain::parameter::ParamValue;

/// A device event stamped with the time it was observed, as carried by the
/// event bus to the protocol layer and other listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    pub kind: DeviceEventKind,
    pub device: String,
    pub channel: String,
    pub name: String,
    pub new_value: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<ParamValue>,
    pub timestamp: DateTime<Utc>,
}

impl BridgeEvent {
    /// Whether the controller still has to be told about this change.
    ///
    /// Controller-origin updates are already known upstream.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        self.kind != DeviceEventKind::EventDeviceChannelValueChange
    }
}

impl From<&DeviceEvent> for BridgeEvent {
    fn from(event: &DeviceEvent) -> Self {
        Self {
            kind: event.kind,
            device: event.device.clone(),
            channel: event.channel.clone(),
            name: event.name.clone(),
            new_value: event.new_value.clone(),
            old_value: event.old_value.clone(),
            timestamp: Utc::now(),
        }
    }
}
