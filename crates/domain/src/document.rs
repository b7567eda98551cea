//! JSON schemas of device templates and persisted device documents.
//!
//! Templates are the static description of a device type
//! (`<type>.json`); persisted documents are produced by
//! [`Device::save_persistent`](crate::device::Device::save_persistent) and
//! consumed by the restore path. The persisted address key keeps its legacy
//! spelling (`adress`) so existing documents stay readable.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::paramset::ParamsetRecord;

/// Position of a channel inside its device.
///
/// The label is what appears after the `:` in the channel address. A numeric
/// value is parsed once at construction so lookups never coerce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIndex {
    label: String,
    number: Option<u32>,
}

impl ChannelIndex {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn number(&self) -> Option<u32> {
        self.number
    }
}

impl From<u32> for ChannelIndex {
    fn from(value: u32) -> Self {
        Self {
            label: value.to_string(),
            number: Some(value),
        }
    }
}

impl From<&str> for ChannelIndex {
    fn from(value: &str) -> Self {
        Self {
            label: value.to_string(),
            number: value.trim().parse().ok(),
        }
    }
}

impl fmt::Display for ChannelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawIndex {
    Number(u32),
    Text(String),
}

impl Serialize for ChannelIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.number {
            Some(n) if n.to_string() == self.label => RawIndex::Number(n).serialize(serializer),
            _ => serializer.serialize_str(&self.label),
        }
    }
}

impl<'de> Deserialize<'de> for ChannelIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawIndex::deserialize(deserializer)? {
            RawIndex::Number(n) => Self::from(n),
            RawIndex::Text(s) => Self::from(s.as_str()),
        })
    }
}

/// Channel address field of a template: one index, or a list fanned out
/// into one channel per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelAddress {
    One(ChannelIndex),
    Many(Vec<ChannelIndex>),
}

impl ChannelAddress {
    #[must_use]
    pub fn into_indices(self) -> Vec<ChannelIndex> {
        match self {
            Self::One(index) => vec![index],
            Self::Many(indices) => indices,
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Per-channel fields shared by templates and persisted documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub direction: u32,
    #[serde(default)]
    pub paramsets: Vec<ParamsetRecord>,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_source_roles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target_roles: Option<String>,
}

/// One channel entry of a device template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTemplate {
    #[serde(alias = "adress")]
    pub address: ChannelAddress,
    #[serde(flatten)]
    pub definition: ChannelDefinition,
}

/// Static description of a device type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTemplate {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub channels: Vec<ChannelTemplate>,
    pub paramsets: Vec<ParamsetRecord>,
}

/// One channel entry of a persisted device, already expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChannel {
    pub index: ChannelIndex,
    #[serde(flatten)]
    pub definition: ChannelDefinition,
}

/// Persisted device document.
///
/// Every field is optional on input so that an incomplete document is
/// reported as a restore failure instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, rename = "adress", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<StoredChannel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paramsets: Option<Vec<ParamsetRecord>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_parse_single_numeric_address() {
        let channel: ChannelTemplate = serde_json::from_value(serde_json::json!({
            "adress": 0,
            "type": "MAINTENANCE"
        }))
        .unwrap();
        assert_eq!(channel.address, ChannelAddress::One(ChannelIndex::from(0u32)));
        assert_eq!(channel.definition.version, 1);
    }

    #[test]
    fn should_parse_address_list() {
        let channel: ChannelTemplate = serde_json::from_value(serde_json::json!({
            "address": ["AA", "BB"],
            "type": "KEY"
        }))
        .unwrap();
        let indices = channel.address.into_indices();
        assert_eq!(indices.len(), 2);
        assert_eq!(indices[0].label(), "AA");
        assert_eq!(indices[0].number(), None);
    }

    #[test]
    fn should_parse_numeric_string_index() {
        let index: ChannelIndex = serde_json::from_value(serde_json::json!("3")).unwrap();
        assert_eq!(index.number(), Some(3));
    }

    #[test]
    fn should_serialize_numeric_index_as_number() {
        assert_eq!(serde_json::to_value(ChannelIndex::from(4u32)).unwrap(), 4);
        assert_eq!(serde_json::to_value(ChannelIndex::from("AA")).unwrap(), "AA");
    }

    #[test]
    fn should_use_legacy_address_key_in_stored_document() {
        let stored = StoredDevice {
            address: Some("VIR001".to_string()),
            serial_number: Some("VIR001".to_string()),
            ..StoredDevice::default()
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["adress"], "VIR001");
        assert_eq!(json["serialNumber"], "VIR001");
        assert!(json.get("address").is_none());
    }

    #[test]
    fn should_accept_incomplete_stored_document() {
        let stored: StoredDevice =
            serde_json::from_str(r#"{"serialNumber":"X","type":"HM-RC-19"}"#).unwrap();
        assert!(stored.address.is_none());
        assert!(stored.channels.is_none());
    }
}
