//! A single named, typed value with controller-visible metadata.
//!
//! A [`Parameter`] is built from a [`ParameterRecord`], the JSON shape shared
//! by device templates and persisted device documents. Writes go through
//! [`Parameter::set_value`], which coerces the input to the parameter's type
//! and clamps numbers into `min..=max`; input that cannot be coerced is
//! rejected and leaves the stored value untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Value type of a parameter, as named by the controller protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterType {
    Bool,
    Float,
    Integer,
    String,
    Enum,
    Action,
}

impl ParameterType {
    /// Value a parameter of this type holds when neither `value` nor
    /// `default` is given.
    #[must_use]
    pub fn zero_value(self) -> ParamValue {
        match self {
            Self::Bool | Self::Action => ParamValue::Bool(false),
            Self::Integer | Self::Enum => ParamValue::Integer(0),
            Self::Float => ParamValue::Float(0.0),
            Self::String => ParamValue::String(String::new()),
        }
    }

    /// Whether `min`/`max` apply to this type.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Float | Self::Integer | Self::Enum)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Float => "FLOAT",
            Self::Integer => "INTEGER",
            Self::String => "STRING",
            Self::Enum => "ENUM",
            Self::Action => "ACTION",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOL" => Ok(Self::Bool),
            "FLOAT" => Ok(Self::Float),
            "INTEGER" => Ok(Self::Integer),
            "STRING" => Ok(Self::String),
            "ENUM" => Ok(Self::Enum),
            "ACTION" => Ok(Self::Action),
            other => Err(DeviceError::UnknownParameterType(other.to_string())),
        }
    }
}

/// A JSON-native parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) if f.is_finite() => Some(*f),
            Self::Float(_) => None,
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::Float(f) => Some(*f != 0.0),
            Self::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "on" => Some(true),
                "false" | "0" | "off" | "" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Integer(i) => i.fmt(f),
            Self::Float(v) => v.fmt(f),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Bitmask of the operations a controller may perform on a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operations(u8);

impl Operations {
    pub const READ: Self = Self(1);
    pub const WRITE: Self = Self(2);
    pub const EVENT: Self = Self(4);

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Operations {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// JSON shape of a parameter inside templates and persisted documents.
///
/// Keys the model does not interpret are kept in `extra` and written back
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<ParamValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub operations: Operations,
    #[serde(default)]
    pub flags: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Full metadata of a parameter in the shape of a controller
/// `getParamsetDescription` reply entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ParameterDescription {
    pub id: String,
    #[serde(rename = "TYPE")]
    pub kind: ParameterType,
    pub operations: Operations,
    pub flags: u32,
    pub default: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<ParamValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<ParamValue>,
    pub unit: String,
    pub tab_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<serde_json::Value>,
}

/// A named, typed value with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    kind: ParameterType,
    value: ParamValue,
    default: ParamValue,
    min: Option<ParamValue>,
    max: Option<ParamValue>,
    unit: String,
    operations: Operations,
    flags: u32,
    tab_order: i64,
    control: Option<String>,
    value_list: Option<Vec<String>>,
    special: Option<serde_json::Value>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl Parameter {
    /// Build a parameter from its template or stored record.
    ///
    /// A stored `value` or `default` that does not fit the type falls back to
    /// the next candidate (`value` → `default` → the type's zero value).
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnknownParameterType`] when `type` is not one of
    /// the supported names.
    pub fn from_record(record: ParameterRecord) -> Result<Self, DeviceError> {
        let kind: ParameterType = record.kind.parse()?;
        let (min, max) = if kind.is_numeric() {
            (record.min, record.max)
        } else {
            (None, None)
        };
        let mut parameter = Self {
            name: record.name,
            kind,
            value: kind.zero_value(),
            default: kind.zero_value(),
            min,
            max,
            unit: record.unit.unwrap_or_default(),
            operations: record.operations,
            flags: record.flags,
            tab_order: record.tab_order.unwrap_or_default(),
            control: record.control,
            value_list: record.value_list,
            special: record.special,
            extra: record.extra,
        };
        if let Some(default) = record.default.and_then(|d| parameter.coerce(&d)) {
            parameter.default = default;
        }
        parameter.value = record
            .value
            .and_then(|v| parameter.coerce(&v))
            .unwrap_or_else(|| parameter.default.clone());
        Ok(parameter)
    }

    /// Shorthand for a parameter of the given type with default metadata.
    ///
    /// # Errors
    ///
    /// Never fails for the types enumerated by [`ParameterType`]; the result
    /// mirrors [`from_record`](Self::from_record).
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Result<Self, DeviceError> {
        Self::from_record(ParameterRecord {
            name: name.into(),
            kind: kind.to_string(),
            value: None,
            default: None,
            min: None,
            max: None,
            unit: None,
            operations: Operations::READ | Operations::WRITE | Operations::EVENT,
            flags: 1,
            tab_order: None,
            control: None,
            value_list: None,
            special: None,
            extra: serde_json::Map::new(),
        })
    }

    /// Serialize back into a record carrying the current value.
    #[must_use]
    pub fn to_record(&self) -> ParameterRecord {
        ParameterRecord {
            name: self.name.clone(),
            kind: self.kind.to_string(),
            value: Some(self.value.clone()),
            default: Some(self.default.clone()),
            min: self.min.clone(),
            max: self.max.clone(),
            unit: Some(self.unit.clone()),
            operations: self.operations,
            flags: self.flags,
            tab_order: Some(self.tab_order),
            control: self.control.clone(),
            value_list: self.value_list.clone(),
            special: self.special.clone(),
            extra: self.extra.clone(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    #[must_use]
    pub fn value(&self) -> &ParamValue {
        &self.value
    }

    #[must_use]
    pub fn default_value(&self) -> &ParamValue {
        &self.default
    }

    #[must_use]
    pub fn operations(&self) -> Operations {
        self.operations
    }

    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Write a new value, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::InvalidValue`] when `value` cannot be coerced
    /// to the parameter's type; the stored value is left unchanged.
    pub fn set_value(&mut self, value: &ParamValue) -> Result<ParamValue, DeviceError> {
        let coerced = self
            .coerce(value)
            .ok_or_else(|| DeviceError::InvalidValue(self.name.clone()))?;
        Ok(std::mem::replace(&mut self.value, coerced))
    }

    /// Convert `value` to this parameter's type and range without storing it.
    #[must_use]
    pub fn coerce(&self, value: &ParamValue) -> Option<ParamValue> {
        match self.kind {
            ParameterType::Bool | ParameterType::Action => value.as_bool().map(ParamValue::Bool),
            ParameterType::Float => value
                .as_f64()
                .map(|v| ParamValue::Float(self.clamp(v))),
            #[allow(clippy::cast_possible_truncation)]
            ParameterType::Integer | ParameterType::Enum => value
                .as_f64()
                .map(|v| ParamValue::Integer(self.clamp(v.trunc()) as i64)),
            ParameterType::String => Some(match value {
                ParamValue::String(s) => ParamValue::String(s.clone()),
                other => ParamValue::String(other.to_string()),
            }),
        }
    }

    fn clamp(&self, value: f64) -> f64 {
        let mut min = self.min.as_ref().and_then(ParamValue::as_f64);
        let mut max = self.max.as_ref().and_then(ParamValue::as_f64);
        if self.kind == ParameterType::Enum
            && min.is_none()
            && max.is_none()
            && let Some(list) = self.value_list.as_ref().filter(|l| !l.is_empty())
        {
            #[allow(clippy::cast_precision_loss)]
            let last = (list.len() - 1) as f64;
            min = Some(0.0);
            max = Some(last);
        }
        let value = min.map_or(value, |m| value.max(m));
        max.map_or(value, |m| value.min(m))
    }

    /// Metadata record for `getParamsetDescription`.
    #[must_use]
    pub fn description(&self) -> ParameterDescription {
        ParameterDescription {
            id: self.name.clone(),
            kind: self.kind,
            operations: self.operations,
            flags: self.flags,
            default: self.default.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            unit: self.unit.clone(),
            tab_order: self.tab_order,
            control: self.control.clone(),
            value_list: self.value_list.clone(),
            special: self.special.clone(),
        }
    }
}
