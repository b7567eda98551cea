//! Named, ordered groups of parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::parameter::{ParamValue, Parameter, ParameterDescription, ParameterRecord};

/// Conventional set holding persisted configuration.
pub const MASTER: &str = "MASTER";
/// Conventional set holding live state.
pub const VALUES: &str = "VALUES";
/// Conventional set holding peer-specific configuration.
pub const LINK: &str = "LINK";

/// JSON shape of a parameter set inside templates and persisted documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsetRecord {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub parameter: Vec<ParameterRecord>,
}

/// A named collection of [`Parameter`]s, unique by name, in template order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    name: String,
    id: String,
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Create an empty set.
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            parameters: Vec::new(),
        }
    }

    /// Build a fully populated set from its record.
    ///
    /// Either every parameter of the record is present in the result, or an
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Fails on an unknown parameter type or a duplicate parameter name.
    pub fn from_record(record: ParamsetRecord) -> Result<Self, DeviceError> {
        let mut set = Self::new(record.name, record.id);
        for parameter in record.parameter {
            set.add_parameter(Parameter::from_record(parameter)?)?;
        }
        Ok(set)
    }

    /// Serialize back into a record carrying current values.
    #[must_use]
    pub fn to_record(&self) -> ParamsetRecord {
        ParamsetRecord {
            name: self.name.clone(),
            id: self.id.clone(),
            parameter: self.parameters.iter().map(Parameter::to_record).collect(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The stable identifier of the template this set was instantiated from.
    #[must_use]
    pub fn paramset_id(&self) -> &str {
        &self.id
    }

    /// Append a parameter.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::DuplicateParameter`] when a parameter with the
    /// same name is already present.
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<(), DeviceError> {
        if self.parameter(parameter.name()).is_some() {
            return Err(DeviceError::DuplicateParameter {
                paramset: self.name.clone(),
                name: parameter.name().to_string(),
            });
        }
        self.parameters.push(parameter);
        Ok(())
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.name() == name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Current values keyed by parameter name.
    #[must_use]
    pub fn paramset(&self) -> BTreeMap<String, ParamValue> {
        self.parameters
            .iter()
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }

    /// Metadata records keyed by parameter name.
    #[must_use]
    pub fn paramset_description(&self) -> BTreeMap<String, ParameterDescription> {
        self.parameters
            .iter()
            .map(|p| (p.name().to_string(), p.description()))
            .collect()
    }

    /// Best-effort write of one value.
    ///
    /// Unknown names and values the parameter rejects are ignored. Returns
    /// whether a value was stored.
    pub fn put_paramset_value(&mut self, name: &str, value: &ParamValue) -> bool {
        self.parameter_mut(name)
            .is_some_and(|p| p.set_value(value).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterType;

    fn master() -> ParameterSet {
        serde_json::from_value::<ParamsetRecord>(serde_json::json!({
            "name": "MASTER",
            "id": "lcdim1tpl_dev_master",
            "parameter": [
                {"name": "TRANSMIT_TRY_MAX", "type": "INTEGER", "min": 1, "max": 10, "default": 6, "operations": 3},
                {"name": "INTERNAL_KEYS_VISIBLE", "type": "BOOL", "default": true, "operations": 3}
            ]
        }))
        .map_err(DeviceError::from)
        .and_then(ParameterSet::from_record)
        .unwrap()
    }

    #[test]
    fn should_build_all_parameters_from_record() {
        let set = master();
        assert_eq!(set.len(), 2);
        assert_eq!(set.paramset_id(), "lcdim1tpl_dev_master");
    }

    #[test]
    fn should_reject_duplicate_parameter() {
        let mut set = ParameterSet::new(VALUES, "v");
        set.add_parameter(Parameter::new("STATE", ParameterType::Bool).unwrap())
            .unwrap();
        let result = set.add_parameter(Parameter::new("STATE", ParameterType::Bool).unwrap());
        assert!(matches!(
            result,
            Err(DeviceError::DuplicateParameter { name, .. }) if name == "STATE"
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn should_reject_whole_record_when_one_parameter_is_invalid() {
        let record: ParamsetRecord = serde_json::from_value(serde_json::json!({
            "name": "VALUES",
            "id": "x",
            "parameter": [
                {"name": "STATE", "type": "BOOL"},
                {"name": "RGB", "type": "COLOR"}
            ]
        }))
        .unwrap();
        assert!(ParameterSet::from_record(record).is_err());
    }

    #[test]
    fn should_return_current_values() {
        let set = master();
        let values = set.paramset();
        assert_eq!(values["TRANSMIT_TRY_MAX"], ParamValue::Integer(6));
        assert_eq!(values["INTERNAL_KEYS_VISIBLE"], ParamValue::Bool(true));
    }

    #[test]
    fn should_describe_every_parameter() {
        let set = master();
        let description = set.paramset_description();
        assert_eq!(description.len(), 2);
        assert_eq!(description["TRANSMIT_TRY_MAX"].max, Some(ParamValue::Integer(10)));
    }

    #[test]
    fn should_put_known_value() {
        let mut set = master();
        assert!(set.put_paramset_value("TRANSMIT_TRY_MAX", &ParamValue::Integer(3)));
        assert_eq!(set.paramset()["TRANSMIT_TRY_MAX"], ParamValue::Integer(3));
    }

    #[test]
    fn should_ignore_unknown_name_on_put() {
        let mut set = master();
        let before = set.paramset();
        assert!(!set.put_paramset_value("NOPE", &ParamValue::Integer(3)));
        assert_eq!(set.paramset(), before);
    }

    #[test]
    fn should_keep_values_through_record() {
        let mut set = master();
        set.put_paramset_value("TRANSMIT_TRY_MAX", &ParamValue::Integer(2));
        let restored = ParameterSet::from_record(set.to_record()).unwrap();
        assert_eq!(restored.paramset(), set.paramset());
        assert_eq!(restored.paramset_id(), set.paramset_id());
    }
}
