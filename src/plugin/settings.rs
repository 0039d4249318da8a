use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A typed setting value, as resolved against a plugin's settings schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
}

impl SettingValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::String(_) => "string",
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// The declared type of a setting, used to type-check and coerce values
/// supplied at load or set time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    Int,
    Float,
    Bool,
    String,
}

/// One entry in a plugin's settings schema: type, default, and optional
/// bounds (numeric range or string options).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettingSpec {
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    pub default: SettingValue,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub description: String,
}

/// A schema of named, typed settings declared by a `PluginDescriptor`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SettingsSchema(pub HashMap<String, SettingSpec>);

impl SettingsSchema {
    /// Validates and coerces `provided` against the schema, filling in
    /// defaults for anything absent. Unknown keys are rejected.
    pub fn validate(
        &self,
        plugin: &str,
        provided: &HashMap<String, SettingValue>,
    ) -> Result<HashMap<String, SettingValue>, CoreError> {
        for key in provided.keys() {
            if !self.0.contains_key(key) {
                return Err(CoreError::plugin_load(
                    plugin,
                    format!("unknown setting '{key}'"),
                ));
            }
        }

        let mut out = HashMap::new();
        for (name, spec) in &self.0 {
            let value = match provided.get(name) {
                Some(v) => self.coerce_and_bound(plugin, name, spec, v)?,
                None => spec.default.clone(),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    fn coerce_and_bound(
        &self,
        plugin: &str,
        name: &str,
        spec: &SettingSpec,
        value: &SettingValue,
    ) -> Result<SettingValue, CoreError> {
        let coerced = match (spec.setting_type, value) {
            (SettingType::Int, SettingValue::Int(v)) => SettingValue::Int(*v),
            (SettingType::Float, SettingValue::Float(v)) => SettingValue::Float(*v),
            (SettingType::Float, SettingValue::Int(v)) => SettingValue::Float(*v as f64),
            (SettingType::Bool, SettingValue::Bool(v)) => SettingValue::Bool(*v),
            (SettingType::String, SettingValue::String(v)) => SettingValue::String(v.clone()),
            _ => {
                return Err(CoreError::plugin_load(
                    plugin,
                    format!(
                        "setting '{name}' expected type {:?}, got {}",
                        spec.setting_type,
                        value.type_name()
                    ),
                ))
            }
        };

        if let Some(n) = coerced.as_float() {
            if let Some(min) = spec.min {
                if n < min {
                    return Err(CoreError::plugin_load(
                        plugin,
                        format!("setting '{name}' value {n} below minimum {min}"),
                    ));
                }
            }
            if let Some(max) = spec.max {
                if n > max {
                    return Err(CoreError::plugin_load(
                        plugin,
                        format!("setting '{name}' value {n} above maximum {max}"),
                    ));
                }
            }
        }

        if let (Some(options), Some(s)) = (&spec.options, coerced.as_str()) {
            if !options.iter().any(|o| o == s) {
                return Err(CoreError::plugin_load(
                    plugin,
                    format!("setting '{name}' value '{s}' not in allowed options {options:?}"),
                ));
            }
        }

        Ok(coerced)
    }
}
