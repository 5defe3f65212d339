//! Converter configuration.

use serde::{Deserialize, Serialize};

use crate::{error::MappingResult, object::PropertyAccess, type_mapper::DEFAULT_TYPE_KEY};

/// Settings for a [`MappingConverter`](crate::converter::MappingConverter).
///
/// Every field has a default, so a partial JSON object is a valid configuration:
///
/// ```ignore
/// let config = ConverterConfig::from_json(r#"{ "type_key": "_t", "max_depth": 32 }"#)?;
/// ```
///
/// A `null` type key disables type information entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Reserved field holding the concrete type alias.
    pub type_key: Option<String>,
    /// How properties are read and assigned.
    pub access: PropertyAccess,
    /// Maximum nesting depth of a written or read object graph.
    pub max_depth: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            type_key: Some(DEFAULT_TYPE_KEY.to_string()),
            access: PropertyAccess::Field,
            max_depth: 128,
        }
    }
}

impl ConverterConfig {
    pub fn from_json(json: &str) -> MappingResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_type_key(mut self, type_key: Option<String>) -> Self {
        self.type_key = type_key;
        self
    }

    pub fn with_access(mut self, access: PropertyAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;

    #[test]
    fn defaults() {
        let config = ConverterConfig::default();
        assert_eq!(config.type_key.as_deref(), Some("_class"));
        assert_eq!(config.access, PropertyAccess::Field);
        assert_eq!(config.max_depth, 128);
    }

    #[test]
    fn partial_json() {
        let config = ConverterConfig::from_json(r#"{ "access": "accessor", "max_depth": 8 }"#).unwrap();
        assert_eq!(config.type_key.as_deref(), Some("_class"));
        assert_eq!(config.access, PropertyAccess::Accessor);
        assert_eq!(config.max_depth, 8);

        let disabled = ConverterConfig::from_json(r#"{ "type_key": null }"#).unwrap();
        assert_eq!(disabled.type_key, None);
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            ConverterConfig::from_json("{ nope"),
            Err(MappingError::Serialization(_))
        ));
    }
}
