//! Type discriminators.
//!
//! When the runtime type of a written object differs from what a reader could infer
//! from the declared type, a type key is stored next to the object's fields. On read
//! the key selects the concrete entity to instantiate.

use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{mapping::MappingMetadata, types::TypeInfo};

/// Default storage key of the type discriminator.
pub const DEFAULT_TYPE_KEY: &str = "_class";

/// Strategy for recording and resolving concrete types in records.
pub trait TypeMapper: Send + Sync + Debug {
    /// The reserved key, or `None` when type information is disabled.
    fn type_key(&self) -> Option<&str>;

    fn is_type_key(&self, key: &str) -> bool {
        self.type_key() == Some(key)
    }

    /// Records `alias` as the concrete type of `sink`.
    fn write_type(&self, alias: &str, sink: &mut Document);

    /// Returns the stored alias, if present and a string.
    fn read_type(&self, source: &Document) -> Option<String>;

    /// Resolves the concrete type a record should be read as.
    ///
    /// A stored alias wins when it names a registered entity that is assignable to
    /// `requested` (any entity is assignable to `Any`). Otherwise `requested` is
    /// returned unchanged.
    fn resolve_type(
        &self,
        source: &Document,
        requested: &TypeInfo,
        metadata: &dyn MappingMetadata,
    ) -> TypeInfo {
        let Some(alias) = self.read_type(source) else {
            return requested.clone();
        };

        if metadata.persistent_entity(&alias).is_none() {
            return requested.clone();
        }

        match requested {
            TypeInfo::Any => TypeInfo::Entity(alias),
            TypeInfo::Entity(declared) if metadata.is_assignable(declared, &alias) => {
                TypeInfo::Entity(alias)
            }
            other => other.clone(),
        }
    }
}

/// Stores the concrete type alias under a single configurable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultTypeMapper {
    type_key: Option<String>,
}

impl DefaultTypeMapper {
    /// A mapper using `key`; `None` disables type information.
    pub fn new(type_key: Option<String>) -> Self {
        Self { type_key }
    }

    pub fn disabled() -> Self {
        Self { type_key: None }
    }
}

impl Default for DefaultTypeMapper {
    fn default() -> Self {
        Self::new(Some(DEFAULT_TYPE_KEY.to_string()))
    }
}

impl TypeMapper for DefaultTypeMapper {
    fn type_key(&self) -> Option<&str> {
        self.type_key.as_deref()
    }

    fn write_type(&self, alias: &str, sink: &mut Document) {
        if let Some(key) = &self.type_key {
            sink.insert(key.clone(), alias);
        }
    }

    fn read_type(&self, source: &Document) -> Option<String> {
        match source.get(self.type_key.as_deref()?) {
            Some(Bson::String(alias)) => Some(alias.clone()),
            _ => None,
        }
    }
}
