//! Error types and result types for mapping operations.
//!
//! Every failure raised while converting between domain values and BSON records is a
//! [`MappingError`]. Use [`MappingResult<T>`] as the return type for fallible operations.
//! Mapping errors are never recovered inside the converter: they abort the current
//! `read` or `write` call and propagate to the caller.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur while mapping domain values to and
/// from store records.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    /// No mapping metadata is registered for a type that requires it.
    #[error("No mapping metadata found for {0}")]
    MissingMetadata(String),
    /// Mapping metadata is inconsistent (duplicate properties, several identifiers, ...).
    #[error("Invalid mapping metadata: {0}")]
    InvalidMetadata(String),
    /// The entity has no preferred constructor, so it cannot be instantiated on read.
    #[error("No preferred constructor registered for {0}")]
    MissingConstructor(String),
    /// The identifier property has a type that cannot be stored as an identifier.
    /// The first argument is the entity, the second the declared identifier type.
    #[error("Invalid data type {1} for id property of {0}, should be one of {2}")]
    InvalidIdType(String, String, String),
    /// A map key is not a simple value.
    #[error("Cannot use a complex object as a key value: {0}")]
    ComplexMapKey(String),
    /// A document reference points at an entity that declares no identifier property.
    #[error("Cannot create a reference to {0}: it has no identifier property")]
    ReferenceWithoutId(String),
    /// A document reference points at an object whose identifier is null.
    #[error("Cannot create a reference to an object of type {0} with a null id")]
    NullReferenceId(String),
    /// A document reference could not be dereferenced.
    #[error("Cannot resolve reference to {0}")]
    UnresolvableReference(String),
    /// A stored enum name does not match any variant of the target enum.
    /// The first argument is the enum type, the second the stored name.
    #[error("No variant {1} in enum {0}")]
    UnknownEnumVariant(String, String),
    /// A property name is not known to the mapped object.
    /// The first argument is the type, the second the property.
    #[error("Unknown property {1} on {0}")]
    UnknownProperty(String, String),
    /// Reading or assigning a property failed.
    #[error("Cannot access property {property} on {entity}: {message}")]
    PropertyAccess {
        /// The type owning the property.
        entity: String,
        /// The property name.
        property: String,
        /// The underlying failure.
        message: String,
    },
    /// A scalar value could not be converted into the requested type.
    #[error("Conversion error: {0}")]
    Conversion(String),
    /// A computed-value expression failed to parse or evaluate.
    #[error("Expression error: {0}")]
    Expression(String),
    /// A record does not have the shape the operation requires.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// The object graph is nested deeper than the configured limit.
    #[error("Maximum mapping depth of {0} exceeded")]
    DepthExceeded(usize),
    /// Serialization/deserialization error from the BSON or JSON layer.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MappingError {
    /// Wraps a failure raised while getting or setting a property.
    pub fn property_access(
        entity: impl Into<String>,
        property: impl Into<String>,
        err: impl std::fmt::Display,
    ) -> Self {
        MappingError::PropertyAccess {
            entity: entity.into(),
            property: property.into(),
            message: err.to_string(),
        }
    }

    /// Shorthand for a [`MappingError::Conversion`] describing a source and target.
    pub fn conversion(source: impl std::fmt::Display, target: impl std::fmt::Display) -> Self {
        MappingError::Conversion(format!("cannot convert {source} into {target}"))
    }
}

/// A specialized `Result` type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

impl From<BsonError> for MappingError {
    fn from(err: BsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for MappingError {
    fn from(err: SerdeJsonError) -> Self {
        MappingError::Serialization(err.to_string())
    }
}
