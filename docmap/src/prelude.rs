//! Convenient re-exports of commonly used types from docmap.
//!
//! ```ignore
//! use docmap::prelude::*;
//! ```
//!
//! This provides access to:
//! - The converter, its builder and configuration
//! - Mapping metadata and the derive macros
//! - Domain values and the object traits
//! - Custom conversions, references and errors

pub use docmap_core::{
    config::ConverterConfig,
    conversion::{ConversionService, DefaultConversionService},
    conversions::{CustomConversions, CustomConversionsBuilder, ReadSource, WriteTarget},
    converter::{MappingConverter, MappingConverterBuilder, Shape},
    error::{MappingError, MappingResult},
    expression::{EvaluationContext, Expression},
    mapping::{
        ConstructorArguments, ConstructorParameter, Entity, MappingContext, MappingMetadata,
        PersistentEntity, PersistentProperty, PreferredConstructor, PropertyKind, ReferenceSpec,
    },
    object::{MappedObject, PropertyAccess, downcast_object},
    reference::{DocumentReference, ReferenceResolver},
    type_mapper::{DefaultTypeMapper, TypeMapper},
    types::{CollectionKind, EnumType, SimpleType, TypeInfo},
    value::{EnumValue, FieldValue, Value},
};
pub use docmap_macros::{Entity, MappedEnum};
