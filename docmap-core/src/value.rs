//! Domain-side values and the bridge between Rust field types and them.
//!
//! [`Value`] is the tree the converter walks on the domain side of a conversion. It
//! mirrors the store record model (scalars, lists, maps) but keeps domain concepts
//! the record model lacks: enum values, maps with non-string keys, and whole domain
//! objects.
//!
//! [`FieldValue`] connects concrete Rust types to `Value` and to their declared
//! [`TypeInfo`]. Generated entity code uses it to read and assign fields.

use bson::{
    Binary, Bson, DateTime, Document, Uuid, oid::ObjectId, spec::BinarySubtype,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    hash::Hash,
};

use crate::{
    error::{MappingError, MappingResult},
    object::{MappedObject, downcast_object},
    types::{EnumType, SimpleType, TypeInfo},
};

/// An enum value: the enum's type name and the selected variant's name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    type_name: String,
    variant: String,
}

impl EnumValue {
    pub fn new(type_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), variant: variant.into() }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }
}

/// A domain value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    ObjectId(ObjectId),
    Uuid(Uuid),
    DateTime(DateTime),
    Enum(EnumValue),
    /// Any collection or array, in iteration order.
    List(Vec<Value>),
    /// A map. Keys may be arbitrary values; only simple keys can be written.
    Map(Vec<(Value, Value)>),
    /// A domain object governed by mapping metadata.
    Object(Box<dyn MappedObject>),
    /// A raw store record, passed through untouched.
    Record(Document),
    /// A store-native scalar without a domain counterpart (decimal, regex, timestamp, ...).
    Native(Bson),
}

impl Value {
    pub fn object(object: impl MappedObject) -> Self {
        Value::Object(Box::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is stored directly as a scalar.
    ///
    /// Raw records count as simple: they are already in store form.
    pub fn is_simple(&self) -> bool {
        !matches!(self, Value::List(_) | Value::Map(_) | Value::Object(_))
    }

    /// The name of the value's runtime type, as custom conversions are keyed.
    pub fn runtime_type(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => SimpleType::Bool.name(),
            Value::Int32(_) => SimpleType::Int32.name(),
            Value::Int64(_) => SimpleType::Int64.name(),
            Value::Double(_) => SimpleType::Double.name(),
            Value::String(_) => SimpleType::String.name(),
            Value::Binary(_) => SimpleType::Binary.name(),
            Value::ObjectId(_) => SimpleType::ObjectId.name(),
            Value::Uuid(_) => SimpleType::Uuid.name(),
            Value::DateTime(_) => SimpleType::DateTime.name(),
            Value::Enum(e) => e.type_name(),
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(object) => object.type_alias(),
            Value::Record(_) => "record",
            Value::Native(_) => "native",
        }
    }

    /// The natural store form of a simple value; `None` for lists, maps and objects.
    ///
    /// Enums are stored by variant name.
    pub fn to_simple_bson(&self) -> Option<Bson> {
        Some(match self {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int32(i) => Bson::Int32(*i),
            Value::Int64(i) => Bson::Int64(*i),
            Value::Double(d) => Bson::Double(*d),
            Value::String(s) => Bson::String(s.clone()),
            Value::Binary(bytes) => Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.clone(),
            }),
            Value::ObjectId(oid) => Bson::ObjectId(*oid),
            Value::Uuid(uuid) => Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: uuid.bytes().to_vec(),
            }),
            Value::DateTime(dt) => Bson::DateTime(*dt),
            Value::Enum(e) => Bson::String(e.variant().to_string()),
            Value::Record(doc) => Bson::Document(doc.clone()),
            Value::Native(bson) => bson.clone(),
            Value::List(_) | Value::Map(_) | Value::Object(_) => return None,
        })
    }

    /// The natural domain form of a scalar record value; `None` for documents and arrays.
    pub fn from_scalar(bson: &Bson) -> Option<Value> {
        Some(match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(i) => Value::Int32(*i),
            Bson::Int64(i) => Value::Int64(*i),
            Bson::Double(d) => Value::Double(*d),
            Bson::String(s) => Value::String(s.clone()),
            Bson::ObjectId(oid) => Value::ObjectId(*oid),
            Bson::DateTime(dt) => Value::DateTime(*dt),
            Bson::Binary(binary) => match binary.subtype {
                BinarySubtype::Uuid => match <[u8; 16]>::try_from(binary.bytes.as_slice()) {
                    Ok(bytes) => Value::Uuid(Uuid::from_bytes(bytes)),
                    Err(_) => Value::Binary(binary.bytes.clone()),
                },
                _ => Value::Binary(binary.bytes.clone()),
            },
            Bson::Document(_) | Bson::Array(_) => return None,
            other => Value::Native(other.clone()),
        })
    }

    /// A short description used in error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Value::String(s) => format!("string {s:?}"),
            Value::Enum(e) => format!("{}::{}", e.type_name(), e.variant()),
            other => other.runtime_type().to_string(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// Conversion boundary between a Rust field type and [`Value`].
///
/// Implemented for the scalar types the store understands, for `Option`, for the
/// standard collections and maps, and by the derive macros for entities and enums.
pub trait FieldValue: Sized {
    /// The declared type of fields of this Rust type.
    fn type_info() -> TypeInfo;

    fn to_value(&self) -> Value;

    /// Builds the Rust value from a domain value already converted to [`Self::type_info`].
    fn from_value(value: Value) -> MappingResult<Self>;
}

macro_rules! impl_scalar_field_value {
    ( $( $type:ty => $variant:ident, $simple:ident );* $(;)? ) => {
        $(
            impl FieldValue for $type {
                fn type_info() -> TypeInfo {
                    TypeInfo::Simple(SimpleType::$simple)
                }

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> MappingResult<Self> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(MappingError::conversion(other.describe(), stringify!($type))),
                    }
                }
            }
        )*
    };
}

impl_scalar_field_value!(
    bool => Bool, Bool;
    i32 => Int32, Int32;
    String => String, String;
    ObjectId => ObjectId, ObjectId;
    Uuid => Uuid, Uuid;
    DateTime => DateTime, DateTime;
);

impl FieldValue for i64 {
    fn type_info() -> TypeInfo {
        TypeInfo::Simple(SimpleType::Int64)
    }

    fn to_value(&self) -> Value {
        Value::Int64(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Int64(v) => Ok(v),
            Value::Int32(v) => Ok(v.into()),
            other => Err(MappingError::conversion(other.describe(), "i64")),
        }
    }
}

impl FieldValue for f64 {
    fn type_info() -> TypeInfo {
        TypeInfo::Simple(SimpleType::Double)
    }

    fn to_value(&self) -> Value {
        Value::Double(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Double(v) => Ok(v),
            Value::Int32(v) => Ok(v.into()),
            other => Err(MappingError::conversion(other.describe(), "f64")),
        }
    }
}

impl FieldValue for uuid::Uuid {
    fn type_info() -> TypeInfo {
        TypeInfo::Simple(SimpleType::Uuid)
    }

    fn to_value(&self) -> Value {
        Value::Uuid(Uuid::from_bytes(*self.as_bytes()))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Uuid(v) => Ok(uuid::Uuid::from_bytes(v.bytes())),
            other => Err(MappingError::conversion(other.describe(), "uuid")),
        }
    }
}

impl FieldValue for chrono::DateTime<chrono::Utc> {
    fn type_info() -> TypeInfo {
        TypeInfo::Simple(SimpleType::DateTime)
    }

    fn to_value(&self) -> Value {
        Value::DateTime(DateTime::from_chrono(*self))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::DateTime(v) => Ok(v.to_chrono()),
            other => Err(MappingError::conversion(other.describe(), "date_time")),
        }
    }
}

impl FieldValue for Binary {
    fn type_info() -> TypeInfo {
        TypeInfo::Simple(SimpleType::Binary)
    }

    fn to_value(&self) -> Value {
        Value::Binary(self.bytes.clone())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Binary(bytes) => Ok(Binary { subtype: BinarySubtype::Generic, bytes }),
            other => Err(MappingError::conversion(other.describe(), "binary")),
        }
    }
}

impl FieldValue for Document {
    fn type_info() -> TypeInfo {
        TypeInfo::Record
    }

    fn to_value(&self) -> Value {
        Value::Record(self.clone())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Record(doc) => Ok(doc),
            other => Err(MappingError::conversion(other.describe(), "record")),
        }
    }
}

impl FieldValue for Value {
    fn type_info() -> TypeInfo {
        TypeInfo::Any
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        Ok(value)
    }
}

impl FieldValue for Box<dyn MappedObject> {
    fn type_info() -> TypeInfo {
        TypeInfo::Any
    }

    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Object(object) => Ok(object),
            other => Err(MappingError::conversion(other.describe(), "object")),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

fn list_items(value: Value, target: &str) -> MappingResult<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(MappingError::conversion(other.describe(), target)),
    }
}

fn map_entries(value: Value) -> MappingResult<Vec<(Value, Value)>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(MappingError::conversion(other.describe(), "map")),
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::list(T::type_info())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, "list")?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FieldValue + Eq + Hash> FieldValue for HashSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::set(T::type_info())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, "set")?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<T: FieldValue + Ord> FieldValue for BTreeSet<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::set(T::type_info())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        list_items(value, "set")?
            .into_iter()
            .map(T::from_value)
            .collect()
    }
}

impl<K: FieldValue + Eq + Hash, V: FieldValue> FieldValue for HashMap<K, V> {
    fn type_info() -> TypeInfo {
        TypeInfo::map(K::type_info(), V::type_info())
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        map_entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

impl<K: FieldValue + Ord, V: FieldValue> FieldValue for BTreeMap<K, V> {
    fn type_info() -> TypeInfo {
        TypeInfo::map(K::type_info(), V::type_info())
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        map_entries(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

/// Builds a `FieldValue` implementation for an enum from its variant table.
///
/// Used by `#[derive(MappedEnum)]`; exposed so hand-written enums can share it.
pub fn enum_from_value<E: Copy>(
    enum_type: &EnumType,
    variants: &[(&str, E)],
    value: Value,
) -> MappingResult<E> {
    let name = match value {
        Value::Enum(e) => e.variant,
        Value::String(s) => s,
        other => return Err(MappingError::conversion(other.describe(), enum_type.name())),
    };

    variants
        .iter()
        .find(|(variant, _)| *variant == name)
        .map(|(_, e)| *e)
        .ok_or_else(|| MappingError::UnknownEnumVariant(enum_type.name().to_string(), name))
}

/// Unwraps an object value into a concrete entity type.
///
/// Used by `#[derive(Entity)]` for the entity's own `FieldValue` implementation.
pub fn object_from_value<T: MappedObject>(value: Value) -> MappingResult<T> {
    match value {
        Value::Object(object) => downcast_object(object),
        other => Err(MappingError::conversion(other.describe(), std::any::type_name::<T>())),
    }
}
