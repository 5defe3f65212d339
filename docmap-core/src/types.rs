//! Static type descriptors for mapped values.
//!
//! A [`TypeInfo`] describes the declared type of a property, constructor parameter,
//! collection element or map value. The converter consults it to decide how a stored
//! record should be turned back into a domain value, and to decide whether a written
//! value needs a type discriminator.

use std::fmt;

/// Scalar types that are stored directly, without recursive structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleType {
    String,
    Bool,
    Int32,
    Int64,
    Double,
    Binary,
    ObjectId,
    Uuid,
    DateTime,
}

impl SimpleType {
    /// Returns the canonical name of this simple type.
    pub fn name(&self) -> &'static str {
        match self {
            SimpleType::String => "string",
            SimpleType::Bool => "bool",
            SimpleType::Int32 => "i32",
            SimpleType::Int64 => "i64",
            SimpleType::Double => "f64",
            SimpleType::Binary => "binary",
            SimpleType::ObjectId => "object_id",
            SimpleType::Uuid => "uuid",
            SimpleType::DateTime => "date_time",
        }
    }

    /// Whether values of this type may be used as document identifiers.
    pub fn is_id_type(&self) -> bool {
        matches!(
            self,
            SimpleType::ObjectId
                | SimpleType::String
                | SimpleType::Int64
                | SimpleType::Binary
                | SimpleType::Uuid
        )
    }
}

/// The identifier types accepted for an entity's id property.
pub const VALID_ID_TYPES: [SimpleType; 5] = [
    SimpleType::ObjectId,
    SimpleType::String,
    SimpleType::Int64,
    SimpleType::Binary,
    SimpleType::Uuid,
];

/// Descriptor of an enum type: its name and the names of its variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    name: String,
    variants: Vec<String>,
}

impl EnumType {
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    /// Looks up a variant by its stored name.
    pub fn variant(&self, name: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|v| v.as_str() == name)
            .map(String::as_str)
    }
}

/// The kind of collection a collection-like type materializes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    /// An ordered list (`Vec`).
    List,
    /// A collection without duplicates; reading de-duplicates elements.
    Set,
    /// A fixed array. An empty document stored for an array reads as an empty array.
    Array,
}

/// Declared type information for a mapped value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeInfo {
    /// No static information: the runtime shape decides.
    Any,
    Simple(SimpleType),
    Enum(EnumType),
    Collection {
        kind: CollectionKind,
        element: Box<TypeInfo>,
    },
    Map {
        key: Box<TypeInfo>,
        value: Box<TypeInfo>,
    },
    /// A mapped entity, identified by its type alias.
    Entity(String),
    /// A raw store record, passed through untouched.
    Record,
}

impl TypeInfo {
    pub fn list(element: TypeInfo) -> Self {
        TypeInfo::Collection { kind: CollectionKind::List, element: Box::new(element) }
    }

    pub fn set(element: TypeInfo) -> Self {
        TypeInfo::Collection { kind: CollectionKind::Set, element: Box::new(element) }
    }

    pub fn array(element: TypeInfo) -> Self {
        TypeInfo::Collection { kind: CollectionKind::Array, element: Box::new(element) }
    }

    pub fn map(key: TypeInfo, value: TypeInfo) -> Self {
        TypeInfo::Map { key: Box::new(key), value: Box::new(value) }
    }

    pub fn entity(alias: impl Into<String>) -> Self {
        TypeInfo::Entity(alias.into())
    }

    pub fn is_collection_like(&self) -> bool {
        matches!(self, TypeInfo::Collection { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeInfo::Collection { kind: CollectionKind::Array, .. })
    }

    pub fn is_map(&self) -> bool {
        matches!(self, TypeInfo::Map { .. })
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, TypeInfo::Simple(_) | TypeInfo::Enum(_))
    }

    /// The element type for collections, the key type for maps.
    pub fn component_type(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Collection { element, .. } => Some(element),
            TypeInfo::Map { key, .. } => Some(key),
            _ => None,
        }
    }

    /// The value type for maps.
    pub fn map_value_type(&self) -> Option<&TypeInfo> {
        match self {
            TypeInfo::Map { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The type with one level of collection or map wrapping removed.
    pub fn actual_type(&self) -> &TypeInfo {
        match self {
            TypeInfo::Collection { element, .. } => element,
            TypeInfo::Map { value, .. } => value,
            other => other,
        }
    }

    /// The entity alias this type refers to, if it is an entity.
    pub fn entity_alias(&self) -> Option<&str> {
        match self {
            TypeInfo::Entity(alias) => Some(alias),
            _ => None,
        }
    }

    /// The name custom conversions are keyed by.
    pub fn raw_name(&self) -> &str {
        match self {
            TypeInfo::Any => "any",
            TypeInfo::Simple(simple) => simple.name(),
            TypeInfo::Enum(e) => e.name(),
            TypeInfo::Collection { kind: CollectionKind::List, .. } => "list",
            TypeInfo::Collection { kind: CollectionKind::Set, .. } => "set",
            TypeInfo::Collection { kind: CollectionKind::Array, .. } => "array",
            TypeInfo::Map { .. } => "map",
            TypeInfo::Entity(alias) => alias,
            TypeInfo::Record => "record",
        }
    }

    /// Replaces the innermost `Any` with the given entity alias.
    ///
    /// Used for polymorphic fields whose Rust type is a boxed trait object but whose
    /// declared domain type is a concrete base entity.
    pub fn with_declared_entity(self, alias: &str) -> TypeInfo {
        match self {
            TypeInfo::Any => TypeInfo::Entity(alias.to_string()),
            TypeInfo::Collection { kind, element } => TypeInfo::Collection {
                kind,
                element: Box::new(element.with_declared_entity(alias)),
            },
            TypeInfo::Map { key, value } => TypeInfo::Map {
                key,
                value: Box::new(value.with_declared_entity(alias)),
            },
            other => other,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeInfo::Collection { element, .. } => write!(f, "{}<{}>", self.raw_name(), element),
            TypeInfo::Map { key, value } => write!(f, "map<{key}, {value}>"),
            other => f.write_str(other.raw_name()),
        }
    }
}
