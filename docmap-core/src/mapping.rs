//! Mapping metadata: entities, their properties and their preferred constructors.
//!
//! The converter never inspects Rust types directly. Everything it knows about a
//! domain type comes from a [`PersistentEntity`] looked up by type alias through the
//! [`MappingMetadata`] trait. [`MappingContext`] is the registry implementation used
//! by most applications; entities are registered once, before the first conversion,
//! and the context is read-only afterwards.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let context = MappingContext::builder()
//!     .register::<Person>()?
//!     .register::<Address>()?
//!     .build();
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    error::{MappingError, MappingResult},
    expression::Expression,
    object::MappedObject,
    types::TypeInfo,
    value::{FieldValue, Value},
};

/// Storage key of the identifier field in every record.
pub const ID_FIELD: &str = "_id";

/// Whether a property is an ordinary (embedded) value or an association to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Ordinary,
    Association,
}

/// Marks an association as stored by reference rather than embedded.
///
/// Empty collection or database names fall back to the target entity's collection and
/// the resolver's default database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSpec {
    collection: Option<String>,
    database: Option<String>,
}

impl ReferenceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into()).filter(|c| !c.is_empty());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into()).filter(|d| !d.is_empty());
        self
    }

    pub fn target_collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn target_database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

/// Metadata for one property of an entity.
#[derive(Debug, Clone)]
pub struct PersistentProperty {
    name: String,
    field_name: String,
    type_info: TypeInfo,
    is_id: bool,
    kind: PropertyKind,
    reference: Option<ReferenceSpec>,
    expression: Option<Arc<Expression>>,
}

impl PersistentProperty {
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        let name = name.into();

        Self {
            field_name: name.clone(),
            name,
            type_info,
            is_id: false,
            kind: PropertyKind::Ordinary,
            reference: None,
            expression: None,
        }
    }

    /// Creates a property whose declared type is taken from a Rust field type.
    pub fn of<T: FieldValue>(name: impl Into<String>) -> Self {
        Self::new(name, T::type_info())
    }

    /// Marks this property as the identifier. Its storage key becomes [`ID_FIELD`].
    pub fn id(mut self) -> Self {
        self.is_id = true;
        self.field_name = ID_FIELD.to_string();
        self
    }

    /// Overrides the storage key.
    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    pub fn association(mut self) -> Self {
        self.kind = PropertyKind::Association;
        self
    }

    /// Stores this property as a document reference. Implies an association.
    pub fn reference(mut self, spec: ReferenceSpec) -> Self {
        self.kind = PropertyKind::Association;
        self.reference = Some(spec);
        self
    }

    /// Binds a computed-value expression evaluated against the source record on read.
    pub fn expression(mut self, expression: Expression) -> Self {
        self.expression = Some(Arc::new(expression));
        self
    }

    /// Compiles and binds a computed-value expression.
    pub fn value(self, source: &str) -> MappingResult<Self> {
        Ok(self.expression(Expression::parse(source)?))
    }

    /// Replaces the innermost `Any` of the declared type with an entity alias.
    pub fn declared(mut self, alias: &str) -> Self {
        self.type_info = self.type_info.with_declared_entity(alias);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_key(&self) -> &str {
        &self.field_name
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_id(&self) -> bool {
        self.is_id
    }

    pub fn is_association(&self) -> bool {
        self.kind == PropertyKind::Association
    }

    pub fn is_collection(&self) -> bool {
        self.type_info.is_collection_like()
    }

    pub fn is_array(&self) -> bool {
        self.type_info.is_array()
    }

    pub fn is_map(&self) -> bool {
        self.type_info.is_map()
    }

    pub fn reference_spec(&self) -> Option<&ReferenceSpec> {
        self.reference.as_ref()
    }

    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn value_expression(&self) -> Option<&Expression> {
        self.expression.as_deref()
    }
}

/// One parameter of a preferred constructor.
#[derive(Debug, Clone)]
pub struct ConstructorParameter {
    name: String,
    type_info: TypeInfo,
    expression: Option<Arc<Expression>>,
}

impl ConstructorParameter {
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        Self { name: name.into(), type_info, expression: None }
    }

    pub fn of<T: FieldValue>(name: impl Into<String>) -> Self {
        Self::new(name, T::type_info())
    }

    pub fn expression(mut self, expression: Expression) -> Self {
        self.expression = Some(Arc::new(expression));
        self
    }

    pub fn value(self, source: &str) -> MappingResult<Self> {
        Ok(self.expression(Expression::parse(source)?))
    }

    pub fn declared(mut self, alias: &str) -> Self {
        self.type_info = self.type_info.with_declared_entity(alias);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    pub fn value_expression(&self) -> Option<&Expression> {
        self.expression.as_deref()
    }
}

/// Resolved constructor arguments, in parameter order.
#[derive(Debug, Clone, Default)]
pub struct ConstructorArguments {
    values: Vec<(String, Value)>,
}

impl ConstructorArguments {
    pub fn new(values: Vec<(String, Value)>) -> Self {
        Self { values }
    }

    /// Removes and returns the raw value of the named argument, `Null` if absent.
    pub fn take_value(&mut self, name: &str) -> Value {
        match self.values.iter().position(|(n, _)| n == name) {
            Some(index) => self.values.remove(index).1,
            None => Value::Null,
        }
    }

    /// Removes the named argument and converts it into a Rust value.
    pub fn take<T: FieldValue>(&mut self, name: &str) -> MappingResult<T> {
        T::from_value(self.take_value(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type Instantiator =
    dyn Fn(ConstructorArguments) -> MappingResult<Box<dyn MappedObject>> + Send + Sync;

/// The constructor the converter uses to instantiate an entity on read.
#[derive(Clone)]
pub struct PreferredConstructor {
    parameters: Vec<ConstructorParameter>,
    instantiate: Arc<Instantiator>,
}

impl PreferredConstructor {
    pub fn new<F>(parameters: Vec<ConstructorParameter>, instantiate: F) -> Self
    where
        F: Fn(ConstructorArguments) -> MappingResult<Box<dyn MappedObject>> + Send + Sync + 'static,
    {
        Self { parameters, instantiate: Arc::new(instantiate) }
    }

    /// A parameterless constructor building `T::default()`.
    pub fn of_default<T: MappedObject + Default>() -> Self {
        Self::new(Vec::new(), |_| Ok(Box::new(T::default())))
    }

    pub fn parameters(&self) -> &[ConstructorParameter] {
        &self.parameters
    }

    pub fn instantiate(&self, arguments: ConstructorArguments) -> MappingResult<Box<dyn MappedObject>> {
        (self.instantiate)(arguments)
    }
}

impl fmt::Debug for PreferredConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferredConstructor")
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Metadata for one domain type.
#[derive(Debug, Clone)]
pub struct PersistentEntity {
    alias: String,
    collection: String,
    supertypes: Vec<String>,
    properties: Vec<PersistentProperty>,
    constructor: Option<PreferredConstructor>,
}

impl PersistentEntity {
    pub fn builder(alias: impl Into<String>) -> PersistentEntityBuilder {
        PersistentEntityBuilder::new(alias.into())
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The collection top-level records of this type are stored in.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn supertypes(&self) -> &[String] {
        &self.supertypes
    }

    /// All properties, in declaration order.
    pub fn properties(&self) -> &[PersistentProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn id_property(&self) -> Option<&PersistentProperty> {
        self.properties.iter().find(|p| p.is_id)
    }

    pub fn constructor(&self) -> Option<&PreferredConstructor> {
        self.constructor.as_ref()
    }
}

/// Default collection name: the uncapitalized last segment of the alias.
fn default_collection(alias: &str) -> String {
    let simple = alias
        .rsplit(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(alias);
    let mut chars = simple.chars();

    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub struct PersistentEntityBuilder {
    alias: String,
    collection: Option<String>,
    supertypes: Vec<String>,
    properties: Vec<PersistentProperty>,
    constructor: Option<PreferredConstructor>,
}

impl PersistentEntityBuilder {
    pub fn new(alias: String) -> Self {
        Self {
            alias,
            collection: None,
            supertypes: Vec::new(),
            properties: Vec::new(),
            constructor: None,
        }
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn supertype(mut self, alias: impl Into<String>) -> Self {
        self.supertypes.push(alias.into());
        self
    }

    pub fn property(mut self, property: PersistentProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn constructor(mut self, constructor: PreferredConstructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Validates and builds the entity.
    ///
    /// # Errors
    ///
    /// Fails when property names or storage keys collide, when more than one
    /// identifier is declared, or when the identifier is an association.
    pub fn build(self) -> MappingResult<PersistentEntity> {
        let ids = self.properties.iter().filter(|p| p.is_id).count();

        if ids > 1 {
            return Err(MappingError::InvalidMetadata(format!(
                "{} declares {ids} identifier properties",
                self.alias
            )));
        }

        for (index, property) in self.properties.iter().enumerate() {
            if property.is_id && property.is_association() {
                return Err(MappingError::InvalidMetadata(format!(
                    "identifier {} of {} cannot be an association",
                    property.name, self.alias
                )));
            }

            for other in &self.properties[index + 1..] {
                if other.name == property.name || other.field_name == property.field_name {
                    return Err(MappingError::InvalidMetadata(format!(
                        "{} maps {} and {} to the same name",
                        self.alias, property.name, other.name
                    )));
                }
            }
        }

        Ok(PersistentEntity {
            collection: self
                .collection
                .unwrap_or_else(|| default_collection(&self.alias)),
            alias: self.alias,
            supertypes: self.supertypes,
            properties: self.properties,
            constructor: self.constructor,
        })
    }
}

/// A Rust type that can describe its own mapping metadata.
///
/// Implemented by `#[derive(Entity)]`.
pub trait Entity: MappedObject + Sized {
    fn persistent_entity() -> MappingResult<PersistentEntity>;
}

/// Source of mapping metadata for the converter.
pub trait MappingMetadata: Send + Sync {
    /// Returns the entity registered under the given alias.
    fn persistent_entity(&self, alias: &str) -> Option<Arc<PersistentEntity>>;

    /// Aliases of every registered entity.
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether a value of type `actual` may stand where `declared` is expected.
    fn is_assignable(&self, declared: &str, actual: &str) -> bool {
        if declared == actual {
            return true;
        }

        let mut pending = vec![actual.to_string()];
        let mut seen = Vec::new();

        while let Some(alias) = pending.pop() {
            if seen.contains(&alias) {
                continue;
            }

            if let Some(entity) = self.persistent_entity(&alias) {
                for supertype in entity.supertypes() {
                    if supertype == declared {
                        return true;
                    }
                    pending.push(supertype.clone());
                }
            }

            seen.push(alias);
        }

        false
    }
}

impl<M: MappingMetadata + ?Sized> MappingMetadata for Arc<M> {
    fn persistent_entity(&self, alias: &str) -> Option<Arc<PersistentEntity>> {
        (**self).persistent_entity(alias)
    }

    fn aliases(&self) -> Vec<String> {
        (**self).aliases()
    }

    fn is_assignable(&self, declared: &str, actual: &str) -> bool {
        (**self).is_assignable(declared, actual)
    }
}

/// Registry of entities, keyed by type alias.
#[derive(Debug, Clone, Default)]
pub struct MappingContext {
    entities: HashMap<String, Arc<PersistentEntity>>,
}

impl MappingContext {
    pub fn builder() -> MappingContextBuilder {
        MappingContextBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MappingMetadata for MappingContext {
    fn persistent_entity(&self, alias: &str) -> Option<Arc<PersistentEntity>> {
        self.entities.get(alias).cloned()
    }

    fn aliases(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }
}

#[derive(Default)]
pub struct MappingContextBuilder {
    entities: HashMap<String, Arc<PersistentEntity>>,
}

impl MappingContextBuilder {
    /// Registers an entity built by hand.
    pub fn entity(mut self, entity: PersistentEntity) -> Self {
        self.entities
            .insert(entity.alias().to_string(), Arc::new(entity));
        self
    }

    /// Registers a type's self-described metadata.
    pub fn register<E: Entity>(self) -> MappingResult<Self> {
        Ok(self.entity(E::persistent_entity()?))
    }

    pub fn build(self) -> MappingContext {
        MappingContext { entities: self.entities }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimpleType;

    fn string() -> TypeInfo {
        TypeInfo::Simple(SimpleType::String)
    }

    #[test]
    fn id_property_uses_reserved_key() {
        let entity = PersistentEntity::builder("app::Sample")
            .property(PersistentProperty::new("foo", string()).id())
            .build()
            .unwrap();

        let id = entity.id_property().unwrap();
        assert_eq!(id.name(), "foo");
        assert_eq!(id.storage_key(), ID_FIELD);
        assert_eq!(entity.collection(), "sample");
    }

    #[test]
    fn rejects_duplicate_storage_keys() {
        let err = PersistentEntity::builder("app::Broken")
            .property(PersistentProperty::new("a", string()).field_name("x"))
            .property(PersistentProperty::new("b", string()).field_name("x"))
            .build()
            .unwrap_err();

        assert!(matches!(err, MappingError::InvalidMetadata(_)));
    }

    #[test]
    fn rejects_multiple_ids() {
        let err = PersistentEntity::builder("app::Broken")
            .property(PersistentProperty::new("a", string()).id())
            .property(PersistentProperty::new("b", string()).id().field_name("b"))
            .build()
            .unwrap_err();

        assert!(matches!(err, MappingError::InvalidMetadata(_)));
    }

    #[test]
    fn assignability_follows_supertypes() {
        let context = MappingContext::builder()
            .entity(PersistentEntity::builder("zoo::Animal").build().unwrap())
            .entity(
                PersistentEntity::builder("zoo::Dog")
                    .supertype("zoo::Mammal")
                    .build()
                    .unwrap(),
            )
            .entity(
                PersistentEntity::builder("zoo::Mammal")
                    .supertype("zoo::Animal")
                    .build()
                    .unwrap(),
            )
            .build();

        assert!(context.is_assignable("zoo::Animal", "zoo::Dog"));
        assert!(context.is_assignable("zoo::Dog", "zoo::Dog"));
        assert!(!context.is_assignable("zoo::Dog", "zoo::Animal"));
    }

    #[test]
    fn constructor_arguments_take_by_name() {
        let mut args = ConstructorArguments::new(vec![
            ("name".into(), Value::from("Ada")),
            ("age".into(), Value::Int32(36)),
        ]);

        assert_eq!(args.take::<i32>("age").unwrap(), 36);
        assert_eq!(args.take::<Option<String>>("missing").unwrap(), None);
        assert_eq!(args.take::<String>("name").unwrap(), "Ada");
        assert!(args.is_empty());
    }

    #[test]
    fn default_collection_name() {
        assert_eq!(default_collection("app::model::PersonRecord"), "personRecord");
        assert_eq!(default_collection("com.example.Order"), "order");
    }
}
