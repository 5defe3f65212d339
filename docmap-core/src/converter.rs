//! The mapping converter: domain object graphs to BSON records and back.
//!
//! [`MappingConverter`] walks a [`Value`] tree and produces a record, or walks a
//! record and reconstructs domain values, guided by the mapping metadata of every
//! entity it meets. Each value is classified once into a [`Shape`] and dispatched
//! on it.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let context = MappingContext::builder().register::<Person>()?.build();
//! let converter = MappingConverter::builder(context).build()?;
//!
//! let record = converter.write_document(&Value::object(person.clone()))?;
//! let back: Person = converter.read(&record)?;
//! assert_eq!(back, person);
//! ```

use bson::{Bson, Document, oid::ObjectId};
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::Arc,
};
use tracing::{debug, trace, warn};

use crate::{
    config::ConverterConfig,
    conversion::{ConversionService, DefaultConversionService},
    conversions::{CustomConversions, ReadSource, WriteTarget},
    error::{MappingError, MappingResult},
    expression::EvaluationContext,
    mapping::{ConstructorArguments, MappingMetadata, PersistentEntity, PersistentProperty, ReferenceSpec},
    object::MappedObject,
    reference::{DetachedReferences, DocumentReference, ReferenceResolver},
    type_mapper::{DefaultTypeMapper, TypeMapper},
    types::{CollectionKind, SimpleType, TypeInfo, VALID_ID_TYPES},
    value::{FieldValue, Value},
};

/// How a value is converted, decided once per value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Stored as a single scalar.
    Simple,
    /// Stored as a list.
    Collection,
    /// Stored as a record with stringified keys.
    Map,
    /// An entity stored as a nested record.
    Complex,
    /// An entity stored as a document reference.
    Reference,
}

impl Shape {
    /// The shape of a stored value. Records are `Complex` until the resolved target
    /// type decides between a map and an entity.
    pub fn of_record(source: &Bson) -> Shape {
        match source {
            Bson::Document(doc) if DocumentReference::is_reference(doc) => Shape::Reference,
            Bson::Document(_) => Shape::Complex,
            Bson::Array(_) => Shape::Collection,
            _ => Shape::Simple,
        }
    }
}

/// Converts domain values to records and records to domain values.
///
/// Holds only immutable collaborators, so one converter can be shared across threads.
#[derive(Clone)]
pub struct MappingConverter {
    metadata: Arc<dyn MappingMetadata>,
    conversions: Arc<CustomConversions>,
    type_mapper: Arc<dyn TypeMapper>,
    conversion_service: Arc<dyn ConversionService>,
    resolver: Arc<dyn ReferenceResolver>,
    config: ConverterConfig,
}

impl fmt::Debug for MappingConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingConverter")
            .field("config", &self.config)
            .field("type_mapper", &self.type_mapper)
            .field("conversions", &self.conversions)
            .finish_non_exhaustive()
    }
}

impl MappingConverter {
    pub fn builder(metadata: impl MappingMetadata + 'static) -> MappingConverterBuilder {
        MappingConverterBuilder::new(Arc::new(metadata))
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn metadata(&self) -> &dyn MappingMetadata {
        self.metadata.as_ref()
    }

    pub fn type_mapper(&self) -> &dyn TypeMapper {
        self.type_mapper.as_ref()
    }

    /// Whether `key` is the reserved type discriminator field.
    pub fn is_type_key(&self, key: &str) -> bool {
        self.type_mapper.is_type_key(key)
    }

    fn entity(&self, alias: &str) -> MappingResult<Arc<PersistentEntity>> {
        self.metadata
            .persistent_entity(alias)
            .ok_or_else(|| MappingError::MissingMetadata(alias.to_string()))
    }

    fn descend(&self, depth: usize) -> MappingResult<usize> {
        if depth >= self.config.max_depth {
            return Err(MappingError::DepthExceeded(self.config.max_depth));
        }
        Ok(depth + 1)
    }

    fn shape(&self, value: &Value, property: Option<&PersistentProperty>) -> Shape {
        if value.is_simple() || self.conversions.is_simple_type(value.runtime_type()) {
            return Shape::Simple;
        }

        match value {
            Value::List(_) => Shape::Collection,
            Value::Map(_) => Shape::Map,
            _ if property.is_some_and(PersistentProperty::is_reference) => Shape::Reference,
            _ => Shape::Complex,
        }
    }

    // Write path

    /// Writes `value` into `sink`.
    ///
    /// A record sink receives the type key first when the value is an object without
    /// a custom record writer. Map values written into a record sink never carry the
    /// type key. A list sink is filled with the elements of a collection value and
    /// never receives a type key. `Null` writes nothing.
    ///
    /// # Errors
    ///
    /// Fails on scalar sinks, on values whose shape does not fit the sink, and on any
    /// error raised while writing nested values.
    pub fn write(&self, value: &Value, sink: &mut Bson) -> MappingResult<()> {
        debug!(value_type = value.runtime_type(), "writing value");

        if value.is_null() {
            return Ok(());
        }

        match sink {
            Bson::Document(doc) => self.write_root(value, doc),
            Bson::Array(items) => match value {
                Value::List(elements) => {
                    self.write_collection(elements, &TypeInfo::list(TypeInfo::Any), items, 0)
                }
                other => Err(MappingError::InvalidRecord(format!(
                    "cannot write {} into a list",
                    other.describe()
                ))),
            },
            other => Err(MappingError::InvalidRecord(format!(
                "cannot write into scalar sink {other}"
            ))),
        }
    }

    /// Writes `value` into a fresh record.
    pub fn write_document(&self, value: &Value) -> MappingResult<Document> {
        debug!(value_type = value.runtime_type(), "writing record");

        let mut doc = Document::new();
        if !value.is_null() {
            self.write_root(value, &mut doc)?;
        }
        Ok(doc)
    }

    fn write_root(&self, value: &Value, sink: &mut Document) -> MappingResult<()> {
        let custom = self.conversions.write_target(value.runtime_type()) == Some(WriteTarget::Record);

        if let (false, Value::Object(object)) = (custom, value) {
            self.type_mapper.write_type(object.type_alias(), sink);
        }

        self.write_internal(value, sink, &TypeInfo::Any, 0)
    }

    fn write_internal(&self, value: &Value, sink: &mut Document, hint: &TypeInfo, depth: usize) -> MappingResult<()> {
        let depth = self.descend(depth)?;

        if self.conversions.write_target(value.runtime_type()) == Some(WriteTarget::Record) {
            if let Some(Bson::Document(converted)) = self.conversions.write(value).transpose()? {
                for (key, field) in converted {
                    sink.insert(key, field);
                }
            }
            return Ok(());
        }

        match value {
            Value::Null => Ok(()),
            Value::Map(entries) => {
                let map_type = if hint.is_map() { hint.clone() } else { TypeInfo::map(TypeInfo::Any, TypeInfo::Any) };
                self.write_map(entries, sink, &map_type, depth)
            }
            Value::Object(object) => {
                self.add_type_key_if_necessary(hint, object.as_ref(), sink);
                let entity = self.entity(object.type_alias())?;
                self.write_entity(object.as_ref(), sink, &entity, depth)
            }
            other => Err(MappingError::InvalidRecord(format!(
                "cannot write {} as a record",
                other.describe()
            ))),
        }
    }

    /// Records the runtime type when it differs from the declared one.
    fn add_type_key_if_necessary(&self, hint: &TypeInfo, object: &dyn MappedObject, sink: &mut Document) {
        if hint.actual_type().entity_alias() != Some(object.type_alias()) {
            self.type_mapper.write_type(object.type_alias(), sink);
        }
    }

    fn get_property(&self, object: &dyn MappedObject, property: &PersistentProperty) -> MappingResult<Value> {
        object
            .property(property.name(), self.config.access)
            .map_err(|e| MappingError::property_access(object.type_alias(), property.name(), e))
    }

    fn write_entity(
        &self,
        object: &dyn MappedObject,
        sink: &mut Document,
        entity: &PersistentEntity,
        depth: usize,
    ) -> MappingResult<()> {
        trace!(entity = entity.alias(), "writing entity");

        let id_property = entity.id_property();

        if let Some(id_property) = id_property {
            if !sink.contains_key(id_property.storage_key()) {
                let id = self.get_property(object, id_property)?;

                match self.convert_id(entity, &id)? {
                    Some(id) => {
                        sink.insert(id_property.storage_key(), id);
                    }
                    None if !is_valid_id_type(id_property.type_info()) => {
                        return Err(invalid_id_type(entity, id_property));
                    }
                    None => {}
                }
            }
        }

        for property in entity.properties().iter().filter(|p| !p.is_id() && !p.is_association()) {
            let value = self.get_property(object, property)?;

            if value.is_null() {
                continue;
            }

            match self.shape(&value, Some(property)) {
                Shape::Simple => {
                    sink.insert(property.storage_key(), self.write_simple(&value)?);
                }
                _ => self.write_property(&value, sink, property, depth)?,
            }
        }

        for property in entity.properties().iter().filter(|p| p.is_association()) {
            let value = self.get_property(object, property)?;

            if !value.is_null() {
                self.write_property(&value, sink, property, depth)?;
            }
        }

        Ok(())
    }

    /// Identifier store form: an ObjectId when possible, then a string, then the
    /// natural store form. `None` for a null identifier.
    fn convert_id(&self, entity: &PersistentEntity, id: &Value) -> MappingResult<Option<Bson>> {
        Ok(match id {
            Value::Null => None,
            Value::ObjectId(oid) => Some(Bson::ObjectId(*oid)),
            Value::String(s) => Some(match ObjectId::parse_str(s) {
                Ok(oid) => Bson::ObjectId(oid),
                Err(_) => Bson::String(s.clone()),
            }),
            other if other.is_simple() || self.conversions.is_simple_type(other.runtime_type()) => {
                Some(self.write_simple(other)?)
            }
            other => {
                return Err(MappingError::InvalidIdType(
                    entity.alias().to_string(),
                    other.runtime_type().to_string(),
                    valid_id_type_names(),
                ));
            }
        })
    }

    fn write_property(
        &self,
        value: &Value,
        sink: &mut Document,
        property: &PersistentProperty,
        depth: usize,
    ) -> MappingResult<()> {
        let key = property.storage_key();

        match (self.shape(value, Some(property)), value) {
            (Shape::Simple, value) => {
                sink.insert(key, self.write_simple(value)?);
            }
            (Shape::Collection, Value::List(items)) if property.is_reference() => {
                let mut pointers = Vec::with_capacity(items.len());
                for item in items.iter().filter(|item| !item.is_null()) {
                    pointers.push(self.create_reference(item, property.reference_spec(), depth)?);
                }
                sink.insert(key, pointers);
            }
            (Shape::Collection, Value::List(items)) => {
                let collection_type = if property.is_collection() {
                    property.type_info().clone()
                } else {
                    TypeInfo::list(TypeInfo::Any)
                };
                let mut list = Vec::with_capacity(items.len());
                self.write_collection(items, &collection_type, &mut list, depth)?;
                sink.insert(key, list);
            }
            (Shape::Map, Value::Map(entries)) => {
                let map_type = if property.is_map() {
                    property.type_info().clone()
                } else {
                    TypeInfo::map(TypeInfo::Any, TypeInfo::Any)
                };
                let mut nested = Document::new();
                self.write_map(entries, &mut nested, &map_type, depth)?;
                sink.insert(key, nested);
            }
            (Shape::Reference, value) => {
                sink.insert(key, self.create_reference(value, property.reference_spec(), depth)?);
            }
            (_, value) if property.is_collection() => {
                // a single value stored under a collection property becomes a one-element list
                let mut list = Vec::with_capacity(1);
                self.write_collection(std::slice::from_ref(value), property.type_info(), &mut list, depth)?;
                sink.insert(key, list);
            }
            (_, value) => {
                if let Some(converted) = self.conversions.write(value) {
                    sink.insert(key, converted?);
                    return Ok(());
                }

                let mut nested = Document::new();
                self.write_internal(value, &mut nested, property.type_info(), depth)?;
                sink.insert(key, nested);
            }
        }

        Ok(())
    }

    fn write_collection(
        &self,
        elements: &[Value],
        collection_type: &TypeInfo,
        sink: &mut Vec<Bson>,
        depth: usize,
    ) -> MappingResult<()> {
        let depth = self.descend(depth)?;
        let component = collection_type.component_type().cloned().unwrap_or(TypeInfo::Any);

        for element in elements.iter().filter(|e| !e.is_null()) {
            match (self.shape(element, None), element) {
                (Shape::Simple, element) => sink.push(self.write_simple(element)?),
                (Shape::Collection, Value::List(items)) => {
                    let mut nested = Vec::with_capacity(items.len());
                    self.write_collection(items, &component, &mut nested, depth)?;
                    sink.push(Bson::Array(nested));
                }
                (_, element) => {
                    let mut nested = Document::new();
                    self.write_internal(element, &mut nested, &component, depth)?;
                    sink.push(Bson::Document(nested));
                }
            }
        }

        Ok(())
    }

    fn write_map(
        &self,
        entries: &[(Value, Value)],
        sink: &mut Document,
        map_type: &TypeInfo,
        depth: usize,
    ) -> MappingResult<()> {
        let depth = self.descend(depth)?;
        let value_type = map_type.map_value_type().cloned().unwrap_or(TypeInfo::Any);

        for (key, value) in entries {
            let key = map_key(key)?;

            match (self.shape(value, None), value) {
                (Shape::Simple, value) => {
                    sink.insert(key, self.write_simple(value)?);
                }
                (Shape::Collection, Value::List(items)) => {
                    let mut nested = Vec::with_capacity(items.len());
                    self.write_collection(items, &value_type, &mut nested, depth)?;
                    sink.insert(key, nested);
                }
                (_, value) => {
                    let mut nested = Document::new();
                    self.write_internal(value, &mut nested, &value_type, depth)?;
                    sink.insert(key, nested);
                }
            }
        }

        Ok(())
    }

    /// Scalar store form, applying custom scalar writers first. Enums store their name.
    fn write_simple(&self, value: &Value) -> MappingResult<Bson> {
        if self.conversions.write_target(value.runtime_type()) == Some(WriteTarget::Scalar) {
            if let Some(converted) = self.conversions.write(value) {
                return converted;
            }
        }

        value.to_simple_bson().ok_or_else(|| {
            MappingError::conversion(value.describe(), "a simple value")
        })
    }

    fn create_reference(&self, value: &Value, spec: Option<&ReferenceSpec>, depth: usize) -> MappingResult<Bson> {
        self.descend(depth)?;

        let Value::Object(object) = value else {
            return Err(MappingError::conversion(value.describe(), "a document reference"));
        };

        let entity = self.entity(object.type_alias())?;
        let id_property = entity
            .id_property()
            .ok_or_else(|| MappingError::ReferenceWithoutId(entity.alias().to_string()))?;
        let id = self
            .convert_id(&entity, &self.get_property(object.as_ref(), id_property)?)?
            .ok_or_else(|| MappingError::NullReferenceId(entity.alias().to_string()))?;

        let collection = spec
            .and_then(ReferenceSpec::target_collection)
            .unwrap_or(entity.collection());
        let mut reference = DocumentReference::new(collection, id);

        if let Some(database) = spec.and_then(ReferenceSpec::target_database) {
            reference = reference.with_database(database);
        }

        trace!(reference = %reference, "writing document reference");
        Ok(Bson::Document(reference.to_document()))
    }

    /// Converts an ad-hoc value into its store form.
    ///
    /// Unlike [`write`](Self::write) this accepts any value: scalars become scalars,
    /// maps become records with stringified keys, lists are converted element-wise
    /// and objects are fully written, type key included.
    pub fn convert_to_generic_record_form(&self, value: &Value) -> MappingResult<Bson> {
        self.generic_record_form(value, 0)
    }

    fn generic_record_form(&self, value: &Value, depth: usize) -> MappingResult<Bson> {
        let depth = self.descend(depth)?;

        if let Some(converted) = self.conversions.write(value) {
            return converted;
        }

        match value {
            Value::Null => Ok(Bson::Null),
            Value::List(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(|item| self.generic_record_form(item, depth))
                    .collect::<MappingResult<Vec<_>>>()?,
            )),
            Value::Map(entries) => {
                let mut doc = Document::new();
                for (key, value) in entries {
                    doc.insert(map_key(key)?, self.generic_record_form(value, depth)?);
                }
                Ok(Bson::Document(doc))
            }
            Value::Object(_) => Ok(Bson::Document(self.write_document(value)?)),
            simple => self.write_simple(simple),
        }
    }

    // Read path

    /// Reads a record as a Rust value.
    pub fn read<T: FieldValue>(&self, source: &Document) -> MappingResult<T> {
        let target = T::type_info();
        debug!(target_type = %target, "reading record");

        T::from_value(self.read_document(&target, source, 0)?)
    }

    /// Reads a stored value into a domain value of the requested type.
    pub fn read_value(&self, target: &TypeInfo, source: &Bson) -> MappingResult<Value> {
        debug!(target_type = %target, "reading value");
        self.read_internal(target, source, 0)
    }

    fn read_internal(&self, target: &TypeInfo, source: &Bson, depth: usize) -> MappingResult<Value> {
        match (Shape::of_record(source), source) {
            (Shape::Reference | Shape::Complex, Bson::Document(doc)) => self.read_document(target, doc, depth),
            (Shape::Collection, Bson::Array(items)) => self.read_list(target, items, depth),
            (_, scalar) => self.read_simple(scalar, target),
        }
    }

    fn read_document(&self, target: &TypeInfo, source: &Document, depth: usize) -> MappingResult<Value> {
        let depth = self.descend(depth)?;

        if DocumentReference::is_reference(source) {
            return match self.resolve_reference(source)? {
                Some(resolved) => self.read_document(target, &resolved, depth),
                None => Ok(Value::Null),
            };
        }

        let resolved = self.type_mapper.resolve_type(source, target, self.metadata.as_ref());

        if self.conversions.has_reader(ReadSource::Record, &resolved) {
            if let Some(converted) = self.conversions.read(&Bson::Document(source.clone()), &resolved) {
                return converted;
            }
        }

        match &resolved {
            TypeInfo::Record => Ok(Value::Record(source.clone())),
            TypeInfo::Collection { kind: CollectionKind::Array, .. } if source.is_empty() => {
                Ok(Value::List(Vec::new()))
            }
            TypeInfo::Map { .. } => self.read_map(&resolved, source, depth),
            TypeInfo::Any => self.read_map(
                &TypeInfo::map(TypeInfo::Simple(SimpleType::String), TypeInfo::Any),
                source,
                depth,
            ),
            TypeInfo::Entity(alias) => {
                let entity = self.entity(alias)?;
                self.read_entity(&entity, source, depth)
            }
            other => Err(MappingError::conversion("record", other)),
        }
    }

    fn resolve_reference(&self, pointer: &Document) -> MappingResult<Option<Document>> {
        let reference = DocumentReference::from_document(pointer)
            .ok_or_else(|| MappingError::InvalidRecord(format!("malformed document reference {pointer}")))?;

        trace!(reference = %reference, "resolving document reference");
        let resolved = self.resolver.resolve(&reference)?;

        if resolved.is_none() {
            warn!(reference = %reference, "dangling document reference");
        }

        Ok(resolved)
    }

    fn read_list(&self, target: &TypeInfo, items: &[Bson], depth: usize) -> MappingResult<Value> {
        let depth = self.descend(depth)?;

        let (kind, component) = match target {
            TypeInfo::Collection { kind, element } => (*kind, element.as_ref().clone()),
            TypeInfo::Any => (CollectionKind::List, TypeInfo::Any),
            other => return Err(MappingError::conversion("list", other)),
        };

        let mut values: Vec<Value> = Vec::with_capacity(items.len());

        for item in items {
            let value = self.read_internal(&component, item, depth)?;

            if value.is_null() && is_reference_pointer(item) {
                continue;
            }

            if kind == CollectionKind::Set && values.contains(&value) {
                continue;
            }
            values.push(value);
        }

        Ok(Value::List(values))
    }

    fn read_map(&self, map_type: &TypeInfo, source: &Document, depth: usize) -> MappingResult<Value> {
        let key_type = map_type.component_type().cloned().unwrap_or(TypeInfo::Any);
        let value_type = map_type.map_value_type().cloned().unwrap_or(TypeInfo::Any);
        let mut entries: Vec<(Value, Value)> = Vec::with_capacity(source.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(source.len());

        for (key, value) in source {
            if self.type_mapper.is_type_key(key) {
                continue;
            }

            let key = match &key_type {
                TypeInfo::Any | TypeInfo::Simple(SimpleType::String) => Value::String(key.clone()),
                key_type => self.conversion_service.convert(&Bson::String(key.clone()), key_type)?,
            };
            let value = self.read_internal(&value_type, value, depth)?;

            match positions.entry(format!("{key:?}")) {
                Entry::Occupied(slot) => entries[*slot.get()].1 = value,
                Entry::Vacant(slot) => {
                    slot.insert(entries.len());
                    entries.push((key, value));
                }
            }
        }

        Ok(Value::Map(entries))
    }

    /// Converts a scalar into the declared type.
    fn read_simple(&self, source: &Bson, target: &TypeInfo) -> MappingResult<Value> {
        if matches!(source, Bson::Null | Bson::Undefined) {
            return Ok(Value::Null);
        }

        if let Some(converted) = self.conversions.read(source, target) {
            return converted;
        }

        match target {
            TypeInfo::Any => Value::from_scalar(source)
                .ok_or_else(|| MappingError::conversion(source, target)),
            _ => self.conversion_service.convert(source, target),
        }
    }

    fn read_entity(&self, entity: &PersistentEntity, source: &Document, depth: usize) -> MappingResult<Value> {
        trace!(entity = entity.alias(), "reading entity");

        let constructor = entity
            .constructor()
            .ok_or_else(|| MappingError::MissingConstructor(entity.alias().to_string()))?;
        let context = EvaluationContext::new(source);

        let mut consumed = Vec::with_capacity(constructor.parameters().len());
        let mut arguments = Vec::with_capacity(constructor.parameters().len());

        for parameter in constructor.parameters() {
            let value = match parameter.value_expression() {
                Some(expression) => {
                    let computed = expression.evaluate(&context)?;
                    self.read_internal(parameter.type_info(), &computed, depth)?
                }
                None => {
                    let key = entity
                        .property(parameter.name())
                        .map_or(parameter.name(), PersistentProperty::storage_key);

                    match source.get(key) {
                        Some(stored) => self.read_internal(parameter.type_info(), stored, depth)?,
                        None => Value::Null,
                    }
                }
            };

            consumed.push(parameter.name());
            arguments.push((parameter.name().to_string(), value));
        }

        let mut object = constructor.instantiate(ConstructorArguments::new(arguments))?;

        for property in entity.properties().iter().filter(|p| !p.is_association()) {
            let present = property.value_expression().is_some()
                || source.contains_key(property.storage_key());
            if consumed.contains(&property.name()) || !present {
                continue;
            }

            let value = self.property_value(property, source, &context, depth)?;
            self.set_property(object.as_mut(), property, value)?;
        }

        for property in entity.properties().iter().filter(|p| p.is_association()) {
            if consumed.contains(&property.name()) {
                continue;
            }

            let value = self.property_value(property, source, &context, depth)?;
            if !value.is_null() {
                self.set_property(object.as_mut(), property, value)?;
            }
        }

        Ok(Value::Object(object))
    }

    fn property_value(
        &self,
        property: &PersistentProperty,
        source: &Document,
        context: &EvaluationContext<'_>,
        depth: usize,
    ) -> MappingResult<Value> {
        if let Some(expression) = property.value_expression() {
            let computed = expression.evaluate(context)?;
            return self.read_internal(property.type_info(), &computed, depth);
        }

        match source.get(property.storage_key()) {
            Some(stored) => self.read_internal(property.type_info(), stored, depth),
            None => Ok(Value::Null),
        }
    }

    fn set_property(
        &self,
        object: &mut dyn MappedObject,
        property: &PersistentProperty,
        value: Value,
    ) -> MappingResult<()> {
        let alias = object.type_alias().to_string();

        object
            .set_property(property.name(), value, self.config.access)
            .map_err(|e| MappingError::property_access(alias, property.name(), e))
    }
}

fn is_valid_id_type(type_info: &TypeInfo) -> bool {
    matches!(type_info, TypeInfo::Simple(simple) if simple.is_id_type())
}

fn is_reference_pointer(item: &Bson) -> bool {
    matches!(item, Bson::Document(doc) if DocumentReference::is_reference(doc))
}

fn valid_id_type_names() -> String {
    VALID_ID_TYPES
        .iter()
        .map(SimpleType::name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn invalid_id_type(entity: &PersistentEntity, id_property: &PersistentProperty) -> MappingError {
    MappingError::InvalidIdType(
        entity.alias().to_string(),
        id_property.type_info().to_string(),
        valid_id_type_names(),
    )
}

/// String form of a map key. Only simple keys are allowed.
///
/// Distinct keys with the same string form, such as `1` and `"1"`, land on the same
/// record field and the last one written wins.
fn map_key(key: &Value) -> MappingResult<String> {
    Ok(match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Int32(i) => i.to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Enum(e) => e.variant().to_string(),
        Value::ObjectId(oid) => oid.to_hex(),
        Value::Uuid(uuid) => uuid.to_string(),
        other => return Err(MappingError::ComplexMapKey(other.describe())),
    })
}

/// Assembles a [`MappingConverter`].
///
/// # Example
///
/// ```ignore
/// let converter = MappingConverter::builder(context)
///     .config(ConverterConfig::default().with_type_key(Some("_t".into())))
///     .conversions(conversions)
///     .resolver(store.clone())
///     .build()?;
/// ```
pub struct MappingConverterBuilder {
    metadata: Arc<dyn MappingMetadata>,
    conversions: CustomConversions,
    type_mapper: Option<Arc<dyn TypeMapper>>,
    conversion_service: Arc<dyn ConversionService>,
    resolver: Arc<dyn ReferenceResolver>,
    config: ConverterConfig,
}

impl MappingConverterBuilder {
    pub fn new(metadata: Arc<dyn MappingMetadata>) -> Self {
        Self {
            metadata,
            conversions: CustomConversions::default(),
            type_mapper: None,
            conversion_service: Arc::new(DefaultConversionService),
            resolver: Arc::new(DetachedReferences),
            config: ConverterConfig::default(),
        }
    }

    pub fn config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn conversions(mut self, conversions: CustomConversions) -> Self {
        self.conversions = conversions;
        self
    }

    /// Replaces the type mapper derived from the configured type key.
    pub fn type_mapper(mut self, type_mapper: impl TypeMapper + 'static) -> Self {
        self.type_mapper = Some(Arc::new(type_mapper));
        self
    }

    pub fn conversion_service(mut self, service: impl ConversionService + 'static) -> Self {
        self.conversion_service = Arc::new(service);
        self
    }

    pub fn resolver(mut self, resolver: impl ReferenceResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Builds the converter.
    ///
    /// # Errors
    ///
    /// Fails when a registered entity stores a property under the type key.
    pub fn build(self) -> MappingResult<MappingConverter> {
        let type_mapper = self
            .type_mapper
            .unwrap_or_else(|| Arc::new(DefaultTypeMapper::new(self.config.type_key.clone())));

        if let Some(type_key) = type_mapper.type_key() {
            for alias in self.metadata.aliases() {
                let Some(entity) = self.metadata.persistent_entity(&alias) else {
                    continue;
                };

                if let Some(property) = entity.properties().iter().find(|p| p.storage_key() == type_key) {
                    return Err(MappingError::InvalidMetadata(format!(
                        "property {} of {} uses the reserved type key {type_key}",
                        property.name(),
                        entity.alias()
                    )));
                }
            }
        }

        Ok(MappingConverter {
            metadata: self.metadata,
            conversions: Arc::new(self.conversions),
            type_mapper,
            conversion_service: self.conversion_service,
            resolver: self.resolver,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mapping::{ConstructorParameter, MappingContext, PersistentEntity, PreferredConstructor},
        object::PropertyAccess,
        types::EnumType,
        value::{EnumValue, object_from_value},
    };
    use bson::doc;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Address {
        city: String,
    }

    impl MappedObject for Address {
        fn type_alias(&self) -> &str {
            "test::Address"
        }

        fn property(&self, name: &str, _access: PropertyAccess) -> MappingResult<Value> {
            match name {
                "city" => Ok(self.city.to_value()),
                _ => Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
            }
        }

        fn set_property(&mut self, name: &str, value: Value, _access: PropertyAccess) -> MappingResult<()> {
            match name {
                "city" => self.city = FieldValue::from_value(value)?,
                _ => return Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct HomeAddress {
        city: String,
        owner: String,
    }

    impl MappedObject for HomeAddress {
        fn type_alias(&self) -> &str {
            "test::HomeAddress"
        }

        fn property(&self, name: &str, _access: PropertyAccess) -> MappingResult<Value> {
            match name {
                "city" => Ok(self.city.to_value()),
                "owner" => Ok(self.owner.to_value()),
                _ => Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
            }
        }

        fn set_property(&mut self, name: &str, value: Value, _access: PropertyAccess) -> MappingResult<()> {
            match name {
                "city" => self.city = FieldValue::from_value(value)?,
                "owner" => self.owner = FieldValue::from_value(value)?,
                _ => return Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
            }
            Ok(())
        }
    }

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Person {
        id: Option<String>,
        name: String,
        age: i32,
        address: Option<Box<dyn MappedObject>>,
        nicknames: Vec<String>,
        scores: HashMap<String, i32>,
        mood: Option<Value>,
    }

    impl MappedObject for Person {
        fn type_alias(&self) -> &str {
            "test::Person"
        }

        fn property(&self, name: &str, _access: PropertyAccess) -> MappingResult<Value> {
            match name {
                "id" => Ok(self.id.to_value()),
                "name" => Ok(self.name.to_value()),
                "age" => Ok(self.age.to_value()),
                "address" => Ok(self.address.to_value()),
                "nicknames" => Ok(self.nicknames.to_value()),
                "scores" => Ok(self.scores.to_value()),
                "mood" => Ok(self.mood.to_value()),
                _ => Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
            }
        }

        fn set_property(&mut self, name: &str, value: Value, _access: PropertyAccess) -> MappingResult<()> {
            match name {
                "id" => self.id = FieldValue::from_value(value)?,
                "name" => self.name = FieldValue::from_value(value)?,
                "age" => self.age = FieldValue::from_value(value)?,
                "address" => self.address = FieldValue::from_value(value)?,
                "nicknames" => self.nicknames = FieldValue::from_value(value)?,
                "scores" => self.scores = FieldValue::from_value(value)?,
                "mood" => self.mood = FieldValue::from_value(value)?,
                _ => return Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
            }
            Ok(())
        }
    }

    fn mood() -> EnumType {
        EnumType::new("test::Mood", ["Happy", "Grumpy"])
    }

    fn context() -> MappingContext {
        MappingContext::builder()
            .entity(
                PersistentEntity::builder("test::Address")
                    .property(PersistentProperty::of::<String>("city"))
                    .constructor(PreferredConstructor::of_default::<Address>())
                    .build()
                    .unwrap(),
            )
            .entity(
                PersistentEntity::builder("test::HomeAddress")
                    .supertype("test::Address")
                    .property(PersistentProperty::of::<String>("city"))
                    .property(PersistentProperty::of::<String>("owner"))
                    .constructor(PreferredConstructor::of_default::<HomeAddress>())
                    .build()
                    .unwrap(),
            )
            .entity(
                PersistentEntity::builder("test::Person")
                    .property(PersistentProperty::of::<Option<String>>("id").id())
                    .property(PersistentProperty::of::<String>("name"))
                    .property(PersistentProperty::of::<i32>("age").field_name("years"))
                    .property(PersistentProperty::new("address", TypeInfo::entity("test::Address")))
                    .property(PersistentProperty::of::<Vec<String>>("nicknames"))
                    .property(PersistentProperty::of::<HashMap<String, i32>>("scores"))
                    .property(PersistentProperty::new("mood", TypeInfo::Enum(mood())))
                    .constructor(PreferredConstructor::new(
                        vec![ConstructorParameter::of::<String>("name")],
                        |mut args| {
                            Ok(Box::new(Person { name: args.take("name")?, ..Person::default() }))
                        },
                    ))
                    .build()
                    .unwrap(),
            )
            .build()
    }

    fn converter() -> MappingConverter {
        MappingConverter::builder(context()).build().unwrap()
    }

    fn ada() -> Person {
        Person {
            id: None,
            name: "Ada".into(),
            age: 36,
            address: Some(Box::new(Address { city: "London".into() })),
            nicknames: vec!["Countess".into()],
            scores: HashMap::from([("math".to_string(), 10)]),
            mood: Some(Value::Enum(EnumValue::new("test::Mood", "Happy"))),
        }
    }

    #[test]
    fn writes_type_key_first_and_skips_declared_nested_types() {
        let record = converter().write_document(&Value::object(ada())).unwrap();

        assert_eq!(
            record,
            doc! {
                "_class": "test::Person",
                "name": "Ada",
                "years": 36,
                "address": { "city": "London" },
                "nicknames": ["Countess"],
                "scores": { "math": 10 },
                "mood": "Happy",
            }
        );
    }

    #[test]
    fn round_trips_through_constructor_and_setters() {
        let converter = converter();
        let record = converter.write_document(&Value::object(ada())).unwrap();

        let back: Box<dyn MappedObject> = FieldValue::from_value(
            converter.read_value(&TypeInfo::entity("test::Person"), &Bson::Document(record)).unwrap(),
        )
        .unwrap();

        assert_eq!(back.downcast_ref::<Person>(), Some(&ada()));
    }

    #[test]
    fn hex_string_ids_are_stored_as_object_ids() {
        let oid = ObjectId::new();
        let person = Person { id: Some(oid.to_hex()), ..ada() };
        let record = converter().write_document(&Value::object(person)).unwrap();

        assert_eq!(record.get("_id"), Some(&Bson::ObjectId(oid)));

        let back = object_from_value::<Person>(
            converter().read_value(&TypeInfo::entity("test::Person"), &Bson::Document(record)).unwrap(),
        )
        .unwrap();
        assert_eq!(back.id, Some(oid.to_hex()));
    }

    #[test]
    fn plain_string_ids_stay_strings() {
        let person = Person { id: Some("ada".into()), ..ada() };
        let record = converter().write_document(&Value::object(person)).unwrap();
        assert_eq!(record.get("_id"), Some(&Bson::String("ada".into())));
    }

    #[test]
    fn subtypes_carry_the_type_key_and_read_back_polymorphically() {
        let converter = converter();
        let person = Person {
            address: Some(Box::new(HomeAddress { city: "Paris".into(), owner: "Ada".into() })),
            ..ada()
        };

        let record = converter.write_document(&Value::object(person.clone())).unwrap();
        assert_eq!(
            record.get_document("address").unwrap(),
            &doc! { "_class": "test::HomeAddress", "city": "Paris", "owner": "Ada" }
        );

        let back = object_from_value::<Person>(
            converter.read_value(&TypeInfo::entity("test::Person"), &Bson::Document(record)).unwrap(),
        )
        .unwrap();
        assert_eq!(back, person);
    }

    #[test]
    fn unknown_enum_variant_fails() {
        let record = doc! { "name": "Ada", "mood": "Sleepy" };
        let err = converter()
            .read_value(&TypeInfo::entity("test::Person"), &Bson::Document(record))
            .unwrap_err();

        assert!(matches!(
            err,
            MappingError::PropertyAccess { .. } | MappingError::UnknownEnumVariant(..)
        ));
    }

    #[test]
    fn complex_map_keys_are_rejected() {
        let value = Value::Map(vec![(Value::object(Address::default()), Value::Int32(1))]);
        let err = converter().write_document(&value).unwrap_err();
        assert!(matches!(err, MappingError::ComplexMapKey(_)));
    }

    #[test]
    fn maps_write_simple_keys_as_strings() {
        let value = Value::Map(vec![
            (Value::Int32(1), Value::from("one")),
            (Value::Enum(EnumValue::new("test::Mood", "Happy")), Value::Bool(true)),
        ]);
        let record = converter().write_document(&value).unwrap();
        assert_eq!(record, doc! { "1": "one", "Happy": true });
    }

    #[test]
    fn keys_with_the_same_string_form_collapse_to_the_last() {
        let value = Value::Map(vec![
            (Value::Int32(1), Value::from("number")),
            (Value::from("1"), Value::from("text")),
        ]);
        let record = converter().write_document(&value).unwrap();
        assert_eq!(record, doc! { "1": "text" });
    }

    #[test]
    fn scalar_sinks_are_rejected_and_null_writes_nothing() {
        let converter = converter();
        let mut scalar = Bson::Int32(1);
        assert!(matches!(
            converter.write(&Value::object(ada()), &mut scalar),
            Err(MappingError::InvalidRecord(_))
        ));

        let mut sink = Bson::Document(Document::new());
        converter.write(&Value::Null, &mut sink).unwrap();
        assert_eq!(sink, Bson::Document(Document::new()));
    }

    #[test]
    fn list_sinks_receive_elements_without_type_key() {
        let mut sink = Bson::Array(Vec::new());
        converter()
            .write(&Value::List(vec![Value::Int32(1), Value::Null, Value::object(Address { city: "Rome".into() })]), &mut sink)
            .unwrap();

        assert_eq!(
            sink,
            Bson::Array(vec![
                Bson::Int32(1),
                Bson::Document(doc! { "_class": "test::Address", "city": "Rome" }),
            ])
        );
    }

    #[test]
    fn any_target_reads_untyped_records_as_string_maps() {
        let value = converter()
            .read_value(&TypeInfo::Any, &Bson::Document(doc! { "a": 1, "b": [true] }))
            .unwrap();

        assert_eq!(
            value,
            Value::Map(vec![
                (Value::from("a"), Value::Int32(1)),
                (Value::from("b"), Value::List(vec![Value::Bool(true)])),
            ])
        );
    }

    #[test]
    fn empty_record_reads_as_empty_array() {
        let value = converter()
            .read_value(&TypeInfo::array(TypeInfo::Simple(SimpleType::Int32)), &Bson::Document(Document::new()))
            .unwrap();
        assert_eq!(value, Value::List(Vec::new()));
    }

    #[test]
    fn sets_are_deduplicated() {
        let value = converter()
            .read_value(
                &TypeInfo::set(TypeInfo::Simple(SimpleType::Int64)),
                &Bson::Array(vec![Bson::Int32(1), Bson::Int64(1), Bson::Int32(2)]),
            )
            .unwrap();
        assert_eq!(value, Value::List(vec![Value::Int64(1), Value::Int64(2)]));
    }

    #[test]
    fn map_reading_skips_type_key_and_converts_keys() {
        let map_type = TypeInfo::map(TypeInfo::Simple(SimpleType::Int32), TypeInfo::Simple(SimpleType::String));
        let value = converter()
            .read_value(&map_type, &Bson::Document(doc! { "_class": "x", "1": "one", "01": "uno" }))
            .unwrap();

        assert_eq!(value, Value::Map(vec![(Value::Int32(1), Value::from("uno"))]));
    }

    #[test]
    fn missing_metadata_names_the_alias() {
        #[derive(Debug, Clone, PartialEq)]
        struct Stranger;

        impl MappedObject for Stranger {
            fn type_alias(&self) -> &str {
                "test::Stranger"
            }
        }

        let err = converter().write_document(&Value::object(Stranger)).unwrap_err();
        assert_eq!(err, MappingError::MissingMetadata("test::Stranger".into()));
    }

    #[test]
    fn depth_is_bounded() {
        let converter = MappingConverter::builder(context())
            .config(ConverterConfig::default().with_max_depth(3))
            .build()
            .unwrap();

        let mut nested = Value::Int32(0);
        for _ in 0..10 {
            nested = Value::List(vec![nested]);
        }

        let mut sink = Bson::Array(Vec::new());
        assert_eq!(converter.write(&nested, &mut sink), Err(MappingError::DepthExceeded(3)));
    }

    #[test]
    fn generic_record_form() {
        let converter = converter();
        assert_eq!(converter.convert_to_generic_record_form(&Value::Null).unwrap(), Bson::Null);
        assert_eq!(
            converter
                .convert_to_generic_record_form(&Value::List(vec![
                    Value::Enum(EnumValue::new("test::Mood", "Grumpy")),
                    Value::Map(vec![(Value::Int64(7), Value::object(Address { city: "Oslo".into() }))]),
                ]))
                .unwrap(),
            Bson::Array(vec![
                Bson::String("Grumpy".into()),
                Bson::Document(doc! { "7": { "_class": "test::Address", "city": "Oslo" } }),
            ])
        );
    }

    #[test]
    fn type_key_collisions_are_rejected() {
        let context = MappingContext::builder()
            .entity(
                PersistentEntity::builder("test::Clash")
                    .property(PersistentProperty::of::<String>("kind").field_name("_class"))
                    .build()
                    .unwrap(),
            )
            .build();

        assert!(matches!(
            MappingConverter::builder(context).build(),
            Err(MappingError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn complex_identifier_values_name_the_entity() {
        #[derive(Debug, Clone, PartialEq)]
        struct Badge;

        impl MappedObject for Badge {
            fn type_alias(&self) -> &str {
                "test::Badge"
            }

            fn property(&self, _name: &str, _access: PropertyAccess) -> MappingResult<Value> {
                Ok(Value::List(vec![Value::from("a"), Value::from("b")]))
            }
        }

        let context = MappingContext::builder()
            .entity(
                PersistentEntity::builder("test::Badge")
                    .property(PersistentProperty::of::<String>("id").id())
                    .build()
                    .unwrap(),
            )
            .build();
        let converter = MappingConverter::builder(context).build().unwrap();

        let err = converter.write_document(&Value::object(Badge)).unwrap_err();
        assert!(matches!(
            err,
            MappingError::InvalidIdType(ref alias, ref found, _) if alias == "test::Badge" && found == "list"
        ));
    }

    #[test]
    fn disabled_type_key_writes_no_discriminator() {
        let converter = MappingConverter::builder(context())
            .config(ConverterConfig::default().with_type_key(None))
            .build()
            .unwrap();

        let record = converter.write_document(&Value::object(Address { city: "Rome".into() })).unwrap();
        assert_eq!(record, doc! { "city": "Rome" });
        assert!(!converter.is_type_key("_class"));
    }
}
