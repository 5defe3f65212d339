//! In-memory record storage used to resolve document references.
//!
//! Records are kept as BSON documents in nested maps
//! (`database -> collection -> id -> record`) behind a read-write lock.

use bson::{Bson, Document};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::trace;

use docmap_core::{
    converter::MappingConverter,
    error::{MappingError, MappingResult},
    mapping::ID_FIELD,
    reference::{DocumentReference, ReferenceResolver},
    value::Value,
};

type CollectionMap = HashMap<String, Document>;
type DatabaseMap = HashMap<String, CollectionMap>;
type SourceMap = HashMap<String, DatabaseMap>;

const DEFAULT_DATABASE: &str = "default";

/// Thread-safe in-memory record storage.
///
/// `InMemoryDocumentSource` is cloneable and shares its state between clones, so one
/// clone can be handed to a converter as its resolver while another is used to seed
/// records.
///
/// Identifiers are compared by value and BSON type: a record stored under the
/// `Int32` id `1` is not found through an `Int64` id `1`.
///
/// # Example
///
/// ```ignore
/// use docmap_memory::InMemoryDocumentSource;
/// use bson::doc;
///
/// let source = InMemoryDocumentSource::new();
/// source.insert("person", doc! { "_id": 1, "name": "Ada" })?;
/// assert!(source.get("person", &1.into()).is_some());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDocumentSource {
    records: Arc<RwLock<SourceMap>>,
    default_database: String,
}

impl Default for InMemoryDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentSource {
    /// Creates an empty source whose default database is `"default"`.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> InMemoryDocumentSourceBuilder {
        InMemoryDocumentSourceBuilder::default()
    }

    /// The database used for records and references that do not name one.
    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    /// Stores a record in the default database, replacing any record with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::InvalidRecord`] if the record has no `_id`.
    pub fn insert(&self, collection: &str, record: Document) -> MappingResult<()> {
        let database = self.default_database.clone();
        self.insert_into(&database, collection, record)
    }

    /// Stores a record in the named database.
    pub fn insert_into(&self, database: &str, collection: &str, record: Document) -> MappingResult<()> {
        let id = record
            .get(ID_FIELD)
            .ok_or_else(|| MappingError::InvalidRecord(format!("record for {collection} has no {ID_FIELD}")))?;
        let key = id_key(id);

        trace!(database, collection, id = %key, "storing record");

        self.records
            .write()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .insert(key, record);

        Ok(())
    }

    /// Writes a domain object with the converter and stores it in its entity's collection.
    ///
    /// Returns the stored identifier.
    pub fn save(&self, converter: &MappingConverter, value: &Value) -> MappingResult<Bson> {
        let Value::Object(object) = value else {
            return Err(MappingError::InvalidRecord(format!(
                "only objects can be saved, got {}",
                value.runtime_type()
            )));
        };

        let entity = converter
            .metadata()
            .persistent_entity(object.type_alias())
            .ok_or_else(|| MappingError::MissingMetadata(object.type_alias().to_string()))?;

        let record = converter.write_document(value)?;
        let id = record
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| MappingError::InvalidRecord(format!("{} was written without an id", entity.alias())))?;

        self.insert(entity.collection(), record)?;

        Ok(id)
    }

    /// Returns the record with the given id from the default database.
    pub fn get(&self, collection: &str, id: &Bson) -> Option<Document> {
        self.get_from(&self.default_database, collection, id)
    }

    pub fn get_from(&self, database: &str, collection: &str, id: &Bson) -> Option<Document> {
        self.records
            .read()
            .get(database)
            .and_then(|collections| collections.get(collection))
            .and_then(|records| records.get(&id_key(id)))
            .cloned()
    }

    /// Removes and returns the record with the given id from the default database.
    pub fn remove(&self, collection: &str, id: &Bson) -> Option<Document> {
        self.records
            .write()
            .get_mut(&self.default_database)
            .and_then(|collections| collections.get_mut(collection))
            .and_then(|records| records.remove(&id_key(id)))
    }

    /// Number of records in a collection of the default database.
    pub fn count(&self, collection: &str) -> usize {
        self.records
            .read()
            .get(&self.default_database)
            .and_then(|collections| collections.get(collection))
            .map_or(0, HashMap::len)
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl ReferenceResolver for InMemoryDocumentSource {
    fn resolve(&self, reference: &DocumentReference) -> MappingResult<Option<Document>> {
        let database = reference.database().unwrap_or(&self.default_database);
        let record = self.get_from(database, reference.collection(), reference.id());

        trace!(reference = %reference, found = record.is_some(), "resolved reference");

        Ok(record)
    }
}

fn id_key(id: &Bson) -> String {
    format!("{id:?}")
}

/// Builder for [`InMemoryDocumentSource`].
#[derive(Debug, Default)]
pub struct InMemoryDocumentSourceBuilder {
    default_database: Option<String>,
}

impl InMemoryDocumentSourceBuilder {
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    pub fn build(self) -> InMemoryDocumentSource {
        InMemoryDocumentSource {
            records: Arc::new(RwLock::new(SourceMap::new())),
            default_database: self.default_database.unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    #[test]
    fn insert_get_remove() {
        let source = InMemoryDocumentSource::new();
        let id = ObjectId::new();

        source.insert("person", doc! { "_id": id, "name": "Ada" }).unwrap();
        assert_eq!(source.count("person"), 1);
        assert_eq!(
            source.get("person", &Bson::ObjectId(id)),
            Some(doc! { "_id": id, "name": "Ada" })
        );

        source.insert("person", doc! { "_id": id, "name": "Grace" }).unwrap();
        assert_eq!(source.count("person"), 1);

        assert!(source.remove("person", &Bson::ObjectId(id)).is_some());
        assert!(source.get("person", &Bson::ObjectId(id)).is_none());
    }

    #[test]
    fn records_need_an_id() {
        let source = InMemoryDocumentSource::new();
        assert!(matches!(
            source.insert("person", doc! { "name": "Ada" }),
            Err(MappingError::InvalidRecord(_))
        ));
    }

    #[test]
    fn ids_compare_by_type() {
        let source = InMemoryDocumentSource::new();
        source.insert("counter", doc! { "_id": 1_i32 }).unwrap();

        assert!(source.get("counter", &Bson::Int32(1)).is_some());
        assert!(source.get("counter", &Bson::Int64(1)).is_none());
        assert!(source.get("counter", &Bson::String("1".into())).is_none());
    }

    #[test]
    fn resolves_by_database() {
        let source = InMemoryDocumentSource::builder().default_database("app").build();
        source.insert("person", doc! { "_id": "p1", "db": "app" }).unwrap();
        source.insert_into("archive", "person", doc! { "_id": "p1", "db": "archive" }).unwrap();

        let local = source.resolve(&DocumentReference::new("person", "p1")).unwrap();
        assert_eq!(local.unwrap().get_str("db").unwrap(), "app");

        let remote = source
            .resolve(&DocumentReference::new("person", "p1").with_database("archive"))
            .unwrap();
        assert_eq!(remote.unwrap().get_str("db").unwrap(), "archive");

        assert!(source.resolve(&DocumentReference::new("person", "p2")).unwrap().is_none());
    }

    #[test]
    fn clones_share_records() {
        let source = InMemoryDocumentSource::new();
        let clone = source.clone();

        clone.insert("tag", doc! { "_id": "t" }).unwrap();
        assert_eq!(source.count("tag"), 1);

        source.clear();
        assert_eq!(clone.count("tag"), 0);
    }
}
