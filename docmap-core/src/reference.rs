//! Document references.
//!
//! An association declared as a reference is stored as a small pointer record
//! `{ "$ref": collection, "$id": id, "$db": database }` instead of being embedded.
//! The referencing record owns the pointer; the target document lives in its own
//! collection and is fetched through a [`ReferenceResolver`] on read.

use bson::{Bson, Document};
use std::fmt::{self, Debug};

use crate::error::{MappingError, MappingResult};

const REF_KEY: &str = "$ref";
const ID_KEY: &str = "$id";
const DB_KEY: &str = "$db";

/// A pointer to a top-level document in another collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentReference {
    collection: String,
    id: Bson,
    database: Option<String>,
}

impl DocumentReference {
    pub fn new(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self { collection: collection.into(), id: id.into(), database: None }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &Bson {
        &self.id
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// The stored pointer form. `$db` is present only when a database was given.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(REF_KEY, self.collection.clone());
        doc.insert(ID_KEY, self.id.clone());
        if let Some(database) = &self.database {
            doc.insert(DB_KEY, database.clone());
        }
        doc
    }

    /// Recognizes a pointer record. Requires a string `$ref` and an `$id`.
    pub fn from_document(doc: &Document) -> Option<Self> {
        let collection = doc.get_str(REF_KEY).ok()?;
        let id = doc.get(ID_KEY)?;

        Some(Self {
            collection: collection.to_string(),
            id: id.clone(),
            database: doc.get_str(DB_KEY).ok().map(str::to_string),
        })
    }

    pub fn is_reference(doc: &Document) -> bool {
        matches!(doc.get(REF_KEY), Some(Bson::String(_))) && doc.contains_key(ID_KEY)
    }
}

impl fmt::Display for DocumentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{database}.{}#{}", self.collection, self.id),
            None => write!(f, "{}#{}", self.collection, self.id),
        }
    }
}

/// Dereferences document pointers.
pub trait ReferenceResolver: Send + Sync + Debug {
    /// Fetches the target document. `Ok(None)` means the target no longer exists.
    fn resolve(&self, reference: &DocumentReference) -> MappingResult<Option<Document>>;
}

/// A resolver for converters with no store attached: every lookup fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedReferences;

impl ReferenceResolver for DetachedReferences {
    fn resolve(&self, reference: &DocumentReference) -> MappingResult<Option<Document>> {
        Err(MappingError::UnresolvableReference(reference.to_string()))
    }
}
