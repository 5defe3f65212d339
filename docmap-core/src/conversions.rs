//! User-registered conversions between domain types and store forms.
//!
//! Custom conversions are consulted before any structural conversion. Writers are
//! keyed by the runtime type name of the value being written (an entity alias, an
//! enum name, or a simple type name such as `"string"`). Readers are keyed by the
//! raw name of the target type.
//!
//! # Example
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! let conversions = CustomConversions::builder()
//!     .scalar_writer("app::Money", |value| match value {
//!         Value::Object(object) => Ok(Bson::String(format!("{:?}", object))),
//!         other => Err(MappingError::conversion(other.runtime_type(), "app::Money")),
//!     })
//!     .scalar_reader("app::Money", |bson| Money::parse(bson).map(Value::object))
//!     .serde_writer::<Point>("app::Point")
//!     .serde_reader::<Point>("app::Point")
//!     .build();
//! ```

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    error::{MappingError, MappingResult},
    object::MappedObject,
    types::TypeInfo,
    value::Value,
};

/// What a writing converter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// A nested record (`Document`).
    Record,
    /// A single scalar; the source type is then treated as simple.
    Scalar,
}

/// What a reading converter consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Record,
    Scalar,
}

type WriteFn = dyn Fn(&Value) -> MappingResult<Bson> + Send + Sync;
type ReadFn = dyn Fn(&Bson) -> MappingResult<Value> + Send + Sync;

#[derive(Clone)]
struct Writer {
    target: WriteTarget,
    convert: Arc<WriteFn>,
}

#[derive(Clone)]
struct Reader {
    source: ReadSource,
    convert: Arc<ReadFn>,
}

/// Immutable registry of custom conversions.
#[derive(Clone, Default)]
pub struct CustomConversions {
    writers: HashMap<String, Writer>,
    readers: HashMap<String, Reader>,
}

impl CustomConversions {
    pub fn builder() -> CustomConversionsBuilder {
        CustomConversionsBuilder::default()
    }

    /// The target of the writer registered for `type_name`.
    pub fn write_target(&self, type_name: &str) -> Option<WriteTarget> {
        self.writers.get(type_name).map(|w| w.target)
    }

    /// Whether values of `type_name` are written as a single scalar.
    pub fn is_simple_type(&self, type_name: &str) -> bool {
        self.write_target(type_name) == Some(WriteTarget::Scalar)
    }

    /// Whether a reader from `source` into `target` is registered.
    pub fn has_reader(&self, source: ReadSource, target: &TypeInfo) -> bool {
        self.readers
            .get(target.raw_name())
            .is_some_and(|r| r.source == source)
    }

    /// Applies the writer registered for the value's runtime type.
    ///
    /// Returns `None` when no writer is registered.
    pub fn write(&self, value: &Value) -> Option<MappingResult<Bson>> {
        let writer = self.writers.get(value.runtime_type())?;
        let result = (writer.convert)(value);

        Some(match (writer.target, result) {
            (WriteTarget::Record, Ok(Bson::Document(doc))) => Ok(Bson::Document(doc)),
            (WriteTarget::Record, Ok(other)) => Err(MappingError::InvalidRecord(format!(
                "writer for {} produced {other} instead of a record",
                value.runtime_type()
            ))),
            (_, result) => result,
        })
    }

    /// Applies the reader registered for `target`, if it accepts the source's shape.
    pub fn read(&self, source: &Bson, target: &TypeInfo) -> Option<MappingResult<Value>> {
        let reader = self.readers.get(target.raw_name())?;
        let shape = match source {
            Bson::Document(_) => ReadSource::Record,
            _ => ReadSource::Scalar,
        };

        (reader.source == shape).then(|| (reader.convert)(source))
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty() && self.readers.is_empty()
    }
}

impl fmt::Debug for CustomConversions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomConversions")
            .field("writers", &self.writers.keys().collect::<Vec<_>>())
            .field("readers", &self.readers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct CustomConversionsBuilder {
    writers: HashMap<String, Writer>,
    readers: HashMap<String, Reader>,
}

impl CustomConversionsBuilder {
    /// Registers a writer for values whose runtime type is `type_name`.
    ///
    /// A [`WriteTarget::Record`] writer must produce a document.
    pub fn writer<F>(mut self, type_name: impl Into<String>, target: WriteTarget, convert: F) -> Self
    where
        F: Fn(&Value) -> MappingResult<Bson> + Send + Sync + 'static,
    {
        self.writers
            .insert(type_name.into(), Writer { target, convert: Arc::new(convert) });
        self
    }

    pub fn record_writer<F>(self, type_name: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&Value) -> MappingResult<Document> + Send + Sync + 'static,
    {
        self.writer(type_name, WriteTarget::Record, move |value| {
            convert(value).map(Bson::Document)
        })
    }

    pub fn scalar_writer<F>(self, type_name: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&Value) -> MappingResult<Bson> + Send + Sync + 'static,
    {
        self.writer(type_name, WriteTarget::Scalar, convert)
    }

    /// Registers a reader producing values of the type named `target`.
    pub fn reader<F>(mut self, target: impl Into<String>, source: ReadSource, convert: F) -> Self
    where
        F: Fn(&Bson) -> MappingResult<Value> + Send + Sync + 'static,
    {
        self.readers
            .insert(target.into(), Reader { source, convert: Arc::new(convert) });
        self
    }

    pub fn record_reader<F>(self, target: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&Document) -> MappingResult<Value> + Send + Sync + 'static,
    {
        self.reader(target, ReadSource::Record, move |bson| match bson {
            Bson::Document(doc) => convert(doc),
            other => Err(MappingError::InvalidRecord(format!("expected a record, found {other}"))),
        })
    }

    pub fn scalar_reader<F>(self, target: impl Into<String>, convert: F) -> Self
    where
        F: Fn(&Bson) -> MappingResult<Value> + Send + Sync + 'static,
    {
        self.reader(target, ReadSource::Scalar, convert)
    }

    /// Writes objects of type `T` through their `serde` implementation.
    ///
    /// `T` must serialize to a struct; the result is written as a nested record.
    pub fn serde_writer<T>(self, alias: impl Into<String>) -> Self
    where
        T: MappedObject + Serialize,
    {
        let alias = alias.into();
        let target = alias.clone();

        self.writer(alias, WriteTarget::Record, move |value| {
            let object = match value {
                Value::Object(object) => object.downcast_ref::<T>(),
                _ => None,
            }
            .ok_or_else(|| MappingError::conversion(value.describe(), &target))?;

            Ok(serialize_to_bson(object)?)
        })
    }

    /// Reads objects of type `T` through their `serde` implementation.
    pub fn serde_reader<T>(self, alias: impl Into<String>) -> Self
    where
        T: MappedObject + DeserializeOwned,
    {
        self.reader(alias, ReadSource::Record, |bson| {
            let object: T = deserialize_from_bson(bson.clone())?;
            Ok(Value::object(object))
        })
    }

    pub fn build(self) -> CustomConversions {
        CustomConversions { writers: self.writers, readers: self.readers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimpleType;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl MappedObject for Point {
        fn type_alias(&self) -> &str {
            "geo::Point"
        }
    }

    #[test]
    fn serde_bridge_round_trip() {
        let conversions = CustomConversions::builder()
            .serde_writer::<Point>("geo::Point")
            .serde_reader::<Point>("geo::Point")
            .build();

        let written = conversions
            .write(&Value::object(Point { x: 1, y: 2 }))
            .unwrap()
            .unwrap();
        assert_eq!(written, Bson::Document(doc! { "x": 1, "y": 2 }));
        assert_eq!(conversions.write_target("geo::Point"), Some(WriteTarget::Record));

        let read = conversions
            .read(&written, &TypeInfo::entity("geo::Point"))
            .unwrap()
            .unwrap();
        assert_eq!(read, Value::object(Point { x: 1, y: 2 }));
    }

    #[test]
    fn readers_match_source_shape() {
        let conversions = CustomConversions::builder()
            .scalar_reader("string", |bson| Ok(Value::String(format!("<{bson}>"))))
            .build();
        let string = TypeInfo::Simple(SimpleType::String);

        assert!(conversions.has_reader(ReadSource::Scalar, &string));
        assert!(conversions.read(&Bson::Document(doc! {}), &string).is_none());
        assert_eq!(
            conversions.read(&Bson::Int32(1), &string).unwrap().unwrap(),
            Value::String("<1>".into())
        );
    }

    #[test]
    fn record_writer_must_produce_a_record() {
        let conversions = CustomConversions::builder()
            .writer("i32", WriteTarget::Record, |_| Ok(Bson::Int32(0)))
            .build();

        assert!(matches!(
            conversions.write(&Value::Int32(4)),
            Some(Err(MappingError::InvalidRecord(_)))
        ));
        assert!(conversions.write(&Value::Bool(true)).is_none());
    }
}
