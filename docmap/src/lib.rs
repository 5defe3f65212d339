//! Main docmap crate: object-document mapping for BSON document stores.
//!
//! This crate is the primary entry point. It re-exports the mapping converter and
//! its collaborators from `docmap-core`, the derive macros from `docmap-macros`, and
//! the in-memory document source from `docmap-memory`.
//!
//! # Features
//!
//! - **Derived mapping metadata** - `#[derive(Entity)]` and `#[derive(MappedEnum)]`
//! - **Polymorphic values** - A type key records the concrete type of nested objects
//! - **Document references** - Associations stored as `$ref`/`$id` pointers
//! - **Custom conversions** - Per-type writers and readers, including serde-backed ones
//! - **Computed values** - Expressions evaluated against the source record on read
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Default, Entity)]
//! pub struct User {
//!     #[docmap(id)]
//!     pub id: Option<String>,
//!     pub name: String,
//!     #[docmap(field = "years")]
//!     pub age: i32,
//! }
//!
//! let context = MappingContext::builder().register::<User>()?.build();
//! let converter = MappingConverter::builder(context).build()?;
//!
//! let user = User { id: None, name: "Alice".into(), age: 33 };
//! let record = converter.write_document(&Value::object(user.clone()))?;
//! // { "_class": "app::User", "name": "Alice", "years": 33 }
//!
//! let back: User = converter.read(&record)?;
//! assert_eq!(back, user);
//! ```
//!
//! # Configuration
//!
//! ```ignore
//! let config = ConverterConfig::from_json(r#"{ "type_key": "_t", "access": "accessor" }"#)?;
//! let converter = MappingConverter::builder(context).config(config).build()?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap;

pub mod prelude;

pub use docmap_core::{
    config, conversion, conversions, converter, error, expression, mapping, object, reference,
    type_mapper, types, value,
};
pub use docmap_macros::{Entity, MappedEnum};

// Re-export BSON types for convenience
pub use bson;

/// In-memory document source.
pub mod memory {
    pub use docmap_memory::{InMemoryDocumentSource, InMemoryDocumentSourceBuilder};
}
