//! In-memory document source for docmap.
//!
//! This crate provides [`InMemoryDocumentSource`], a thread-safe map of records keyed
//! by database, collection and identifier. It implements the core `ReferenceResolver`
//! trait, so a converter configured with it can dereference document references
//! without a running database. It is meant for development and testing.
//!
//! # Quick Start
//!
//! ```ignore
//! use docmap::{prelude::*, memory::InMemoryDocumentSource};
//!
//! let source = InMemoryDocumentSource::new();
//! let converter = MappingConverter::builder(context)
//!     .resolver(source.clone())
//!     .build()?;
//!
//! // Store the referenced account so pointers to it resolve.
//! source.save(&converter, &Value::object(account.clone()))?;
//!
//! let record = converter.write_document(&Value::object(person.clone()))?;
//! let back: Person = converter.read(&record)?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_memory;

pub mod source;

pub use source::{InMemoryDocumentSource, InMemoryDocumentSourceBuilder};
