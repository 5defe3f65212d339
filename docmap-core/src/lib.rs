//! Object-document mapping between Rust domain types and BSON records.
//!
//! This crate is the core of the docmap project and provides:
//!
//! - **Domain values** ([`value`], [`object`]) - The value tree the converter walks and the trait domain objects implement
//! - **Type information** ([`types`]) - Declared types of properties, elements and map values
//! - **Mapping metadata** ([`mapping`]) - Entities, properties, constructors and the registry holding them
//! - **Mapping converter** ([`converter`]) - The recursive write and read paths
//! - **Type mapper** ([`type_mapper`]) - Type discriminators for polymorphic values
//! - **Custom conversions** ([`conversions`]) - User-registered converters consulted first
//! - **Conversion service** ([`conversion`]) - Scalar-to-scalar conversion
//! - **Document references** ([`reference`]) - Pointers to documents in other collections
//! - **Expressions** ([`expression`]) - Computed values bound to properties
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docmap_core::{
//!     converter::MappingConverter,
//!     mapping::MappingContext,
//!     value::Value,
//! };
//!
//! let context = MappingContext::builder().register::<User>()?.build();
//! let converter = MappingConverter::builder(context).build()?;
//!
//! let record = converter.write_document(&Value::object(user.clone()))?;
//! let back: User = converter.read(&record)?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_core;

pub mod config;
pub mod conversion;
pub mod conversions;
pub mod converter;
pub mod error;
pub mod expression;
pub mod mapping;
pub mod object;
pub mod reference;
pub mod type_mapper;
pub mod types;
pub mod value;
