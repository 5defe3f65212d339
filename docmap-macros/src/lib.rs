//! Procedural macros for the docmap project.
//!
//! - `#[derive(Entity)]` describes a named-field struct to the mapping converter. It
//!   generates the `Entity`, `MappedObject` and `FieldValue` implementations.
//! - `#[derive(MappedEnum)]` maps a unit enum to and from its variant names.
//!
//! Both are configured through `#[docmap(...)]` attributes. Entities must be `Clone`,
//! `Debug` and `PartialEq`, and `Default` unless they use `constructor`. Mapped enums
//! must be `Copy`. A `getter` returns the field's type (by value or by reference)
//! and a `setter` takes it by value; both are used only under
//! `PropertyAccess::Accessor`.
//!
//! ```ignore
//! use docmap::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, Entity)]
//! #[docmap(collection = "people", constructor)]
//! pub struct Person {
//!     #[docmap(id)]
//!     pub id: Option<String>,
//!     pub name: String,
//!     #[docmap(field = "years")]
//!     pub age: i32,
//!     #[docmap(reference(collection = "accounts"))]
//!     pub account: Option<Account>,
//!     #[docmap(declared = "app::Shape")]
//!     pub shape: Option<Box<dyn MappedObject>>,
//!     #[docmap(transient)]
//!     pub scratch: String,
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, MappedEnum)]
//! pub enum Mood {
//!     Happy,
//!     Grumpy,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmap_macros;

use proc_macro::TokenStream;

mod attr;
mod entity;
mod mapped_enum;

#[proc_macro_derive(Entity, attributes(docmap))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive_entity(input.into()).into()
}

#[proc_macro_derive(MappedEnum, attributes(docmap))]
pub fn derive_mapped_enum(input: TokenStream) -> TokenStream {
    mapped_enum::derive_mapped_enum(input.into()).into()
}
