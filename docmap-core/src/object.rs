//! Core traits for domain objects handled by the mapping converter.
//!
//! A [`MappedObject`] is a domain instance the converter can inspect and populate by
//! property name. Implementations are usually generated with `#[derive(Entity)]`, but
//! they can be written by hand for types whose layout does not fit the derive.
//!
//! The [`AnyObject`] super-trait is implemented automatically for every cloneable,
//! comparable `MappedObject` and provides the type-erased plumbing (downcasting,
//! cloning boxed objects, equality across trait objects).

use serde::{Deserialize, Serialize};
use std::{any::Any, fmt::Debug};

use crate::{
    error::{MappingError, MappingResult},
    value::Value,
};

/// How property values are read from and written to a mapped object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyAccess {
    /// Always go straight to the underlying field.
    #[default]
    Field,
    /// Go through accessor methods where the type declares them.
    Accessor,
}

/// A domain object the converter can read properties from and write properties to.
///
/// # Example
///
/// ```ignore
/// use docmap::prelude::*;
///
/// #[derive(Debug, Clone, PartialEq, Default)]
/// pub struct Tag {
///     pub label: String,
/// }
///
/// impl MappedObject for Tag {
///     fn type_alias(&self) -> &str {
///         "app::Tag"
///     }
///
///     fn property(&self, name: &str, _access: PropertyAccess) -> MappingResult<Value> {
///         match name {
///             "label" => Ok(self.label.to_value()),
///             _ => Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
///         }
///     }
///
///     fn set_property(&mut self, name: &str, value: Value, _access: PropertyAccess) -> MappingResult<()> {
///         match name {
///             "label" => self.label = FieldValue::from_value(value)?,
///             _ => return Err(MappingError::UnknownProperty(self.type_alias().into(), name.into())),
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait MappedObject: AnyObject {
    /// Returns the alias of this object's concrete type.
    ///
    /// The alias is what the type key records, and what mapping metadata is looked
    /// up by. It should be stable and fully qualified.
    fn type_alias(&self) -> &str;

    /// Returns the current value of the named property.
    fn property(&self, name: &str, access: PropertyAccess) -> MappingResult<Value> {
        let _ = access;
        Err(MappingError::UnknownProperty(self.type_alias().to_string(), name.to_string()))
    }

    /// Assigns the named property.
    fn set_property(&mut self, name: &str, value: Value, access: PropertyAccess) -> MappingResult<()> {
        let _ = (value, access);
        Err(MappingError::UnknownProperty(self.type_alias().to_string(), name.to_string()))
    }
}

/// Type-erased plumbing for [`MappedObject`] trait objects.
///
/// Implemented for every `MappedObject + Clone + PartialEq`; there is no need to
/// implement it by hand.
pub trait AnyObject: Send + Sync + Debug + 'static {
    /// Returns a reference to the object as a generic `Any` type.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable reference to the object as a generic `Any` type.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Converts the boxed object into a boxed `Any` for by-value downcasting.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Clones the object into a new boxed `MappedObject`.
    fn clone_object(&self) -> Box<dyn MappedObject>;

    /// Compares with another object of possibly different concrete type.
    fn object_eq(&self, other: &dyn MappedObject) -> bool;
}

impl<T> AnyObject for T
where
    T: MappedObject + Clone + PartialEq,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_object(&self) -> Box<dyn MappedObject> {
        Box::new(self.clone())
    }

    fn object_eq(&self, other: &dyn MappedObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

impl dyn MappedObject {
    /// Attempts to downcast a reference to a specific object type.
    pub fn downcast_ref<T: MappedObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Attempts to downcast a mutable reference to a specific object type.
    pub fn downcast_mut<T: MappedObject>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    /// Returns `true` if the object is of type `T`.
    pub fn is<T: MappedObject>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Takes a boxed object by value as a concrete type.
///
/// # Errors
///
/// Returns a conversion error naming both types if the object is not a `T`.
pub fn downcast_object<T: MappedObject>(object: Box<dyn MappedObject>) -> MappingResult<T> {
    let alias = object.type_alias().to_string();

    object
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| MappingError::conversion(alias, std::any::type_name::<T>()))
}

impl Clone for Box<dyn MappedObject> {
    fn clone(&self) -> Box<dyn MappedObject> {
        self.clone_object()
    }
}

impl PartialEq for Box<dyn MappedObject> {
    fn eq(&self, other: &Self) -> bool {
        self.object_eq(other.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Marker(u8);

    impl MappedObject for Marker {
        fn type_alias(&self) -> &str {
            "tests::Marker"
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Other;

    impl MappedObject for Other {
        fn type_alias(&self) -> &str {
            "tests::Other"
        }
    }

    #[test]
    fn boxed_objects_clone_and_compare() {
        let boxed: Box<dyn MappedObject> = Box::new(Marker(7));
        let cloned = boxed.clone();

        assert_eq!(boxed, cloned);
        assert_ne!(boxed, Box::new(Marker(8)) as Box<dyn MappedObject>);
        assert_ne!(boxed, Box::new(Other) as Box<dyn MappedObject>);
        assert_eq!(boxed.downcast_ref::<Marker>(), Some(&Marker(7)));
    }

    #[test]
    fn downcast_by_value() {
        let boxed: Box<dyn MappedObject> = Box::new(Marker(3));
        assert_eq!(downcast_object::<Marker>(boxed).unwrap(), Marker(3));

        let boxed: Box<dyn MappedObject> = Box::new(Other);
        assert!(matches!(downcast_object::<Marker>(boxed), Err(MappingError::Conversion(_))));
    }

    #[test]
    fn default_property_access_is_unknown() {
        let marker = Marker(1);
        let err = marker.property("missing", PropertyAccess::Field).unwrap_err();
        assert_eq!(
            err,
            MappingError::UnknownProperty("tests::Marker".into(), "missing".into())
        );
    }
}
