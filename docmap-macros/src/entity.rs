use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Field, Fields, Ident, Type};

use crate::attr::{FieldAttrs, TypeAttrs};

///
/// MappedField
///

struct MappedField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    attrs: FieldAttrs,
}

impl<'a> MappedField<'a> {
    fn new(field: &'a Field) -> syn::Result<Self> {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| Error::new_spanned(field, "Entity fields must be named"))?;
        let attrs = FieldAttrs::parse(&field.attrs)?;

        if attrs.transient && (attrs.id || attrs.association || attrs.reference.is_some()) {
            return Err(Error::new_spanned(
                field,
                "a transient field cannot be an id or an association",
            ));
        }

        Ok(Self { ident, ty: &field.ty, attrs })
    }

    fn name(&self) -> String {
        self.ident.to_string()
    }

    fn property_expr(&self) -> TokenStream {
        let name = self.name();
        let ty = self.ty;
        let attrs = &self.attrs;

        let field_name = attrs.field.as_ref().map(|field| quote!(.field_name(#field)));
        let id = attrs.id.then(|| quote!(.id()));
        let association = attrs.association.then(|| quote!(.association()));
        let reference = attrs.reference.as_ref().map(|reference| {
            let collection = reference.collection.as_ref().map(|c| quote!(.collection(#c)));
            let database = reference.db.as_ref().map(|d| quote!(.database(#d)));
            quote!(.reference(ReferenceSpec::new() #collection #database))
        });
        let declared = attrs.declared.as_ref().map(|alias| quote!(.declared(#alias)));
        let value = attrs.value.as_ref().map(|source| quote!(.value(#source)?));

        quote! {
            PersistentProperty::of::<#ty>(#name)
                #field_name
                #id
                #association
                #reference
                #declared
                #value
        }
    }

    fn parameter_expr(&self) -> TokenStream {
        let name = self.name();
        let ty = self.ty;
        let declared = self.attrs.declared.as_ref().map(|alias| quote!(.declared(#alias)));
        let value = self.attrs.value.as_ref().map(|source| quote!(.value(#source)?));

        quote! {
            ConstructorParameter::of::<#ty>(#name) #declared #value
        }
    }

    fn getter_arm(&self) -> TokenStream {
        let name = self.name();
        let ident = self.ident;
        let ty = self.ty;

        match &self.attrs.getter {
            Some(getter) => quote! {
                #name => match access {
                    PropertyAccess::Accessor => Ok(<#ty as FieldValue>::to_value(&self.#getter())),
                    PropertyAccess::Field => Ok(<#ty as FieldValue>::to_value(&self.#ident)),
                },
            },
            None => quote! {
                #name => Ok(<#ty as FieldValue>::to_value(&self.#ident)),
            },
        }
    }

    fn setter_arm(&self) -> TokenStream {
        let name = self.name();
        let ident = self.ident;
        let ty = self.ty;

        match &self.attrs.setter {
            Some(setter) => quote! {
                #name => match access {
                    PropertyAccess::Accessor => self.#setter(<#ty as FieldValue>::from_value(value)?),
                    PropertyAccess::Field => self.#ident = <#ty as FieldValue>::from_value(value)?,
                },
            },
            None => quote! {
                #name => self.#ident = <#ty as FieldValue>::from_value(value)?,
            },
        }
    }
}

// derive_entity
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    expand(&input).unwrap_or_else(Error::into_compile_error)
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            other => {
                return Err(Error::new_spanned(
                    other,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(Error::new_spanned(
                ident,
                "Entity can only be derived for structs with named fields",
            ));
        }
    };

    let type_attrs = TypeAttrs::parse(&input.attrs)?;
    let alias = type_attrs.alias_tokens(ident);

    let fields = fields.iter().map(MappedField::new).collect::<syn::Result<Vec<_>>>()?;
    let (transient, mapped): (Vec<_>, Vec<_>) = fields.iter().partition(|f| f.attrs.transient);

    let collection = type_attrs.collection.as_ref().map(|c| quote!(.collection(#c)));
    let supertypes = &type_attrs.supertypes;
    let properties = mapped.iter().map(|field| field.property_expr());

    let constructor = if type_attrs.constructor {
        let parameters = mapped.iter().map(|field| field.parameter_expr());
        let assignments = mapped.iter().map(|field| {
            let ident = field.ident;
            let name = field.name();
            let ty = field.ty;
            quote!(#ident: arguments.take::<#ty>(#name)?)
        });
        let defaults = transient.iter().map(|field| {
            let ident = field.ident;
            quote!(#ident: ::std::default::Default::default())
        });

        quote! {
            PreferredConstructor::new(
                ::std::vec![#(#parameters),*],
                |mut arguments: ConstructorArguments| {
                    let object: ::std::boxed::Box<dyn MappedObject> = ::std::boxed::Box::new(Self {
                        #(#assignments,)*
                        #(#defaults,)*
                    });
                    Ok(object)
                },
            )
        }
    } else {
        quote!(PreferredConstructor::of_default::<Self>())
    };

    let getter_arms = mapped.iter().map(|field| field.getter_arm());
    let setter_arms = mapped.iter().map(|field| field.setter_arm());

    Ok(quote! {
        impl ::docmap::mapping::Entity for #ident {
            fn persistent_entity() -> ::docmap::error::MappingResult<::docmap::mapping::PersistentEntity> {
                #[allow(unused_imports)]
                use ::docmap::{
                    mapping::{
                        ConstructorArguments, ConstructorParameter, PersistentEntity,
                        PersistentProperty, PreferredConstructor, ReferenceSpec,
                    },
                    object::MappedObject,
                };

                PersistentEntity::builder(#alias)
                    #collection
                    #(.supertype(#supertypes))*
                    #(.property(#properties))*
                    .constructor(#constructor)
                    .build()
            }
        }

        impl ::docmap::object::MappedObject for #ident {
            fn type_alias(&self) -> &str {
                #alias
            }

            fn property(
                &self,
                name: &str,
                access: ::docmap::object::PropertyAccess,
            ) -> ::docmap::error::MappingResult<::docmap::value::Value> {
                #[allow(unused_imports)]
                use ::docmap::{error::MappingError, object::PropertyAccess, value::FieldValue};
                let _ = access;

                match name {
                    #(#getter_arms)*
                    _ => Err(MappingError::UnknownProperty(self.type_alias().to_string(), name.to_string())),
                }
            }

            fn set_property(
                &mut self,
                name: &str,
                value: ::docmap::value::Value,
                access: ::docmap::object::PropertyAccess,
            ) -> ::docmap::error::MappingResult<()> {
                #[allow(unused_imports)]
                use ::docmap::{error::MappingError, object::PropertyAccess, value::FieldValue};
                let _ = (&value, access);

                match name {
                    #(#setter_arms)*
                    _ => {
                        return Err(MappingError::UnknownProperty(
                            self.type_alias().to_string(),
                            name.to_string(),
                        ));
                    }
                }

                Ok(())
            }
        }

        impl ::docmap::value::FieldValue for #ident {
            fn type_info() -> ::docmap::types::TypeInfo {
                ::docmap::types::TypeInfo::entity(#alias)
            }

            fn to_value(&self) -> ::docmap::value::Value {
                ::docmap::value::Value::object(::std::clone::Clone::clone(self))
            }

            fn from_value(value: ::docmap::value::Value) -> ::docmap::error::MappingResult<Self> {
                ::docmap::value::object_from_value(value)
            }
        }
    })
}
