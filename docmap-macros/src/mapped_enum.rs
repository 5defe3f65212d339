use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields};

use crate::attr::TypeAttrs;

// derive_mapped_enum
pub fn derive_mapped_enum(input: TokenStream) -> TokenStream {
    let input: DeriveInput = match syn::parse2(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    expand(&input).unwrap_or_else(Error::into_compile_error)
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;

    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(ident, "MappedEnum can only be derived for enums"));
    };

    if data.variants.is_empty() {
        return Err(Error::new_spanned(ident, "MappedEnum needs at least one variant"));
    }

    if let Some(variant) = data.variants.iter().find(|v| !matches!(v.fields, Fields::Unit)) {
        return Err(Error::new_spanned(variant, "MappedEnum variants cannot carry fields"));
    }

    let type_attrs = TypeAttrs::parse(&input.attrs)?;
    let alias = type_attrs.alias_tokens(ident);

    let variants = data.variants.iter().map(|v| &v.ident).collect::<Vec<_>>();
    let names = variants.iter().map(|v| v.to_string()).collect::<Vec<_>>();

    Ok(quote! {
        impl ::docmap::value::FieldValue for #ident {
            fn type_info() -> ::docmap::types::TypeInfo {
                ::docmap::types::TypeInfo::Enum(::docmap::types::EnumType::new(#alias, [#(#names),*]))
            }

            fn to_value(&self) -> ::docmap::value::Value {
                let variant = match self {
                    #(Self::#variants => #names,)*
                };

                ::docmap::value::Value::Enum(::docmap::value::EnumValue::new(#alias, variant))
            }

            fn from_value(value: ::docmap::value::Value) -> ::docmap::error::MappingResult<Self> {
                ::docmap::value::enum_from_value(
                    &::docmap::types::EnumType::new(#alias, [#(#names),*]),
                    &[#((#names, Self::#variants)),*],
                    value,
                )
            }
        }
    })
}
