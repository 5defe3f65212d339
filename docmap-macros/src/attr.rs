use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Ident, LitStr, Result, token};

const ATTRIBUTE: &str = "docmap";

///
/// TypeAttrs
///
/// `#[docmap(...)]` on the struct or enum itself.
///

#[derive(Default)]
pub struct TypeAttrs {
    pub alias: Option<LitStr>,
    pub collection: Option<LitStr>,
    pub supertypes: Vec<LitStr>,
    pub constructor: bool,
}

impl TypeAttrs {
    pub fn parse(attrs: &[Attribute]) -> Result<Self> {
        let mut parsed = Self::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident(ATTRIBUTE)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("alias") {
                    parsed.alias = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("collection") {
                    parsed.collection = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("supertype") {
                    parsed.supertypes.push(meta.value()?.parse()?);
                } else if meta.path.is_ident("constructor") {
                    parsed.constructor = true;
                } else {
                    return Err(meta.error("unsupported docmap type attribute"));
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }

    /// The alias expression: the explicit alias, or `module_path::Name`.
    pub fn alias_tokens(&self, ident: &Ident) -> TokenStream {
        match &self.alias {
            Some(alias) => quote!(#alias),
            None => {
                let name = ident.to_string();
                quote!(::std::concat!(::std::module_path!(), "::", #name))
            }
        }
    }
}

///
/// ReferenceAttrs
///

#[derive(Default)]
pub struct ReferenceAttrs {
    pub collection: Option<LitStr>,
    pub db: Option<LitStr>,
}

///
/// FieldAttrs
///

#[derive(Default)]
pub struct FieldAttrs {
    pub id: bool,
    pub field: Option<LitStr>,
    pub transient: bool,
    pub association: bool,
    pub reference: Option<ReferenceAttrs>,
    pub value: Option<LitStr>,
    pub declared: Option<LitStr>,
    pub getter: Option<Ident>,
    pub setter: Option<Ident>,
}

impl FieldAttrs {
    pub fn parse(attrs: &[Attribute]) -> Result<Self> {
        let mut parsed = Self::default();

        for attr in attrs.iter().filter(|attr| attr.path().is_ident(ATTRIBUTE)) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    parsed.id = true;
                } else if meta.path.is_ident("field") {
                    parsed.field = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("transient") {
                    parsed.transient = true;
                } else if meta.path.is_ident("association") {
                    parsed.association = true;
                } else if meta.path.is_ident("reference") {
                    let mut reference = ReferenceAttrs::default();

                    if meta.input.peek(token::Paren) {
                        meta.parse_nested_meta(|inner| {
                            if inner.path.is_ident("collection") {
                                reference.collection = Some(inner.value()?.parse()?);
                            } else if inner.path.is_ident("db") {
                                reference.db = Some(inner.value()?.parse()?);
                            } else {
                                return Err(inner.error("unsupported docmap reference attribute"));
                            }
                            Ok(())
                        })?;
                    }

                    parsed.reference = Some(reference);
                } else if meta.path.is_ident("value") {
                    parsed.value = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("declared") {
                    parsed.declared = Some(meta.value()?.parse()?);
                } else if meta.path.is_ident("getter") {
                    let method: LitStr = meta.value()?.parse()?;
                    parsed.getter = Some(method.parse()?);
                } else if meta.path.is_ident("setter") {
                    let method: LitStr = meta.value()?.parse()?;
                    parsed.setter = Some(method.parse()?);
                } else {
                    return Err(meta.error("unsupported docmap field attribute"));
                }
                Ok(())
            })?;
        }

        Ok(parsed)
    }
}
