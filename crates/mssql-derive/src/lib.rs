//! # mssql-derive
//!
//! Procedural macros for scanning rows into structs.
//!
//! `#[derive(Record)]` implements `mssql_client::Record` and
//! `mssql_client::ScanTarget` for a struct with named fields, so a value of
//! the struct can be passed as the single destination of a scan and is
//! filled by column name.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_derive::Record;
//!
//! #[derive(Default, Record)]
//! struct Author {
//!     au_id: String,
//!     #[mssql(rename = "au_lname")]
//!     last_name: String,
//!     phone: Option<String>,
//!     #[mssql(skip)]
//!     display: String,
//! }
//!
//! let mut author = Author::default();
//! authors.scan(&mut [&mut author])?;
//! ```

#![warn(missing_docs)]

use std::collections::HashMap;

use mssql_types::naming::field_key;
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derive macro for implementing `Record` and `ScanTarget`.
///
/// Column names and field names are compared after normalization, so a
/// column `au_lname` fills a field `au_lname` or `AuLname`. The keys are
/// computed when the macro expands.
///
/// ## Attributes
///
/// - `#[mssql(rename = "column_name")]` - Match this column name instead of
///   the field name
/// - `#[mssql(skip)]` - Never fill this field
///
/// Two fields whose names normalize to the same key are both left unfilled.
#[proc_macro_derive(Record, attributes(mssql))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_record(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct FieldAttrs {
    rename: Option<String>,
    skip: bool,
}

fn field_attrs(field: &syn::Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs {
        rename: None,
        skip: false,
    };
    for attr in &field.attrs {
        if !attr.path().is_ident("mssql") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else {
                Err(meta.error("expected `rename = \"...\"` or `skip`"))
            }
        })?;
    }
    Ok(attrs)
}

fn expand_record(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "Record can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "Record requires a struct with named fields",
        ));
    };

    let mut keyed = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for field in &fields.named {
        let attrs = field_attrs(field)?;
        if attrs.skip {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let source = attrs
            .rename
            .unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
        let key = field_key(&source);
        *seen.entry(key.clone()).or_insert(0) += 1;
        keyed.push((key, ident));
    }

    let arms = keyed
        .iter()
        .filter(|(key, _)| !key.is_empty() && seen.get(key) == Some(&1))
        .map(|(key, ident)| {
            quote! {
                #key => {
                    ::mssql_client::ScanTarget::assign(&mut self.#ident, value)?;
                    ::core::result::Result::Ok(true)
                }
            }
        });

    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::mssql_client::Record for #name #ty_generics #where_clause {
            fn assign_column(
                &mut self,
                column: &str,
                value: &::mssql_client::SqlValue,
            ) -> ::core::result::Result<bool, ::mssql_client::TypeError> {
                let key = ::mssql_client::naming::field_key(column);
                match key.as_str() {
                    #(#arms)*
                    _ => ::core::result::Result::Ok(false),
                }
            }
        }

        impl #impl_generics ::mssql_client::ScanTarget for #name #ty_generics #where_clause {
            fn assign(
                &mut self,
                value: &::mssql_client::SqlValue,
            ) -> ::core::result::Result<(), ::mssql_client::TypeError> {
                ::core::result::Result::Err(::mssql_client::TypeError::TypeMismatch {
                    expected: #type_name,
                    actual: ::std::string::ToString::to_string(value.type_name()),
                })
            }

            fn as_record(&mut self) -> ::core::option::Option<&mut dyn ::mssql_client::Record> {
                ::core::option::Option::Some(self)
            }
        }
    })
}
