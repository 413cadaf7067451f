/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Acton Cluster Macro Library
//!
//! Procedural macros for the Acton Cluster supervision engine.
//!
//! # Object Message Macro
//!
//! The [`object_message`] macro turns a plain struct into a message that a
//! cluster supervisor can route by identity:
//!
//! ```ignore
//! use acton_cluster::prelude::*;
//!
//! // Routed by the `id` field, replies with the same type.
//! #[object_message]
//! pub struct Echo {
//!     pub id: String,
//!     pub text: String,
//! }
//!
//! // Routed by `order_id`, replies with `OrderState`.
//! #[object_message(id = "order_id", reply = OrderState)]
//! pub struct GetOrder {
//!     pub order_id: String,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, LitStr, Type};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Options parsed from `#[object_message(...)]`.
#[derive(Default)]
struct MessageConfig {
    /// Field carrying the object identity. Defaults to `id`.
    id_field: Option<Ident>,
    /// Reply type. Defaults to the message type itself.
    reply: Option<Type>,
}

impl MessageConfig {
    fn parser(&mut self) -> impl syn::parse::Parser<Output = ()> + '_ {
        syn::meta::parser(move |meta| {
            if meta.path.is_ident("id") {
                let field: LitStr = meta.value()?.parse()?;
                self.id_field = Some(field.parse()?);
                Ok(())
            } else if meta.path.is_ident("reply") {
                self.reply = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported object_message option, expected `id` or `reply`"))
            }
        })
    }
}

/// Makes a struct routable by a cluster supervisor.
///
/// Expands to:
/// - `#[derive(Clone, Debug)]` for whichever of the two is not already derived
/// - an `ObjectMessage` implementation whose `object_id` returns the identity field
///
/// The identity field must be a `String`. Enums carrying several message kinds
/// should implement `ObjectMessage` by hand.
#[proc_macro_attribute]
pub fn object_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut config = MessageConfig::default();
    let config_parser = config.parser();
    parse_macro_input!(attr with config_parser);

    let input = parse_macro_input!(item as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let id_field = config
        .id_field
        .clone()
        .unwrap_or_else(|| Ident::new("id", proc_macro2::Span::call_site()));

    let has_field = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named
                .named
                .iter()
                .any(|field| field.ident.as_ref() == Some(&id_field)),
            _ => false,
        },
        _ => {
            return syn::Error::new_spanned(
                &input.ident,
                "object_message can only be applied to structs with named fields",
            )
            .to_compile_error()
            .into();
        }
    };
    if !has_field {
        return syn::Error::new_spanned(
            &input.ident,
            format!("object_message: no field named `{id_field}` holds the object identity"),
        )
        .to_compile_error()
        .into();
    }

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let reply = config
        .reply
        .map_or_else(|| quote!(#name #ty_generics), |reply| quote!(#reply));

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics ::acton_cluster::prelude::ObjectMessage for #name #ty_generics #where_clause {
            type Reply = #reply;

            fn object_id(&self) -> &str {
                &self.#id_field
            }
        }
    };

    TokenStream::from(expanded)
}
