// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use proc_macro::TokenStream;
use quote::quote;
use syn::parse::{Parse, Parser};
use syn::{DeriveInput, GenericArgument, PathArguments, Type, parse_macro_input, parse_quote};

fn boxed_inner_type(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let first = path.path.segments.first()?;
    if first.ident != "Box" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &first.arguments else {
        return None;
    };
    let GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    // Trait objects keep their explicit Box in the context selector.
    if matches!(inner, Type::TraitObject(_)) {
        None
    } else {
        Some(inner)
    }
}

pub fn trace_error(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(item as DeriveInput);
    let syn::Data::Enum(data) = &mut input.data else {
        panic!("trace_error applies to enums only")
    };
    for variant in data.variants.iter_mut() {
        if matches!(variant.fields, syn::Fields::Unit) {
            variant.fields =
                syn::Fields::Named(syn::FieldsNamed::parse.parse2(quote! {{}}).unwrap());
        }
        let syn::Fields::Named(fields) = &mut variant.fields else {
            panic!("tuple variants are not supported")
        };
        fields.named.push(
            syn::Field::parse_named
                .parse2(quote! {#[snafu(implicit)] _location: ::snafu::Location})
                .unwrap(),
        );
        let cause = fields.named.iter_mut().find(|f| {
            let name = f.ident.as_ref().unwrap();
            name == "source" || name == "error"
        });
        if let Some(cause) = cause {
            if let Some(inner) = boxed_inner_type(&cause.ty) {
                cause
                    .attrs
                    .push(parse_quote! {#[snafu(source(from(#inner, Box::new)))]});
            } else {
                cause.attrs.push(parse_quote! {#[snafu(source)]});
            }
        }
    }

    quote! { #input }.into()
}

pub fn derive_debug_trace(input: TokenStream) -> TokenStream {
    let mut input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let syn::Data::Enum(data) = &mut input.data else {
        panic!("DebugTrace applies to enums only")
    };
    let mut arms = vec![];
    for variant in data.variants.iter_mut() {
        let syn::Fields::Named(fields) = &mut variant.fields else {
            panic!("tuple variants are not supported")
        };
        let cfg_attrs = variant
            .attrs
            .iter()
            .filter(|attr| attr.path().is_ident("cfg"))
            .collect::<Vec<_>>();
        let has_field = |name: &str| {
            fields
                .named
                .iter()
                .any(|f| f.ident.as_ref().unwrap() == name)
        };

        let variant_name = &variant.ident;
        let arm = if has_field("source") {
            quote! {
                #(#cfg_attrs)*
                #name::#variant_name {_location, source, ..} => {
                    let level = source.debug_trace(f)?;
                    writeln!(f, "{level}: {self}, at {_location}")?;
                    Ok(level + 1)
                }
            }
        } else if has_field("error") {
            quote! {
                #(#cfg_attrs)*
                #name::#variant_name {_location, error, ..} => {
                    writeln!(f, "0: {error}")?;
                    writeln!(f, "1: {self}, at {_location}")?;
                    Ok(2)
                }
            }
        } else {
            quote! {
                #(#cfg_attrs)*
                #name::#variant_name {_location, .. } => {
                    writeln!(f, "0: {self}, at {_location}")?;
                    Ok(1)
                }
            }
        };
        arms.push(arm);
    }

    quote! {
        impl DebugTrace for #name {
            #[inline(never)]
            fn debug_trace(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::result::Result<u32, ::std::fmt::Error> {
                match self {
                    #(#arms)*
                }
            }
        }

        impl ::std::fmt::Debug for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                writeln!(f, "{self}")?;
                DebugTrace::debug_trace(self, f)?;
                Ok(())
            }
        }
    }
    .into()
}
