//! `#[derive(Error)]`: `Display` + `std::error::Error` for error types.
//!
//! ```ignore
//! use chainvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum FaultKind {
//!     #[error("stack underflow")]
//!     StackUnderflow,
//!     #[error("unknown context: {0}")]
//!     ContextNotFound(String),
//!     #[error("out of gas: used {used} of {limit}")]
//!     OutOfGas { used: u64, limit: u64 },
//! }
//! ```
//!
//! Tuple fields are referenced positionally (`{0}`, `{1:?}`), named fields by name.
//! Plain structs take the message from an `#[error]` attribute on the type itself.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Attribute, Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Enum(data) => {
            let arms = data
                .variants
                .iter()
                .map(|variant| {
                    let ident = &variant.ident;
                    let message = message_from(&variant.attrs, ident)?;
                    Ok(match &variant.fields {
                        Fields::Unit => quote! { Self::#ident => write!(f, #message), },
                        Fields::Unnamed(fields) => {
                            let binds: Vec<_> =
                                (0..fields.unnamed.len()).map(|i| format_ident!("f{}", i)).collect();
                            let message = rename_positional(&message, binds.len());
                            quote! {
                                Self::#ident(#(#binds),*) => write!(f, #message, #(#binds = #binds),*),
                            }
                        }
                        Fields::Named(fields) => {
                            let binds: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                            quote! {
                                #[allow(unused_variables)]
                                Self::#ident { #(#binds),* } => write!(f, #message),
                            }
                        }
                    })
                })
                .collect::<syn::Result<Vec<_>>>()?;
            quote! { match self { #(#arms)* } }
        }
        Data::Struct(data) => {
            let message = message_from(&input.attrs, name)?;
            match &data.fields {
                Fields::Unit => quote! { write!(f, #message) },
                Fields::Named(fields) => {
                    let binds: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
                    quote! {
                        #[allow(unused_variables)]
                        let Self { #(#binds),* } = self;
                        write!(f, #message)
                    }
                }
                Fields::Unnamed(fields) => {
                    let binds: Vec<_> =
                        (0..fields.unnamed.len()).map(|i| format_ident!("f{}", i)).collect();
                    let message = rename_positional(&message, binds.len());
                    quote! {
                        let Self(#(#binds),*) = self;
                        write!(f, #message, #(#binds = #binds),*)
                    }
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Reads the string literal out of the `#[error("...")]` attribute.
fn message_from<T: ToTokens>(attrs: &[Attribute], target: &T) -> syn::Result<String> {
    let attr = attrs
        .iter()
        .find(|attr| attr.path().is_ident("error"))
        .ok_or_else(|| {
            syn::Error::new_spanned(target, "missing #[error(\"...\")] display message")
        })?;

    let Meta::List(list) = &attr.meta else {
        return Err(syn::Error::new_spanned(
            &attr.meta,
            "expected #[error(\"message\")]",
        ));
    };

    match syn::parse2::<Lit>(list.tokens.clone()) {
        Ok(Lit::Str(lit)) => Ok(lit.value()),
        _ => Err(syn::Error::new_spanned(
            &attr.meta,
            "#[error] message must be a single string literal",
        )),
    }
}

/// Rewrites `{0}` / `{0:?}` into `{f0}` / `{f0:?}` so tuple fields can be passed by name.
fn rename_positional(message: &str, count: usize) -> String {
    let mut out = message.to_string();
    for i in (0..count).rev() {
        out = out
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    out
}
