//! `#[derive(BinaryCodec)]`: field-by-field `Encode`/`Decode` impls.
//!
//! Fields are written in declaration order using the crate's own codec
//! (`crate::types::encoding`), so derived layouts stay deterministic and hashable.
//! Enums get a leading `u8` tag: the explicit discriminant when one is written,
//! otherwise the previous tag plus one.
//!
//! ```ignore
//! #[derive(BinaryCodec)]
//! pub struct Receipt {
//!     pub script_hash: Hash,
//!     pub gas_used: u64,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{Data, DataEnum, DeriveInput, Expr, Fields, Lit, parse_macro_input};

pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (encode_body, decode_body) = match &input.data {
        Data::Struct(data) => struct_bodies(&data.fields),
        Data::Enum(data) => enum_bodies(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "BinaryCodec derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            #[allow(unused_variables)]
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}

fn struct_bodies(fields: &Fields) -> (TokenStream2, TokenStream2) {
    match fields {
        Fields::Named(named) => {
            let idents: Vec<_> = named.named.iter().map(|f| &f.ident).collect();
            (
                quote! { #(crate::types::encoding::Encode::encode(&self.#idents, out);)* },
                quote! {
                    Ok(Self { #(#idents: crate::types::encoding::Decode::decode(input)?,)* })
                },
            )
        }
        Fields::Unnamed(unnamed) => {
            let indices: Vec<_> = (0..unnamed.unnamed.len()).map(syn::Index::from).collect();
            let reads = indices
                .iter()
                .map(|_| quote! { crate::types::encoding::Decode::decode(input)? });
            (
                quote! { #(crate::types::encoding::Encode::encode(&self.#indices, out);)* },
                quote! { Ok(Self(#(#reads),*)) },
            )
        }
        Fields::Unit => (quote! {}, quote! { Ok(Self) }),
    }
}

fn enum_bodies(data: &DataEnum) -> syn::Result<(TokenStream2, TokenStream2)> {
    let tags = tags_for(data)?;
    let mut encode_arms = Vec::with_capacity(tags.len());
    let mut decode_arms = Vec::with_capacity(tags.len());

    for (variant, tag) in data.variants.iter().zip(tags) {
        let ident = &variant.ident;
        match &variant.fields {
            Fields::Unit => {
                encode_arms.push(quote! {
                    Self::#ident => crate::types::encoding::Encode::encode(&#tag, out),
                });
                decode_arms.push(quote! { #tag => Ok(Self::#ident), });
            }
            Fields::Unnamed(unnamed) => {
                let binds: Vec<_> =
                    (0..unnamed.unnamed.len()).map(|i| format_ident!("f{}", i)).collect();
                let reads = binds
                    .iter()
                    .map(|_| quote! { crate::types::encoding::Decode::decode(input)? });
                encode_arms.push(quote! {
                    Self::#ident(#(#binds),*) => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #(crate::types::encoding::Encode::encode(#binds, out);)*
                    }
                });
                decode_arms.push(quote! { #tag => Ok(Self::#ident(#(#reads),*)), });
            }
            Fields::Named(named) => {
                let binds: Vec<_> = named.named.iter().map(|f| &f.ident).collect();
                encode_arms.push(quote! {
                    Self::#ident { #(#binds),* } => {
                        crate::types::encoding::Encode::encode(&#tag, out);
                        #(crate::types::encoding::Encode::encode(#binds, out);)*
                    }
                });
                decode_arms.push(quote! {
                    #tag => Ok(Self::#ident {
                        #(#binds: crate::types::encoding::Decode::decode(input)?,)*
                    }),
                });
            }
        }
    }

    Ok((
        quote! { match self { #(#encode_arms)* } },
        quote! {
            let tag: u8 = crate::types::encoding::Decode::decode(input)?;
            match tag {
                #(#decode_arms)*
                _ => Err(crate::types::encoding::DecodeError::InvalidValue),
            }
        },
    ))
}

/// Wire tag per variant. Explicit discriminants must be `u8` literals.
fn tags_for(data: &DataEnum) -> syn::Result<Vec<u8>> {
    let mut tags = Vec::with_capacity(data.variants.len());
    let mut next: Option<u8> = Some(0);

    for variant in &data.variants {
        let tag = match &variant.discriminant {
            Some((_, expr)) => literal_tag(expr)?,
            None => next.ok_or_else(|| {
                syn::Error::new_spanned(variant, "enum has more than 256 variants")
            })?,
        };
        tags.push(tag);
        next = tag.checked_add(1);
    }

    Ok(tags)
}

fn literal_tag(expr: &Expr) -> syn::Result<u8> {
    if let Expr::Lit(lit) = expr
        && let Lit::Int(int) = &lit.lit
    {
        return int.base10_parse::<u8>();
    }
    Err(syn::Error::new_spanned(
        expr,
        "discriminant must be an integer literal in 0..=255",
    ))
}
