//! Derive macros for the chainvm crate.
//!
//! - `#[derive(BinaryCodec)]` generates the crate's `Encode`/`Decode` impls
//! - `#[derive(Error)]` generates `Display` and `std::error::Error` from `#[error("...")]`

mod binary_codec;
mod error;

use proc_macro::TokenStream;

/// Implements `Encode` and `Decode` field by field, in declaration order.
#[proc_macro_derive(BinaryCodec)]
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    binary_codec::derive_binary_codec(input)
}

/// Implements `Display` and `Error` for enums and structs carrying `#[error]` messages.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
