//! Core value types: the binary codec, shared byte buffers and hashes.

pub mod bytes;
pub mod encoding;
pub mod hash;
