//! 32-byte SHA3-256 digests.

use crate::types::encoding::{Encode, EncodeSink};
use chainvm_derive::BinaryCodec;
use sha3::{Digest, Sha3_256};
use std::fmt;

pub const HASH_LEN: usize = 32;

/// SHA3-256 digest. Identifies scripts and receipts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Hash of raw bytes.
    pub fn digest(data: &[u8]) -> Hash {
        let mut h = HashBuilder::new();
        h.update(data);
        h.finalize()
    }

    /// Hash of an encodable value, prefixed by a domain tag.
    pub fn tagged<T: Encode + ?Sized>(domain: &[u8], value: &T) -> Hash {
        let mut h = HashBuilder::new();
        h.update(domain);
        value.encode(&mut h);
        h.finalize()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental SHA3-256 builder.
///
/// Implements [`EncodeSink`] so encodable values hash without an intermediate buffer.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashBuilder {
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Chained form of [`HashBuilder::update`].
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_builder() {
        let a = Hash::digest(b"chainvm");
        let b = Hash::sha3().chain(b"chain").chain(b"vm").finalize();
        assert_eq!(a, b);
        assert_ne!(a, Hash::default());
    }

    #[test]
    fn sha3_empty_input_vector() {
        assert_eq!(
            Hash::digest(b"").to_string(),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn tagged_hash_separates_domains() {
        let value = 42u64;
        assert_ne!(Hash::tagged(b"A", &value), Hash::tagged(b"B", &value));
    }
}
