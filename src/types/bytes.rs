//! Reference-counted byte buffer with copy-on-write semantics.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, read_bytes, read_len};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Shared, cheaply clonable byte buffer.
///
/// Scripts and encoded values are handed between frames, loaders and storage
/// without copying. Mutation goes through `Arc::make_mut`.
#[derive(Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bytes(Arc<Vec<u8>>);

impl Bytes {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(Arc::new(data.into()))
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self(Arc::new(Vec::with_capacity(cap)))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Unwraps the buffer, copying only if it is still shared.
    pub fn into_vec(self) -> Vec<u8> {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| shared.as_ref().clone())
    }

    /// Clones the data if other references exist.
    pub fn make_mut(&mut self) -> &mut Vec<u8> {
        Arc::make_mut(&mut self.0)
    }

    pub fn extend_from_slice(&mut self, s: &[u8]) {
        self.make_mut().extend_from_slice(s);
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for byte in self.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Encode for Bytes {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.len().encode(out);
        out.write(self.as_slice());
    }
}

impl Decode for Bytes {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let len = read_len(input)?;
        Ok(Bytes::new(read_bytes(input, len)?))
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self::new(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Bytes {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(arr: [u8; N]) -> Self {
        Self::new(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_until_mutated() {
        let a = Bytes::from(vec![1, 2, 3]);
        let mut b = a.clone();
        b.extend_from_slice(&[4]);
        assert_eq!(a.as_slice(), &[1, 2, 3]);
        assert_eq!(b.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn into_vec_copies_shared_buffer() {
        let a = Bytes::from(&b"abc"[..]);
        let b = a.clone();
        assert_eq!(a.into_vec(), b"abc".to_vec());
        assert_eq!(b.into_vec(), b"abc".to_vec());
    }

    #[test]
    fn codec_is_length_prefixed() {
        let bytes = Bytes::from([0xAA, 0xBB]);
        let encoded = bytes.to_bytes();
        assert_eq!(&encoded[..8], &2u64.to_le_bytes());
        assert_eq!(Bytes::from_bytes(&encoded).unwrap(), bytes);
    }

    #[test]
    fn debug_is_hex() {
        assert_eq!(format!("{:?}", Bytes::from([0x0f, 0xa0])), "0x0fa0");
    }
}
