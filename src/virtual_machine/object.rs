//! The VM's value model.
//!
//! Every stack slot, register and storage value is a [`VMObject`]. Objects have a
//! canonical binary form (one tag byte followed by a tag-specific payload) that
//! every node must reproduce byte for byte:
//!
//! | tag  | variant | payload |
//! |------|---------|---------|
//! | 0x00 | None    | - |
//! | 0x01 | Bool    | 1 byte, 0 or 1 |
//! | 0x02 | Number  | sign byte + length-prefixed minimal big-endian magnitude |
//! | 0x03 | String  | length-prefixed UTF-8 |
//! | 0x04 | Bytes   | length-prefixed bytes |
//! | 0x05 | Enum    | length-prefixed type tag + `u32` value |
//! | 0x06 | Struct  | field count + (length-prefixed name, object) pairs |
//! | 0x07 | Interop | length-prefixed type name + length-prefixed payload |
//!
//! Host types cross into the VM through explicit contracts ([`ToObject`],
//! [`FromObject`], [`VmStruct`], [`VmEnum`], [`InteropType`]) rather than reflection.

use crate::types::encoding::{
    Decode, DecodeError, Encode, EncodeSink, read_bytes, read_len,
};
use crate::virtual_machine::errors::VMError;
use num_bigint::{BigInt, Sign};
use num_traits::{ToPrimitive, Zero};
use std::fmt;

/// Maximum nesting of structs accepted by the decoder.
pub const MAX_OBJECT_DEPTH: usize = 64;

const TAG_NONE: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_NUMBER: u8 = 0x02;
const TAG_STRING: u8 = 0x03;
const TAG_BYTES: u8 = 0x04;
const TAG_ENUM: u8 = 0x05;
const TAG_STRUCT: u8 = 0x06;
const TAG_INTEROP: u8 = 0x07;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum VMObject {
    #[default]
    None,
    Bool(bool),
    Number(BigInt),
    String(String),
    Bytes(Vec<u8>),
    Enum { type_tag: String, value: u32 },
    Struct(StructFields),
    /// Opaque host value; only reachable through [`VMObject::as_interop`].
    Interop { type_name: String, payload: Vec<u8> },
}

/// Struct fields in insertion order. Replacing a field keeps its position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructFields(Vec<(String, VMObject)>);

impl StructFields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Sets `name`, overwriting in place if it already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<VMObject>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    /// Builder-style [`StructFields::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<VMObject>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VMObject> {
        self.0
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Like [`StructFields::get`] but faults with `MissingField`.
    pub fn require(&self, name: &str) -> Result<&VMObject, VMError> {
        self.get(name)
            .ok_or_else(|| VMError::MissingField(name.to_string()))
    }

    /// Reads and converts a required field.
    pub fn field<T: FromObject>(&self, name: &str) -> Result<T, VMError> {
        T::from_object(self.require(name)?)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VMObject)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl IntoIterator for StructFields {
    type Item = (String, VMObject);
    type IntoIter = std::vec::IntoIter<(String, VMObject)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Host value to object conversion.
pub trait ToObject {
    fn to_object(&self) -> VMObject;
}

/// Object to host value conversion. Fails with `TypeMismatch` on the wrong tag.
pub trait FromObject: Sized {
    fn from_object(obj: &VMObject) -> Result<Self, VMError>;
}

/// Record types that map onto [`VMObject::Struct`].
pub trait VmStruct: Sized {
    fn to_fields(&self) -> StructFields;
    fn from_fields(fields: &StructFields) -> Result<Self, VMError>;
}

/// Enumerations that map onto [`VMObject::Enum`].
pub trait VmEnum: Sized {
    const TYPE_TAG: &'static str;
    fn discriminant(&self) -> u32;
    fn from_discriminant(value: u32) -> Option<Self>;
}

/// Opaque host values carried as [`VMObject::Interop`] and encoded with the crate codec.
pub trait InteropType: Encode + Decode {
    const TYPE_NAME: &'static str;
}

impl VMObject {
    pub fn from_object<T: ToObject + ?Sized>(value: &T) -> VMObject {
        value.to_object()
    }

    pub fn from_struct<S: VmStruct>(value: &S) -> VMObject {
        VMObject::Struct(value.to_fields())
    }

    pub fn from_enum<E: VmEnum>(value: &E) -> VMObject {
        VMObject::Enum {
            type_tag: E::TYPE_TAG.to_string(),
            value: value.discriminant(),
        }
    }

    pub fn from_interop<T: InteropType>(value: &T) -> VMObject {
        VMObject::Interop {
            type_name: T::TYPE_NAME.to_string(),
            payload: value.to_bytes().into_vec(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            VMObject::None => "None",
            VMObject::Bool(_) => "Bool",
            VMObject::Number(_) => "Number",
            VMObject::String(_) => "String",
            VMObject::Bytes(_) => "Bytes",
            VMObject::Enum { .. } => "Enum",
            VMObject::Struct(_) => "Struct",
            VMObject::Interop { .. } => "Interop",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, VMObject::None)
    }

    fn mismatch(&self, expected: &'static str) -> VMError {
        VMError::TypeMismatch {
            expected,
            actual: self.type_name(),
        }
    }

    pub fn as_number(&self) -> Result<&BigInt, VMError> {
        match self {
            VMObject::Number(n) => Ok(n),
            other => Err(other.mismatch("Number")),
        }
    }

    pub fn as_string(&self) -> Result<&str, VMError> {
        match self {
            VMObject::String(s) => Ok(s),
            other => Err(other.mismatch("String")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, VMError> {
        match self {
            VMObject::Bool(b) => Ok(*b),
            other => Err(other.mismatch("Bool")),
        }
    }

    pub fn as_byte_array(&self) -> Result<&[u8], VMError> {
        match self {
            VMObject::Bytes(b) => Ok(b),
            other => Err(other.mismatch("Bytes")),
        }
    }

    pub fn as_fields(&self) -> Result<&StructFields, VMError> {
        match self {
            VMObject::Struct(fields) => Ok(fields),
            other => Err(other.mismatch("Struct")),
        }
    }

    pub fn as_struct<S: VmStruct>(&self) -> Result<S, VMError> {
        S::from_fields(self.as_fields()?)
    }

    /// Decodes an enum, checking both the type tag and the discriminant.
    pub fn as_enum<E: VmEnum>(&self) -> Result<E, VMError> {
        match self {
            VMObject::Enum { type_tag, value } if type_tag == E::TYPE_TAG => {
                E::from_discriminant(*value).ok_or(VMError::TypeMismatch {
                    expected: E::TYPE_TAG,
                    actual: "Enum",
                })
            }
            VMObject::Enum { .. } => Err(VMError::TypeMismatch {
                expected: E::TYPE_TAG,
                actual: "Enum",
            }),
            other => Err(other.mismatch(E::TYPE_TAG)),
        }
    }

    pub fn as_interop<T: InteropType>(&self) -> Result<T, VMError> {
        match self {
            VMObject::Interop { type_name, payload } if type_name == T::TYPE_NAME => {
                Ok(T::from_bytes(payload)?)
            }
            other => Err(other.mismatch(T::TYPE_NAME)),
        }
    }

    /// Canonical encoding as an owned buffer.
    pub fn to_byte_array(&self) -> Vec<u8> {
        self.to_bytes().into_vec()
    }

    fn encode_number<S: EncodeSink>(n: &BigInt, out: &mut S) {
        if n.is_zero() {
            0u8.encode(out);
            0usize.encode(out);
            return;
        }
        let (sign, magnitude) = n.to_bytes_be();
        let negative = sign == Sign::Minus;
        (negative as u8).encode(out);
        magnitude.len().encode(out);
        out.write(&magnitude);
    }

    fn decode_number(input: &mut &[u8]) -> Result<BigInt, DecodeError> {
        let negative = match u8::decode(input)? {
            0 => false,
            1 => true,
            _ => return Err(DecodeError::InvalidValue),
        };
        let len = read_len(input)?;
        let magnitude = read_bytes(input, len)?;
        match magnitude.first().copied() {
            None if negative => Err(DecodeError::InvalidValue),
            None => Ok(BigInt::zero()),
            Some(0) => Err(DecodeError::InvalidValue),
            Some(_) => {
                let sign = if negative { Sign::Minus } else { Sign::Plus };
                Ok(BigInt::from_bytes_be(sign, magnitude))
            }
        }
    }

    fn decode_at_depth(input: &mut &[u8], depth: usize) -> Result<Self, DecodeError> {
        if depth > MAX_OBJECT_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let tag = u8::decode(input)?;
        Ok(match tag {
            TAG_NONE => VMObject::None,
            TAG_BOOL => VMObject::Bool(bool::decode(input)?),
            TAG_NUMBER => VMObject::Number(Self::decode_number(input)?),
            TAG_STRING => VMObject::String(String::decode(input)?),
            TAG_BYTES => VMObject::Bytes(Vec::<u8>::decode(input)?),
            TAG_ENUM => VMObject::Enum {
                type_tag: String::decode(input)?,
                value: u32::decode(input)?,
            },
            TAG_STRUCT => {
                let count = read_len(input)?;
                let mut fields = Vec::with_capacity(count.min(input.len()));
                for _ in 0..count {
                    let name = String::decode(input)?;
                    if fields.iter().any(|(existing, _)| *existing == name) {
                        return Err(DecodeError::InvalidValue);
                    }
                    let value = Self::decode_at_depth(input, depth + 1)?;
                    fields.push((name, value));
                }
                VMObject::Struct(StructFields(fields))
            }
            TAG_INTEROP => VMObject::Interop {
                type_name: String::decode(input)?,
                payload: Vec::<u8>::decode(input)?,
            },
            _ => return Err(DecodeError::InvalidValue),
        })
    }
}

impl Encode for VMObject {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        match self {
            VMObject::None => TAG_NONE.encode(out),
            VMObject::Bool(b) => {
                TAG_BOOL.encode(out);
                b.encode(out);
            }
            VMObject::Number(n) => {
                TAG_NUMBER.encode(out);
                Self::encode_number(n, out);
            }
            VMObject::String(s) => {
                TAG_STRING.encode(out);
                s.encode(out);
            }
            VMObject::Bytes(b) => {
                TAG_BYTES.encode(out);
                b.encode(out);
            }
            VMObject::Enum { type_tag, value } => {
                TAG_ENUM.encode(out);
                type_tag.encode(out);
                value.encode(out);
            }
            VMObject::Struct(fields) => {
                TAG_STRUCT.encode(out);
                fields.len().encode(out);
                for (name, value) in fields.iter() {
                    name.encode(out);
                    value.encode(out);
                }
            }
            VMObject::Interop { type_name, payload } => {
                TAG_INTEROP.encode(out);
                type_name.encode(out);
                payload.encode(out);
            }
        }
    }
}

impl Decode for VMObject {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Self::decode_at_depth(input, 0)
    }
}

impl fmt::Display for VMObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VMObject::None => write!(f, "none"),
            VMObject::Bool(b) => write!(f, "{b}"),
            VMObject::Number(n) => write!(f, "{n}"),
            VMObject::String(s) => write!(f, "{s:?}"),
            VMObject::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            VMObject::Enum { type_tag, value } => write!(f, "{type_tag}({value})"),
            VMObject::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
            VMObject::Interop { type_name, payload } => {
                write!(f, "<{type_name}; {} bytes>", payload.len())
            }
        }
    }
}

// ---------- host conversions ----------

impl ToObject for VMObject {
    fn to_object(&self) -> VMObject {
        self.clone()
    }
}

impl FromObject for VMObject {
    fn from_object(obj: &VMObject) -> Result<Self, VMError> {
        Ok(obj.clone())
    }
}

impl ToObject for bool {
    fn to_object(&self) -> VMObject {
        VMObject::Bool(*self)
    }
}

impl FromObject for bool {
    fn from_object(obj: &VMObject) -> Result<Self, VMError> {
        obj.as_bool()
    }
}

impl ToObject for BigInt {
    fn to_object(&self) -> VMObject {
        VMObject::Number(self.clone())
    }
}

impl FromObject for BigInt {
    fn from_object(obj: &VMObject) -> Result<Self, VMError> {
        obj.as_number().cloned()
    }
}

macro_rules! impl_number {
    ($($t:ty => $to:ident),* $(,)?) => {
        $(
            impl ToObject for $t {
                fn to_object(&self) -> VMObject {
                    VMObject::Number(BigInt::from(*self))
                }
            }

            impl FromObject for $t {
                fn from_object(obj: &VMObject) -> Result<Self, VMError> {
                    obj.as_number()?
                        .$to()
                        .ok_or(VMError::NumberOutOfRange { target: stringify!($t) })
                }
            }
        )*
    };
}

impl_number!(u8 => to_u8, u32 => to_u32, u64 => to_u64, i32 => to_i32, i64 => to_i64, usize => to_usize);

impl ToObject for str {
    fn to_object(&self) -> VMObject {
        VMObject::String(self.to_string())
    }
}

impl ToObject for String {
    fn to_object(&self) -> VMObject {
        VMObject::String(self.clone())
    }
}

impl FromObject for String {
    fn from_object(obj: &VMObject) -> Result<Self, VMError> {
        obj.as_string().map(str::to_string)
    }
}

impl ToObject for [u8] {
    fn to_object(&self) -> VMObject {
        VMObject::Bytes(self.to_vec())
    }
}

impl ToObject for Vec<u8> {
    fn to_object(&self) -> VMObject {
        VMObject::Bytes(self.clone())
    }
}

impl FromObject for Vec<u8> {
    fn from_object(obj: &VMObject) -> Result<Self, VMError> {
        obj.as_byte_array().map(<[u8]>::to_vec)
    }
}

impl<T: ToObject> ToObject for Option<T> {
    fn to_object(&self) -> VMObject {
        match self {
            Some(v) => v.to_object(),
            None => VMObject::None,
        }
    }
}

impl<T: FromObject> FromObject for Option<T> {
    fn from_object(obj: &VMObject) -> Result<Self, VMError> {
        match obj {
            VMObject::None => Ok(None),
            other => T::from_object(other).map(Some),
        }
    }
}

impl<T: ToObject + ?Sized> ToObject for &T {
    fn to_object(&self) -> VMObject {
        (**self).to_object()
    }
}

impl<T: ToObject + ?Sized> From<&T> for VMObject {
    fn from(value: &T) -> Self {
        value.to_object()
    }
}

impl From<bool> for VMObject {
    fn from(value: bool) -> Self {
        VMObject::Bool(value)
    }
}

impl From<BigInt> for VMObject {
    fn from(value: BigInt) -> Self {
        VMObject::Number(value)
    }
}

impl From<i64> for VMObject {
    fn from(value: i64) -> Self {
        VMObject::Number(BigInt::from(value))
    }
}

impl From<String> for VMObject {
    fn from(value: String) -> Self {
        VMObject::String(value)
    }
}

impl From<Vec<u8>> for VMObject {
    fn from(value: Vec<u8>) -> Self {
        VMObject::Bytes(value)
    }
}

impl From<StructFields> for VMObject {
    fn from(value: StructFields) -> Self {
        VMObject::Struct(value)
    }
}
