//! How values are laid out in map and list slots.

use crate::storage::context::{SharedStorage, join_key};
use crate::storage::errors::StorageError;
use crate::storage::list::StorageList;
use crate::storage::map::StorageMap;
use crate::types::encoding::{Decode, Encode};
use crate::virtual_machine::object::{FromObject, ToObject, VMObject};

/// Suffix of the counter entry shared by maps and lists. Starts with a byte no
/// encoded object or realistic list index begins with.
pub(crate) const COUNT_SUFFIX: &[u8] = b"\xFFcount";

/// A type that can live in a [`StorageMap`] or [`StorageList`] slot.
///
/// Plain values are written as their canonical object encoding. Collection
/// handles write only a reference to their prefix, so two handles read from the
/// same slot see the same data.
pub trait StorageValue: Sized {
    fn to_stored(&self) -> VMObject;

    fn from_stored(obj: &VMObject, storage: &SharedStorage) -> Result<Self, StorageError>;

    /// Value returned by defaulting reads of an empty `slot`.
    fn default_at(slot: &[u8], storage: &SharedStorage) -> Self;
}

impl<T: ToObject + FromObject + Default> StorageValue for T {
    fn to_stored(&self) -> VMObject {
        self.to_object()
    }

    fn from_stored(obj: &VMObject, _storage: &SharedStorage) -> Result<Self, StorageError> {
        T::from_object(obj).map_err(|e| StorageError::InvalidValue(e.to_string()))
    }

    fn default_at(_slot: &[u8], _storage: &SharedStorage) -> Self {
        T::default()
    }
}

pub(crate) const LIST_TYPE_NAME: &str = "StorageList";
pub(crate) const MAP_TYPE_NAME: &str = "StorageMap";

pub(crate) fn handle_object(type_name: &str, prefix: &[u8]) -> VMObject {
    VMObject::Interop {
        type_name: type_name.to_string(),
        payload: prefix.to_vec(),
    }
}

pub(crate) fn handle_prefix<'a>(obj: &'a VMObject, expected: &str) -> Result<&'a [u8], StorageError> {
    match obj {
        VMObject::Interop { type_name, payload } if type_name == expected => Ok(payload),
        other => Err(StorageError::InvalidValue(format!(
            "expected {expected} reference, found {}",
            other.type_name()
        ))),
    }
}

impl StorageValue for StorageList {
    fn to_stored(&self) -> VMObject {
        handle_object(LIST_TYPE_NAME, self.prefix())
    }

    fn from_stored(obj: &VMObject, storage: &SharedStorage) -> Result<Self, StorageError> {
        let prefix = handle_prefix(obj, LIST_TYPE_NAME)?;
        Ok(StorageList::new(prefix, storage.clone()))
    }

    fn default_at(slot: &[u8], storage: &SharedStorage) -> Self {
        StorageList::new(slot, storage.clone())
    }
}

impl StorageValue for StorageMap {
    fn to_stored(&self) -> VMObject {
        handle_object(MAP_TYPE_NAME, self.prefix())
    }

    fn from_stored(obj: &VMObject, storage: &SharedStorage) -> Result<Self, StorageError> {
        let prefix = handle_prefix(obj, MAP_TYPE_NAME)?;
        Ok(StorageMap::new(prefix, storage.clone()))
    }

    fn default_at(slot: &[u8], storage: &SharedStorage) -> Self {
        StorageMap::new(slot, storage.clone())
    }
}

pub(crate) fn read_object(storage: &SharedStorage, key: &[u8]) -> Result<Option<VMObject>, StorageError> {
    storage
        .get(key)?
        .map(|bytes| VMObject::from_bytes(&bytes).map_err(StorageError::from))
        .transpose()
}

/// Put of `value` at `key`, ready for a write set.
pub(crate) fn value_write<V: StorageValue>(key: Vec<u8>, value: &V) -> (Vec<u8>, Option<Vec<u8>>) {
    (key, Some(value.to_stored().to_byte_array()))
}

pub(crate) fn count_key(prefix: &[u8]) -> Vec<u8> {
    join_key(prefix, COUNT_SUFFIX)
}

pub(crate) fn read_count(storage: &SharedStorage, prefix: &[u8]) -> Result<u64, StorageError> {
    match storage.get(&count_key(prefix))? {
        Some(bytes) => Ok(u64::from_bytes(&bytes)?),
        None => Ok(0),
    }
}

/// Counter update for a write set. A zero count deletes the counter so emptied
/// collections leave no entries.
pub(crate) fn count_write(prefix: &[u8], count: u64) -> (Vec<u8>, Option<Vec<u8>>) {
    let value = (count != 0).then(|| count.to_bytes().into_vec());
    (count_key(prefix), value)
}
