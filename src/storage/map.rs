//! Key-value view over a storage prefix.

use crate::storage::context::{SharedStorage, StorageWrites, join_key};
use crate::storage::errors::StorageError;
use crate::storage::value::{COUNT_SUFFIX, StorageValue, count_write, read_count, read_object, value_write};
use crate::types::encoding::Decode;
use crate::virtual_machine::object::{ToObject, VMObject};
use std::fmt;

/// Logical map stored under `prefix`.
///
/// Entry `k` lives at `prefix ‖ encode(k)`. The entry count is kept in a
/// dedicated counter updated on every insert and removal, in the same write
/// batch as the entry itself. The handle holds no
/// cached data: two maps with the same prefix over the same storage are the same map.
#[derive(Clone)]
pub struct StorageMap {
    prefix: Vec<u8>,
    storage: SharedStorage,
}

impl StorageMap {
    pub fn new(prefix: impl Into<Vec<u8>>, storage: SharedStorage) -> Self {
        Self {
            prefix: prefix.into(),
            storage,
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Storage key of the slot for `key`.
    pub fn slot_key<K: ToObject + ?Sized>(&self, key: &K) -> Vec<u8> {
        join_key(&self.prefix, &key.to_object().to_byte_array())
    }

    /// Inserts or overwrites. Storing a collection handle stores only its reference.
    pub fn set<K, V>(&self, key: &K, value: &V) -> Result<(), StorageError>
    where
        K: ToObject + ?Sized,
        V: StorageValue,
    {
        let slot = self.slot_key(key);
        let is_new = !self.storage.has(&slot)?;
        let mut writes = vec![value_write(slot, value)];
        if is_new {
            writes.push(count_write(&self.prefix, self.count()? + 1));
        }
        self.storage.apply_batch(writes)
    }

    /// Reads the value at `key`, or `V`'s default for an absent key.
    pub fn get<K, V>(&self, key: &K) -> Result<V, StorageError>
    where
        K: ToObject + ?Sized,
        V: StorageValue,
    {
        let slot = self.slot_key(key);
        match read_object(&self.storage, &slot)? {
            Some(obj) => V::from_stored(&obj, &self.storage),
            None => Ok(V::default_at(&slot, &self.storage)),
        }
    }

    /// Like [`get`](Self::get) but fails with `KeyNotFound` for an absent key.
    pub fn get_strict<K, V>(&self, key: &K) -> Result<V, StorageError>
    where
        K: ToObject + ?Sized,
        V: StorageValue,
    {
        let slot = self.slot_key(key);
        match read_object(&self.storage, &slot)? {
            Some(obj) => V::from_stored(&obj, &self.storage),
            None => Err(StorageError::KeyNotFound(key.to_object().to_string())),
        }
    }

    pub fn contains_key<K: ToObject + ?Sized>(&self, key: &K) -> Result<bool, StorageError> {
        self.storage.has(&self.slot_key(key))
    }

    /// Removes `key`. Returns whether an entry was present; absent keys are a no-op.
    pub fn remove<K: ToObject + ?Sized>(&self, key: &K) -> Result<bool, StorageError> {
        let slot = self.slot_key(key);
        if !self.storage.has(&slot)? {
            return Ok(false);
        }
        let count = self.count()?;
        self.storage.apply_batch(vec![
            (slot, None),
            count_write(&self.prefix, count.saturating_sub(1)),
        ])?;
        Ok(true)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        read_count(&self.storage, &self.prefix)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.count()? == 0)
    }

    /// All entries with their decoded keys, in storage key order.
    pub fn entries(&self) -> Result<Vec<(VMObject, VMObject)>, StorageError> {
        let mut entries = Vec::new();
        for (key, value) in self.storage.scan_prefix(&self.prefix)? {
            if let Some(object_key) = self.entry_key(&key) {
                entries.push((object_key, VMObject::from_bytes(&value)?));
            }
        }
        Ok(entries)
    }

    /// Deletes every entry and the counter. Data behind nested handles is left in place.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut writes: StorageWrites = self
            .storage
            .scan_prefix(&self.prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| self.entry_key(key).is_some())
            .map(|key| (key, None))
            .collect();
        writes.push(count_write(&self.prefix, 0));
        self.storage.apply_batch(writes)
    }

    /// Decoded key if `raw` is one of this map's own entries rather than the
    /// counter or data nested under a longer prefix.
    fn entry_key(&self, raw: &[u8]) -> Option<VMObject> {
        let rest = raw.strip_prefix(self.prefix.as_slice())?;
        if rest == COUNT_SUFFIX {
            return None;
        }
        VMObject::from_bytes(rest).ok()
    }
}

impl fmt::Debug for StorageMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageMap")
            .field("prefix", &crate::types::bytes::Bytes::from(self.prefix.as_slice()))
            .finish()
    }
}

impl PartialEq for StorageMap {
    /// Handles are equal when they address the same prefix.
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::list::StorageList;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::test_storage::test::FailingStorage;
    use num_bigint::BigInt;

    fn map() -> StorageMap {
        StorageMap::new(b"balances".to_vec(), MemoryStorage::shared())
    }

    #[test]
    fn set_get_and_count() {
        let map = map();
        map.set("alice", &BigInt::from(100)).unwrap();
        map.set("bob", &BigInt::from(5)).unwrap();
        map.set("alice", &BigInt::from(70)).unwrap();

        assert_eq!(map.count().unwrap(), 2);
        assert_eq!(map.get::<_, BigInt>("alice").unwrap(), BigInt::from(70));
    }

    #[test]
    fn absent_keys_default() {
        let map = map();
        assert_eq!(map.get::<_, BigInt>("nobody").unwrap(), BigInt::from(0));
        assert_eq!(map.get::<_, String>("nobody").unwrap(), "");
        assert_eq!(
            map.get_strict::<_, BigInt>("nobody"),
            Err(StorageError::KeyNotFound("\"nobody\"".into()))
        );
    }

    #[test]
    fn remove_updates_count_and_ignores_missing() {
        let map = map();
        map.set("a", &"x".to_string()).unwrap();
        assert!(map.remove("a").unwrap());
        assert!(!map.remove("a").unwrap());
        assert_eq!(map.count().unwrap(), 0);
        assert!(!map.contains_key("a").unwrap());
    }

    #[test]
    fn keys_of_different_types_do_not_collide() {
        let map = map();
        map.set("1", &"string key".to_string()).unwrap();
        map.set(&1i64, &"number key".to_string()).unwrap();
        assert_eq!(map.count().unwrap(), 2);
        assert_eq!(map.get::<_, String>(&1i64).unwrap(), "number key");
    }

    #[test]
    fn wrong_value_type_is_invalid() {
        let map = map();
        map.set("k", &"text".to_string()).unwrap();
        assert!(matches!(
            map.get::<_, BigInt>("k"),
            Err(StorageError::InvalidValue(_))
        ));
    }

    #[test]
    fn nested_list_aliases_both_ways() {
        let storage = MemoryStorage::shared();
        let map = StorageMap::new(b"m".to_vec(), storage.clone());
        let list = StorageList::new(b"l".to_vec(), storage);
        map.set("k", &list).unwrap();

        let through_map: StorageList = map.get("k").unwrap();
        through_map.add(&"via map".to_string()).unwrap();
        assert_eq!(list.count().unwrap(), 1);
        assert_eq!(list.get::<String>(0).unwrap(), "via map");

        list.add(&"direct".to_string()).unwrap();
        let again: StorageList = map.get("k").unwrap();
        assert_eq!(again.count().unwrap(), 2);
        assert_eq!(again.get::<String>(1).unwrap(), "direct");
    }

    #[test]
    fn default_nested_list_lives_at_the_slot() {
        let map = map();
        let list: StorageList = map.get("fresh").unwrap();
        assert_eq!(list.prefix(), map.slot_key("fresh").as_slice());
        assert_eq!(list.count().unwrap(), 0);
    }

    #[test]
    fn clear_removes_entries_and_counter() {
        let storage = MemoryStorage::shared();
        let map = StorageMap::new(b"m".to_vec(), storage.clone());
        map.set("a", &1i64).unwrap();
        map.set("b", &2i64).unwrap();
        let unrelated = StorageMap::new(b"n".to_vec(), storage.clone());
        unrelated.set("a", &3i64).unwrap();

        map.clear().unwrap();
        assert_eq!(map.count().unwrap(), 0);
        assert!(map.entries().unwrap().is_empty());
        assert_eq!(unrelated.count().unwrap(), 1);
    }

    #[test]
    fn entries_skip_counter() {
        let map = map();
        map.set("a", &1i64).unwrap();
        let entries = map.entries().unwrap();
        assert_eq!(entries, vec![(VMObject::from("a".to_string()), VMObject::from(1i64))]);
    }

    #[test]
    fn failed_insert_leaves_count_unchanged() {
        let storage = FailingStorage::new(|key| !key.ends_with(COUNT_SUFFIX));
        let map = StorageMap::new(b"m".to_vec(), storage.clone());
        storage.arm();

        assert_eq!(
            map.set("a", &1i64),
            Err(StorageError::Backend("disk full".into()))
        );
        assert_eq!(map.count().unwrap(), 0);
        assert!(!map.contains_key("a").unwrap());
    }

    #[test]
    fn failed_counter_write_drops_the_entry_too() {
        let storage = FailingStorage::new(|key| key.ends_with(COUNT_SUFFIX));
        let map = StorageMap::new(b"m".to_vec(), storage.clone());
        map.set("kept", &1i64).unwrap();
        storage.arm();

        assert!(map.set("new", &2i64).is_err());
        assert!(!map.contains_key("new").unwrap());
        assert!(map.remove("kept").is_err());
        assert!(map.contains_key("kept").unwrap());
        assert_eq!(map.count().unwrap(), 1);
        assert_eq!(map.entries().unwrap().len(), 1);
    }
}
