//! Ordered list view over a storage prefix.

use crate::storage::context::{SharedStorage, join_key};
use crate::storage::errors::StorageError;
use crate::storage::value::{StorageValue, count_write, read_count, read_object, value_write};
use std::fmt;

/// Logical list stored under `prefix`.
///
/// Item `i` lives at `prefix ‖ i` (u64 big-endian, so storage order matches
/// index order) and the length is kept in a dedicated counter. Every mutation
/// sends its item writes and the counter update as one batch.
/// [`remove_at`](Self::remove_at) shifts every later item down one slot.
#[derive(Clone)]
pub struct StorageList {
    prefix: Vec<u8>,
    storage: SharedStorage,
}

impl StorageList {
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

    fn item_key(&self, index: u64) -> Vec<u8> {
        join_key(&self.prefix, &index.to_be_bytes())
    }

    fn check_index(&self, index: u64) -> Result<u64, StorageError> {
        let count = self.count()?;
        if index >= count {
            return Err(StorageError::IndexOutOfRange { index, count });
        }
        Ok(count)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        read_count(&self.storage, &self.prefix)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.count()? == 0)
    }

    /// Appends at index `count` and returns that index.
    pub fn add<V: StorageValue>(&self, value: &V) -> Result<u64, StorageError> {
        let index = self.count()?;
        self.storage.apply_batch(vec![
            value_write(self.item_key(index), value),
            count_write(&self.prefix, index + 1),
        ])?;
        Ok(index)
    }

    pub fn get<V: StorageValue>(&self, index: u64) -> Result<V, StorageError> {
        self.check_index(index)?;
        let key = self.item_key(index);
        match read_object(&self.storage, &key)? {
            Some(obj) => V::from_stored(&obj, &self.storage),
            None => Err(StorageError::KeyNotFound(format!("list item {index}"))),
        }
    }

    pub fn replace<V: StorageValue>(&self, index: u64, value: &V) -> Result<(), StorageError> {
        self.check_index(index)?;
        self.storage.apply_batch(vec![value_write(self.item_key(index), value)])
    }

    /// Removes item `index`, moving each later item down one index. O(n) in the
    /// number of items after `index`.
    pub fn remove_at(&self, index: u64) -> Result<(), StorageError> {
        let count = self.check_index(index)?;

        let mut writes = Vec::new();
        for i in index + 1..count {
            let moved = self
                .storage
                .get(&self.item_key(i))?
                .ok_or_else(|| StorageError::KeyNotFound(format!("list item {i}")))?;
            writes.push((self.item_key(i - 1), Some(moved)));
        }
        writes.push((self.item_key(count - 1), None));
        writes.push(count_write(&self.prefix, count - 1));
        self.storage.apply_batch(writes)
    }

    /// Deletes all items and the counter.
    pub fn clear(&self) -> Result<(), StorageError> {
        let count = self.count()?;
        let mut writes: Vec<_> = (0..count).map(|i| (self.item_key(i), None)).collect();
        writes.push(count_write(&self.prefix, 0));
        self.storage.apply_batch(writes)
    }

    pub fn to_vec<V: StorageValue>(&self) -> Result<Vec<V>, StorageError> {
        (0..self.count()?).map(|i| self.get(i)).collect()
    }
}

impl fmt::Debug for StorageList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageList")
            .field("prefix", &crate::types::bytes::Bytes::from(self.prefix.as_slice()))
            .finish()
    }
}

impl PartialEq for StorageList {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::context::StorageContext;
    use crate::storage::map::StorageMap;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::test_storage::test::FailingStorage;
    use crate::storage::value::COUNT_SUFFIX;
    use num_bigint::BigInt;

    fn list() -> StorageList {
        StorageList::new(b"items".to_vec(), MemoryStorage::shared())
    }

    fn seeded(values: &[&str]) -> StorageList {
        let list = list();
        for v in values {
            list.add(&v.to_string()).unwrap();
        }
        list
    }

    #[test]
    fn fresh_list_is_empty() {
        let list = list();
        assert_eq!(list.count().unwrap(), 0);
        assert!(list.is_empty().unwrap());
        assert_eq!(
            list.get::<String>(0),
            Err(StorageError::IndexOutOfRange { index: 0, count: 0 })
        );
    }

    #[test]
    fn add_then_get_in_order() {
        let list = seeded(&["a", "b", "c"]);
        assert_eq!(list.count().unwrap(), 3);
        for (i, expected) in ["a", "b", "c"].iter().enumerate() {
            assert_eq!(list.get::<String>(i as u64).unwrap(), *expected);
        }
    }

    #[test]
    fn remove_first_of_two() {
        let list = seeded(&["hello", "world"]);
        list.remove_at(0).unwrap();
        assert_eq!(list.count().unwrap(), 1);
        assert_eq!(list.get::<String>(0).unwrap(), "world");
        assert!(list.get::<String>(1).is_err());
    }

    #[test]
    fn remove_shifts_later_items() {
        let list = seeded(&["a", "b", "c", "d"]);
        list.remove_at(1).unwrap();
        assert_eq!(list.to_vec::<String>().unwrap(), vec!["a", "c", "d"]);
        list.remove_at(2).unwrap();
        assert_eq!(list.to_vec::<String>().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn removing_everything_leaves_no_entries() {
        let storage = MemoryStorage::shared();
        let list = StorageList::new(b"l".to_vec(), storage.clone());
        list.add(&BigInt::from(1)).unwrap();
        list.remove_at(0).unwrap();
        assert!(storage.scan_prefix(b"l").unwrap().is_empty());
    }

    #[test]
    fn replace_is_bounds_checked() {
        let list = seeded(&["x"]);
        list.replace(0, &"y".to_string()).unwrap();
        assert_eq!(list.get::<String>(0).unwrap(), "y");
        assert_eq!(
            list.replace(1, &"z".to_string()),
            Err(StorageError::IndexOutOfRange { index: 1, count: 1 })
        );
        assert_eq!(
            list.remove_at(5),
            Err(StorageError::IndexOutOfRange { index: 5, count: 1 })
        );
    }

    #[test]
    fn clear_resets_count() {
        let list = seeded(&["a", "b"]);
        list.clear().unwrap();
        assert_eq!(list.count().unwrap(), 0);
        list.add(&"fresh".to_string()).unwrap();
        assert_eq!(list.to_vec::<String>().unwrap(), vec!["fresh"]);
    }

    #[test]
    fn same_prefix_handles_alias() {
        let storage = MemoryStorage::shared();
        let a = StorageList::new(b"shared".to_vec(), storage.clone());
        let b = StorageList::new(b"shared".to_vec(), storage);
        a.add(&BigInt::from(7)).unwrap();
        assert_eq!(b.get::<BigInt>(0).unwrap(), BigInt::from(7));
        assert_eq!(a, b);
    }

    #[test]
    fn list_of_maps() {
        let storage = MemoryStorage::shared();
        let list = StorageList::new(b"accounts".to_vec(), storage.clone());
        let inner = StorageMap::new(b"acct0".to_vec(), storage);
        inner.set("balance", &BigInt::from(10)).unwrap();
        list.add(&inner).unwrap();

        let fetched: StorageMap = list.get(0).unwrap();
        assert_eq!(fetched.get::<_, BigInt>("balance").unwrap(), BigInt::from(10));
    }

    #[test]
    fn failed_remove_keeps_count_and_items() {
        let storage = FailingStorage::new(|key| key.ends_with(COUNT_SUFFIX));
        let list = StorageList::new(b"l".to_vec(), storage.clone());
        list.add(&"hello".to_string()).unwrap();
        list.add(&"world".to_string()).unwrap();
        storage.arm();

        assert_eq!(
            list.remove_at(0),
            Err(StorageError::Backend("disk full".into()))
        );
        assert_eq!(list.count().unwrap(), 2);
        assert_eq!(list.to_vec::<String>().unwrap(), vec!["hello", "world"]);
    }

    #[test]
    fn failed_add_leaves_no_orphan_item() {
        let storage = FailingStorage::new(|key| !key.ends_with(COUNT_SUFFIX));
        let list = StorageList::new(b"l".to_vec(), storage.clone());
        storage.arm();

        assert!(list.add(&BigInt::from(1)).is_err());
        assert_eq!(list.count().unwrap(), 0);
        assert!(storage.scan_prefix(b"l").unwrap().is_empty());
    }
}
