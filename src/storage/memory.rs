use crate::storage::context::{SharedStorage, StorageContext};
use crate::storage::errors::StorageError;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent in-memory store for tests, estimation and embedding.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: DashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        Self {
            data: entries.into_iter().collect(),
        }
    }

    pub fn shared() -> SharedStorage {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl StorageContext for MemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut entries: Vec<_> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let storage = MemoryStorage::new();
        storage.put(b"k", b"v").unwrap();
        assert_eq!(storage.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(storage.has(b"k").unwrap());

        storage.delete(b"k").unwrap();
        assert_eq!(storage.get(b"k").unwrap(), None);
        storage.delete(b"k").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn scan_is_sorted_and_prefix_bounded() {
        let storage = MemoryStorage::with_data([
            (b"a.2".to_vec(), vec![2]),
            (b"a.1".to_vec(), vec![1]),
            (b"b.1".to_vec(), vec![3]),
        ]);
        let keys: Vec<_> = storage
            .scan_prefix(b"a.")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a.1".to_vec(), b"a.2".to_vec()]);
    }

    #[test]
    fn default_batch_applies_puts_and_deletes() {
        let storage = MemoryStorage::with_data([(b"gone".to_vec(), vec![0])]);
        storage
            .apply_batch(vec![(b"new".to_vec(), Some(vec![1])), (b"gone".to_vec(), None)])
            .unwrap();
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get(b"new").unwrap(), Some(vec![1]));
    }
}
