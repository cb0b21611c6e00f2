#[cfg(test)]
pub mod test {
    use crate::storage::context::{StorageContext, StorageWrites};
    use crate::storage::errors::StorageError;
    use crate::storage::memory::MemoryStorage;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory store that rejects writes to selected keys once armed.
    ///
    /// Batches are all-or-nothing, as with the RocksDB backend: a batch touching
    /// a rejected key fails before anything is applied.
    pub struct FailingStorage {
        inner: MemoryStorage,
        reject: Box<dyn Fn(&[u8]) -> bool + Send + Sync>,
        armed: AtomicBool,
    }

    impl FailingStorage {
        pub fn new(reject: impl Fn(&[u8]) -> bool + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStorage::new(),
                reject: Box::new(reject),
                armed: AtomicBool::new(false),
            })
        }

        pub fn arm(&self) {
            self.armed.store(true, Ordering::SeqCst);
        }

        fn check(&self, key: &[u8]) -> Result<(), StorageError> {
            if self.armed.load(Ordering::SeqCst) && (self.reject)(key) {
                return Err(StorageError::Backend("disk full".into()));
            }
            Ok(())
        }
    }

    impl StorageContext for FailingStorage {
        fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
            self.check(key)?;
            self.inner.put(key, value)
        }

        fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
            self.check(key)?;
            self.inner.delete(key)
        }

        fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
            self.inner.scan_prefix(prefix)
        }

        fn apply_batch(&self, writes: StorageWrites) -> Result<(), StorageError> {
            for (key, _) in &writes {
                self.check(key)?;
            }
            self.inner.apply_batch(writes)
        }
    }
}
