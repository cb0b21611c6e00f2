//! Buffered writes over a base store.
//!
//! A run writes into an [`OverlayStorage`]; the caller then either commits the
//! buffered writes to the base in one batch or drops them.

use crate::storage::context::{SharedStorage, StorageContext, StorageWrites};
use crate::storage::errors::StorageError;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Overlay that buffers writes on top of a base store until [`commit`](Self::commit).
///
/// Reads fall through to the base for keys not written in the overlay.
/// Deletions are recorded as tombstones so they shadow base entries.
pub struct OverlayStorage {
    base: SharedStorage,
    writes: Mutex<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl OverlayStorage {
    pub fn new(base: SharedStorage) -> Self {
        Self {
            base,
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, BTreeMap<Vec<u8>, Option<Vec<u8>>>> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn base(&self) -> &SharedStorage {
        &self.base
    }

    /// Number of buffered writes, tombstones included.
    pub fn pending(&self) -> usize {
        self.lock_writes().len()
    }

    /// Flushes buffered writes to the base as one batch and clears the buffer.
    pub fn commit(&self) -> Result<(), StorageError> {
        let writes: StorageWrites = std::mem::take(&mut *self.lock_writes())
            .into_iter()
            .collect();
        self.base.apply_batch(writes)
    }

    /// Drops all buffered writes.
    pub fn discard(&self) {
        self.lock_writes().clear();
    }

    /// Consumes the overlay and returns the pending writes in key order.
    pub fn into_writes(self) -> StorageWrites {
        self.writes
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect()
    }
}

impl StorageContext for OverlayStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(value) = self.lock_writes().get(key) {
            return Ok(value.clone());
        }
        self.base.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.lock_writes().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.lock_writes().insert(key.to_vec(), None);
        Ok(())
    }

    fn apply_batch(&self, writes: StorageWrites) -> Result<(), StorageError> {
        self.lock_writes().extend(writes);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_prefix(prefix)?.into_iter().collect();

        let writes = self.lock_writes();
        for (key, value) in writes.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }
        Ok(merged.into_iter().collect())
    }
}
