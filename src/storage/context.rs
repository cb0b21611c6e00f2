//! The key-value store contracts persist into.

use crate::storage::errors::StorageError;
use std::sync::Arc;

/// A pending write set: `Some(value)` for puts, `None` for deletions.
pub type StorageWrites = Vec<(Vec<u8>, Option<Vec<u8>>)>;

/// Abstract byte-keyed store backing maps and lists.
///
/// Implementations must be thread-safe so independent runs can share a base
/// store behind their own overlays.
pub trait StorageContext: Send + Sync {
    /// Retrieves a value by key, returning `None` if the key does not exist.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Stores a key-value pair, overwriting any existing value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Removes a key. Deleting a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    fn has(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// All live entries whose key starts with `prefix`, sorted by key.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Applies a write set, all or nothing. Maps and lists rely on this to keep
    /// their counters in step with their entries.
    ///
    /// The default applies writes one at a time in order and is only atomic for
    /// stores whose writes cannot fail. Fallible backends must override it.
    fn apply_batch(&self, writes: StorageWrites) -> Result<(), StorageError> {
        for (key, value) in writes {
            match value {
                Some(value) => self.put(&key, &value)?,
                None => self.delete(&key)?,
            }
        }
        Ok(())
    }
}

/// Shared handle to a storage context.
pub type SharedStorage = Arc<dyn StorageContext>;

/// `prefix ‖ suffix` as a fresh key.
pub(crate) fn join_key(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}
