//! RocksDB-backed persistent storage context.
//!
//! Contract state lives in its own column family so the database can later hold
//! other data (receipts, metadata) without key collisions.

use crate::error;
use crate::storage::context::{StorageContext, StorageWrites};
use crate::storage::errors::StorageError;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;

/// Column family holding contract state.
pub const CF_STATE: &str = "state";

fn backend(op: &str, err: rocksdb::Error) -> StorageError {
    error!("rocksdb {op} failed: {err}");
    StorageError::Backend(format!("{op}: {err}"))
}

pub struct RocksDbStorage {
    db: Arc<DB>,
}

impl RocksDbStorage {
    /// Opens (or creates) a database at `path` with the state column family.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = vec![ColumnFamilyDescriptor::new(CF_STATE, Options::default())];
        let db = DB::open_cf_descriptors(&opts, path.as_ref(), descriptors)
            .map_err(|e| backend("open", e))?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Wraps an already opened database. It must contain [`CF_STATE`].
    pub fn from_db(db: Arc<DB>) -> Result<Self, StorageError> {
        if db.cf_handle(CF_STATE).is_none() {
            return Err(StorageError::Backend(format!(
                "missing column family {CF_STATE}"
            )));
        }
        Ok(Self { db })
    }

    fn cf(&self) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(CF_STATE)
            .ok_or_else(|| StorageError::Backend(format!("missing column family {CF_STATE}")))
    }
}

impl StorageContext for RocksDbStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get_cf(self.cf()?, key)
            .map_err(|e| backend("get", e))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db
            .put_cf(self.cf()?, key, value)
            .map_err(|e| backend("put", e))
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .delete_cf(self.cf()?, key)
            .map_err(|e| backend("delete", e))
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let iter = self
            .db
            .iterator_cf(self.cf()?, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| backend("scan", e))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }
        Ok(entries)
    }

    fn apply_batch(&self, writes: StorageWrites) -> Result<(), StorageError> {
        let cf = self.cf()?;
        let mut batch = WriteBatch::default();
        for (key, value) in writes {
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }
        self.db.write(batch).map_err(|e| backend("write batch", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (RocksDbStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let storage = RocksDbStorage::open(dir.path()).expect("failed to open test db");
        (storage, dir)
    }

    #[test]
    fn put_get_delete() {
        let (storage, _dir) = open_temp();
        storage.put(b"k", b"v").unwrap();
        assert_eq!(storage.get(b"k").unwrap(), Some(b"v".to_vec()));
        storage.delete(b"k").unwrap();
        assert_eq!(storage.get(b"k").unwrap(), None);
    }

    #[test]
    fn scan_stops_at_prefix_end() {
        let (storage, _dir) = open_temp();
        storage.put(b"a.1", b"1").unwrap();
        storage.put(b"a.2", b"2").unwrap();
        storage.put(b"b.1", b"3").unwrap();
        let entries = storage.scan_prefix(b"a.").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], (b"a.2".to_vec(), b"2".to_vec()));
    }

    #[test]
    fn batch_is_applied() {
        let (storage, _dir) = open_temp();
        storage.put(b"old", b"x").unwrap();
        storage
            .apply_batch(vec![(b"new".to_vec(), Some(b"y".to_vec())), (b"old".to_vec(), None)])
            .unwrap();
        assert!(!storage.has(b"old").unwrap());
        assert!(storage.has(b"new").unwrap());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            storage.put(b"persist", b"me").unwrap();
        }
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        assert_eq!(storage.get(b"persist").unwrap(), Some(b"me".to_vec()));
    }
}
