//! Contract storage: the key-value context and the map/list views layered on it.

pub mod context;
pub mod errors;
pub mod list;
pub mod map;
pub mod memory;
pub mod overlay;
pub mod rocksdb_storage;
pub mod test_storage;
pub mod value;

pub use context::{SharedStorage, StorageContext, StorageWrites};
pub use errors::StorageError;
pub use list::StorageList;
pub use map::StorageMap;
pub use memory::MemoryStorage;
pub use overlay::OverlayStorage;
pub use rocksdb_storage::RocksDbStorage;
pub use value::StorageValue;
