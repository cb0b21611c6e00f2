use crate::types::encoding::DecodeError;
use chainvm_derive::Error;

/// Errors raised by storage backends and by misuse of storage handles.
///
/// These are host-level errors, separate from VM faults: an interop that hits
/// one reports it to the VM as `InteropFailed`.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("index {index} out of range for list of {count} items")]
    IndexOutOfRange { index: u64, count: u64 },
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<DecodeError> for StorageError {
    fn from(err: DecodeError) -> Self {
        StorageError::InvalidValue(err.to_string())
    }
}
