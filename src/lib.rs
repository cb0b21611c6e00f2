//! Gas-metered stack virtual machine for blockchain contracts.
//!
//! Provides the bytecode interpreter, contract storage views over a key-value
//! store, and an executor that turns script runs into receipts.

pub mod core;
pub mod storage;
pub mod types;
pub mod utils;
pub mod virtual_machine;
