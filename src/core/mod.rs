//! Script execution front-end.
//!
//! - `Executor`: runs scripts against storage with commit-on-halt semantics
//! - `Receipt`: hashed record of a run's outcome

pub mod executor;
pub mod receipt;
