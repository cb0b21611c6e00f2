//! Deterministic stack machine for contract execution.
//!
//! Scripts are byte-coded instruction streams operating on a shared operand
//! stack of [`object::VMObject`]s. Each call level owns a private register file.
//! `CALL` switches into another named context, `EXTCALL` dispatches to a host
//! function registered in an [`interop::InteropTable`].
//!
//! # Modules
//!
//! - [`isa`]: opcode table, instruction decoding and disassembly
//! - [`object`]: the VM value model and its canonical encoding
//! - [`stack`], [`frame`]: operand stack and per-call frames
//! - [`context`]: named code contexts and their resolver
//! - [`interop`]: host functions and the standard library
//! - [`gas`]: metering, per-category profiles and estimation
//! - [`script`]: bytecode builder with label resolution
//! - [`vm`]: the interpreter

pub mod config;
pub mod context;
pub mod errors;
pub mod frame;
pub mod gas;
pub mod interop;
pub mod isa;
pub mod object;
pub mod script;
pub mod stack;
pub mod vm;

pub use config::VmConfig;
pub use context::{ContextResolver, ExecutionContext};
pub use errors::VMError;
pub use gas::{GasCategory, GasEstimate, GasMachine, GasMeter, GasProfile, Meter};
pub use interop::{InteropContext, InteropOutcome, InteropTable, standard_library};
pub use isa::{Instruction, Op};
pub use object::VMObject;
pub use script::ScriptBuilder;
pub use vm::{ExecutionState, VirtualMachine};
