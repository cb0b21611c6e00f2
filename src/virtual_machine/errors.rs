use crate::types::encoding::DecodeError;
use chainvm_derive::Error;

/// Faults raised while executing a script.
///
/// Any of these moves the machine to [`ExecutionState::Fault`](super::vm::ExecutionState::Fault);
/// the faulting instruction's effects are never applied.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VMError {
    #[error("stack underflow")]
    StackUnderflow,
    #[error("stack overflow: maximum depth is {max}")]
    StackOverflow { max: usize },
    #[error("register index {index} out of bounds ({available} available)")]
    InvalidRegister { index: u8, available: usize },
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("missing struct field: {0}")]
    MissingField(String),
    #[error("number does not fit in {target}")]
    NumberOutOfRange { target: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("execution context not found: {0}")]
    ContextNotFound(String),
    #[error("interop not implemented: {0}")]
    InteropNotImplemented(String),
    #[error("interop {name} failed: {reason}")]
    InteropFailed { name: String, reason: String },
    #[error("out of gas: used {used} of {limit}, instruction requires {required}")]
    OutOfGas { used: u64, limit: u64, required: u64 },
    #[error("call depth exceeded: maximum is {max}")]
    CallDepthExceeded { max: usize },
    #[error("jump target {target} outside code of length {len}")]
    InvalidJump { target: i64, len: usize },
    #[error("script ends inside the instruction at offset {offset}")]
    UnexpectedEndOfScript { offset: usize },
    #[error("malformed operand for the instruction at offset {offset}")]
    InvalidOperand { offset: usize },
    #[error("decoding error: {0}")]
    Decode(DecodeError),
}

impl From<DecodeError> for VMError {
    fn from(err: DecodeError) -> Self {
        VMError::Decode(err)
    }
}
