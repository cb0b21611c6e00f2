//! Programmatic bytecode emitter.
//!
//! [`ScriptBuilder`] writes the exact byte format the VM decodes. Jumps and
//! calls may reference labels defined before or after them; references are
//! patched when [`ScriptBuilder::build`] runs.

use crate::types::encoding::Encode;
use crate::virtual_machine::isa::{Instruction, Op};
use crate::virtual_machine::object::VMObject;
use chainvm_derive::Error;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("label '{0}' is never defined")]
    UndefinedLabel(String),
    #[error("label '{0}' is defined twice")]
    DuplicateLabel(String),
    #[error("{0} takes operands; use its dedicated builder method")]
    OperandsRequired(&'static str),
    #[error("jump to label '{0}' does not fit in a 32-bit offset")]
    JumpOutOfRange(String),
}

#[derive(Debug, Clone)]
enum Patch {
    /// i32 relative to the start of the jump instruction.
    Relative { instr_start: usize },
    /// u32 absolute offset, as used by `CALL`.
    Absolute,
}

#[derive(Debug, Clone)]
struct Fixup {
    /// Position of the operand to patch.
    at: usize,
    label: String,
    patch: Patch,
}

#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    code: Vec<u8>,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    /// First definition error, reported by `build`.
    error: Option<ScriptError>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset the next instruction will be written at.
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    fn record_error(&mut self, err: ScriptError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn op(&mut self, op: Op) -> &mut Self {
        op.encode(&mut self.code);
        self
    }

    /// Emits an operand-free instruction.
    pub fn emit(&mut self, instruction: Instruction) -> &mut Self {
        match Op::bare(instruction) {
            Some(op) => self.op(op),
            None => {
                self.record_error(ScriptError::OperandsRequired(instruction.mnemonic()));
                self
            }
        }
    }

    /// Marks the current offset as `name`.
    pub fn label(&mut self, name: &str) -> &mut Self {
        let offset = self.offset();
        if self.labels.insert(name.to_string(), offset).is_some() {
            self.record_error(ScriptError::DuplicateLabel(name.to_string()));
        }
        self
    }

    pub fn push(&mut self, value: impl Into<VMObject>) -> &mut Self {
        self.op(Op::Push {
            value: value.into(),
        })
    }

    pub fn push_str(&mut self, value: &str) -> &mut Self {
        self.push(value.to_string())
    }

    pub fn push_int(&mut self, value: i64) -> &mut Self {
        self.push(value)
    }

    pub fn load(&mut self, reg: u8) -> &mut Self {
        self.op(Op::Load { reg })
    }

    pub fn store(&mut self, reg: u8) -> &mut Self {
        self.op(Op::Store { reg })
    }

    pub fn jmp(&mut self, label: &str) -> &mut Self {
        self.jump(Op::Jmp { offset: 0 }, label)
    }

    pub fn jmp_if(&mut self, label: &str) -> &mut Self {
        self.jump(Op::JmpIf { offset: 0 }, label)
    }

    pub fn jmp_not(&mut self, label: &str) -> &mut Self {
        self.jump(Op::JmpNot { offset: 0 }, label)
    }

    fn jump(&mut self, placeholder: Op, label: &str) -> &mut Self {
        let instr_start = self.offset();
        self.op(placeholder);
        self.fixups.push(Fixup {
            at: instr_start + 1,
            label: label.to_string(),
            patch: Patch::Relative { instr_start },
        });
        self
    }

    /// `CALL` into another context at a fixed offset.
    pub fn call(&mut self, context: &str, offset: u32) -> &mut Self {
        self.op(Op::Call {
            context: context.to_string(),
            offset,
        })
    }

    /// `CALL` into `context` at a label of this script. Only meaningful when the
    /// named context runs this same code.
    pub fn call_label(&mut self, context: &str, label: &str) -> &mut Self {
        self.call(context, 0);
        self.fixups.push(Fixup {
            at: self.offset() - 4,
            label: label.to_string(),
            patch: Patch::Absolute,
        });
        self
    }

    pub fn ret(&mut self) -> &mut Self {
        self.emit(Instruction::Ret)
    }

    pub fn ext_call(&mut self, method: &str) -> &mut Self {
        self.op(Op::ExtCall {
            method: method.to_string(),
        })
    }

    /// Resolves label references and returns the finished code.
    pub fn build(&self) -> Result<Vec<u8>, ScriptError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let mut code = self.code.clone();
        for fixup in &self.fixups {
            let target = *self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| ScriptError::UndefinedLabel(fixup.label.clone()))?;
            let out_of_range = || ScriptError::JumpOutOfRange(fixup.label.clone());
            let bytes = match fixup.patch {
                Patch::Relative { instr_start } => {
                    let rel = i32::try_from(target as i64 - instr_start as i64)
                        .map_err(|_| out_of_range())?;
                    rel.to_le_bytes()
                }
                Patch::Absolute => u32::try_from(target)
                    .map_err(|_| out_of_range())?
                    .to_le_bytes(),
            };
            code[fixup.at..fixup.at + 4].copy_from_slice(&bytes);
        }
        Ok(code)
    }
}
