use crate::virtual_machine::context::ExecutionContext;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMObject;
use std::sync::Arc;

/// Fixed-size register file. Slots start as [`VMObject::None`].
#[derive(Clone, Debug, PartialEq)]
pub struct Registers {
    regs: Vec<VMObject>,
}

impl Registers {
    pub fn new(count: usize) -> Self {
        Self {
            regs: vec![VMObject::None; count],
        }
    }

    /// Returns [`VMError::InvalidRegister`] if `idx` is out of bounds.
    pub fn check(&self, idx: u8) -> Result<(), VMError> {
        if (idx as usize) < self.regs.len() {
            Ok(())
        } else {
            Err(VMError::InvalidRegister {
                index: idx,
                available: self.regs.len(),
            })
        }
    }

    pub fn get(&self, idx: u8) -> Result<&VMObject, VMError> {
        self.regs
            .get(idx as usize)
            .ok_or(VMError::InvalidRegister {
                index: idx,
                available: self.regs.len(),
            })
    }

    pub fn set(&mut self, idx: u8, value: VMObject) -> Result<(), VMError> {
        let available = self.regs.len();
        let slot = self
            .regs
            .get_mut(idx as usize)
            .ok_or(VMError::InvalidRegister {
                index: idx,
                available,
            })?;
        *slot = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }
}

/// One activation: the context being executed, the program offset within its
/// code and a private register file.
#[derive(Clone, Debug)]
pub struct ExecutionFrame {
    context: Arc<ExecutionContext>,
    offset: usize,
    pub registers: Registers,
}

impl ExecutionFrame {
    pub fn new(context: Arc<ExecutionContext>, offset: usize, register_count: usize) -> Self {
        Self {
            context,
            offset,
            registers: Registers::new(register_count),
        }
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    /// Offset of the next instruction, relative to the context's code.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_start_empty() {
        let regs = Registers::new(4);
        assert_eq!(regs.len(), 4);
        assert_eq!(regs.get(3).unwrap(), &VMObject::None);
    }

    #[test]
    fn out_of_range_register() {
        let mut regs = Registers::new(2);
        let expected = VMError::InvalidRegister {
            index: 2,
            available: 2,
        };
        assert_eq!(regs.get(2), Err(expected.clone()));
        assert_eq!(regs.set(2, VMObject::Bool(true)), Err(expected.clone()));
        assert_eq!(regs.check(2), Err(expected));
        assert!(regs.check(1).is_ok());
    }

    #[test]
    fn frames_own_their_registers() {
        let context = Arc::new(ExecutionContext::new("main", vec![0x00], 0));
        let mut a = ExecutionFrame::new(context.clone(), 0, 2);
        let b = ExecutionFrame::new(context, 0, 2);
        a.registers.set(0, VMObject::from(1i64)).unwrap();
        assert_eq!(b.registers.get(0).unwrap(), &VMObject::None);
    }
}
