//! Stack-based virtual machine.
//!
//! The VM runs a fetch/decode/dispatch loop over the frame on top of the call
//! stack. Each instruction goes through four phases:
//! 1. decode at the current frame's offset
//! 2. charge gas through the [`Meter`]
//! 3. validate every precondition without mutating anything
//! 4. apply its effects
//!
//! A failure in phases 1 to 3 leaves the machine exactly as it was before the
//! instruction, then moves it to [`ExecutionState::Fault`]. Faults are terminal.

use crate::storage::context::SharedStorage;
use crate::storage::overlay::OverlayStorage;
use crate::types::bytes::Bytes;
use crate::virtual_machine::config::VmConfig;
use crate::virtual_machine::context::{ContextLoader, ContextResolver, ENTRY_CONTEXT, ExecutionContext};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::frame::ExecutionFrame;
use crate::virtual_machine::gas::{GasCategory, Meter, Unmetered};
use crate::virtual_machine::interop::{self, Interop, InteropContext, InteropOutcome, InteropTable};
use crate::virtual_machine::isa::{Instruction, Op};
use crate::virtual_machine::object::VMObject;
use crate::virtual_machine::stack::Stack;
use num_bigint::BigInt;
use num_traits::Zero;
use std::fmt;
use std::sync::Arc;


/// Where the machine stands between instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    /// Paused after a single step. Resumable.
    Break,
    /// Finished successfully.
    Halt,
    /// Stopped by an error. Terminal.
    Fault(VMError),
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Halt | ExecutionState::Fault(_))
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, ExecutionState::Halt)
    }

    pub fn fault(&self) -> Option<&VMError> {
        match self {
            ExecutionState::Fault(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Running => f.write_str("RUNNING"),
            ExecutionState::Break => f.write_str("BREAK"),
            ExecutionState::Halt => f.write_str("HALT"),
            ExecutionState::Fault(err) => write!(f, "FAULT: {err}"),
        }
    }
}

pub struct VirtualMachine {
    config: VmConfig,
    loader: ContextLoader,
    interops: Arc<InteropTable>,
    stack: Stack,
    /// Call stack; the last frame is executing.
    frames: Vec<ExecutionFrame>,
    state: ExecutionState,
    storage: Option<SharedStorage>,
    events: Vec<VMObject>,
    /// Instructions executed so far, implicit returns excluded.
    steps: u64,
}

impl VirtualMachine {
    /// Wraps `script` as the built-in entry context and prepares its frame.
    pub fn new(script: impl Into<Bytes>, config: VmConfig) -> Self {
        Self::with_entry(ExecutionContext::new(ENTRY_CONTEXT, script, 0), config)
    }

    /// Starts from an explicit entry context, e.g. one with a non-zero base offset.
    pub fn with_entry(entry: ExecutionContext, config: VmConfig) -> Self {
        let mut loader = ContextLoader::new();
        let entry = loader.register(entry);
        let frame = ExecutionFrame::new(entry, 0, config.register_count);
        Self {
            stack: Stack::new(config.max_stack_depth),
            config,
            loader,
            interops: Arc::new(InteropTable::new()),
            frames: vec![frame],
            state: ExecutionState::Running,
            storage: None,
            events: Vec::new(),
            steps: 0,
        }
    }

    /// Renames the entry context. Only meaningful before the first step.
    pub fn with_entry_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if let Some(frame) = self.frames.first_mut() {
            let old = Arc::clone(frame.context());
            self.loader.unregister(old.name());
            let renamed = self.loader.register(old.renamed(name));
            *frame = ExecutionFrame::new(renamed, frame.offset(), self.config.register_count);
        }
        self
    }

    pub fn with_resolver(mut self, resolver: ContextResolver) -> Self {
        self.loader.set_resolver(resolver);
        self
    }

    pub fn with_interops(mut self, interops: impl Into<Arc<InteropTable>>) -> Self {
        self.interops = interops.into();
        self
    }

    pub fn with_storage(mut self, storage: SharedStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Pre-registers a context so `CALL` finds it without the resolver.
    pub fn register_context(&mut self, context: ExecutionContext) {
        self.loader.register(context);
    }

    /// Pushes an argument for the entry code before execution starts.
    pub fn push_argument(&mut self, value: impl Into<VMObject>) -> Result<(), VMError> {
        self.stack.push(value.into())
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Top of the stack, the run's result by convention.
    pub fn result(&self) -> Option<&VMObject> {
        self.stack.peek(0).ok()
    }

    pub fn events(&self) -> &[VMObject] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<VMObject> {
        std::mem::take(&mut self.events)
    }

    pub fn current_frame(&self) -> Option<&ExecutionFrame> {
        self.frames.last()
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn loader(&self) -> &ContextLoader {
        &self.loader
    }

    pub fn storage(&self) -> Option<&SharedStorage> {
        self.storage.as_ref()
    }

    /// Runs until Halt or Fault without gas accounting. Resumes from Break.
    pub fn execute(&mut self) -> ExecutionState {
        self.execute_metered(&mut Unmetered)
    }

    /// Executes exactly one instruction without gas accounting.
    pub fn step(&mut self) -> ExecutionState {
        self.step_metered(&mut Unmetered)
    }

    pub fn execute_metered<M: Meter>(&mut self, meter: &mut M) -> ExecutionState {
        if self.state == ExecutionState::Break {
            self.state = ExecutionState::Running;
        }
        while self.state == ExecutionState::Running {
            self.cycle(meter);
        }
        self.state.clone()
    }

    /// Returns Break after a non-terminal instruction.
    pub fn step_metered<M: Meter>(&mut self, meter: &mut M) -> ExecutionState {
        if self.state.is_terminal() {
            return self.state.clone();
        }
        self.state = ExecutionState::Running;
        self.cycle(meter);
        if self.state == ExecutionState::Running {
            self.state = ExecutionState::Break;
        }
        self.state.clone()
    }

    fn cycle<M: Meter>(&mut self, meter: &mut M) {
        if let Err(fault) = self.execute_next(meter) {
            self.state = ExecutionState::Fault(fault);
        }
    }

    fn execute_next<M: Meter>(&mut self, meter: &mut M) -> Result<(), VMError> {
        let Some(frame) = self.frames.last() else {
            self.state = ExecutionState::Halt;
            return Ok(());
        };
        let context = Arc::clone(frame.context());
        let offset = frame.offset();
        let code = context.code();

        if offset >= code.len() {
            self.leave_frame();
            return Ok(());
        }

        let (op, size) = Op::decode_at(code, offset)?;
        let interop = self.charge(&op, meter)?;
        self.dispatch(op, interop, offset, offset + size, code.len())?;
        self.steps += 1;
        Ok(())
    }

    /// Charges the instruction's full cost up front. For `EXTCALL` this includes
    /// the interop's own cost, so a registered interop is returned for dispatch.
    fn charge<M: Meter>(&self, op: &Op, meter: &mut M) -> Result<Option<Interop>, VMError> {
        let instruction = op.instruction();
        let base = instruction.base_gas();
        match op {
            Op::ExtCall { method } => match self.interops.get(method) {
                Some(interop) => {
                    meter.charge_all(&[
                        (GasCategory::Interop, base),
                        (interop.category, interop.cost),
                    ])?;
                    Ok(Some(interop.clone()))
                }
                None => {
                    meter.charge(base, GasCategory::Interop)?;
                    Err(VMError::InteropNotImplemented(method.clone()))
                }
            },
            _ => {
                let category = match instruction {
                    Instruction::Call | Instruction::Ret => GasCategory::CallOverhead,
                    _ => GasCategory::Opcode,
                };
                meter.charge(base, category)?;
                Ok(None)
            }
        }
    }

    fn dispatch(
        &mut self,
        op: Op,
        interop: Option<Interop>,
        offset: usize,
        next: usize,
        code_len: usize,
    ) -> Result<(), VMError> {
        match op {
            Op::Nop {} => {}
            Op::Push { value } => self.stack.push(value)?,
            Op::Pop {} => {
                self.stack.pop()?;
            }
            Op::Dup {} => {
                let top = self.stack.peek(0)?.clone();
                self.stack.push(top)?;
            }
            Op::Swap {} => self.stack.swap()?,
            Op::Load { reg } => self.op_load(reg)?,
            Op::Store { reg } => self.op_store(reg)?,
            Op::Add {} => self.binary_number(|a, b| Ok(VMObject::Number(a + b)))?,
            Op::Sub {} => self.binary_number(|a, b| Ok(VMObject::Number(a - b)))?,
            Op::Mul {} => self.binary_number(|a, b| Ok(VMObject::Number(a * b)))?,
            Op::Div {} => self.binary_number(|a, b| {
                if b.is_zero() {
                    return Err(VMError::DivisionByZero);
                }
                Ok(VMObject::Number(a / b))
            })?,
            Op::Mod {} => self.binary_number(|a, b| {
                if b.is_zero() {
                    return Err(VMError::DivisionByZero);
                }
                Ok(VMObject::Number(a % b))
            })?,
            Op::Neg {} => {
                let negated = -self.stack.peek(0)?.as_number()?;
                self.stack.replace_top(1, VMObject::Number(negated))?;
            }
            Op::Eq {} => {
                let equal = self.stack.peek(1)? == self.stack.peek(0)?;
                self.stack.replace_top(2, VMObject::Bool(equal))?;
            }
            Op::Lt {} => self.binary_number(|a, b| Ok(VMObject::Bool(a < b)))?,
            Op::Gt {} => self.binary_number(|a, b| Ok(VMObject::Bool(a > b)))?,
            Op::Lte {} => self.binary_number(|a, b| Ok(VMObject::Bool(a <= b)))?,
            Op::Gte {} => self.binary_number(|a, b| Ok(VMObject::Bool(a >= b)))?,
            Op::Not {} => {
                let value = self.stack.peek(0)?.as_bool()?;
                self.stack.replace_top(1, VMObject::Bool(!value))?;
            }
            Op::And {} => self.binary_bool(|a, b| a && b)?,
            Op::Or {} => self.binary_bool(|a, b| a || b)?,
            Op::Cat {} => {
                let joined = interop::concat(self.stack.peek(1)?.clone(), self.stack.peek(0)?.clone())?;
                self.stack.replace_top(2, joined)?;
            }
            Op::Jmp { offset: rel } => {
                let target = Self::jump_target(offset, rel, code_len)?;
                return self.advance(target);
            }
            Op::JmpIf { offset: rel } => return self.op_branch(true, offset, rel, next, code_len),
            Op::JmpNot { offset: rel } => return self.op_branch(false, offset, rel, next, code_len),
            Op::Call {
                context,
                offset: entry,
            } => return self.op_call(&context, entry, next),
            Op::Ret {} => {
                self.leave_frame();
                return Ok(());
            }
            Op::ExtCall { method } => {
                let interop = interop.ok_or_else(|| VMError::InteropNotImplemented(method.clone()))?;
                return self.op_extcall(&method, interop, next);
            }
        }
        self.advance(next)
    }

    fn advance(&mut self, to: usize) -> Result<(), VMError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(VMError::UnexpectedEndOfScript { offset: to })?;
        frame.set_offset(to);
        Ok(())
    }

    /// Pops the current frame. The caller already points past its `CALL`; with no
    /// caller left the run halts. Return values travel on the shared stack.
    fn leave_frame(&mut self) {
        self.frames.pop();
        if self.frames.is_empty() {
            self.state = ExecutionState::Halt;
        }
    }

    fn jump_target(offset: usize, rel: i32, code_len: usize) -> Result<usize, VMError> {
        let target = offset as i64 + i64::from(rel);
        if target < 0 || target > code_len as i64 {
            return Err(VMError::InvalidJump {
                target,
                len: code_len,
            });
        }
        Ok(target as usize)
    }

    fn binary_number<F>(&mut self, f: F) -> Result<(), VMError>
    where
        F: FnOnce(&BigInt, &BigInt) -> Result<VMObject, VMError>,
    {
        let right = self.stack.peek(0)?.as_number()?;
        let left = self.stack.peek(1)?.as_number()?;
        let result = f(left, right)?;
        self.stack.replace_top(2, result)
    }

    fn binary_bool(&mut self, f: impl FnOnce(bool, bool) -> bool) -> Result<(), VMError> {
        let right = self.stack.peek(0)?.as_bool()?;
        let left = self.stack.peek(1)?.as_bool()?;
        self.stack.replace_top(2, VMObject::Bool(f(left, right)))
    }

    fn current_frame_mut(&mut self) -> Result<&mut ExecutionFrame, VMError> {
        self.frames
            .last_mut()
            .ok_or(VMError::UnexpectedEndOfScript { offset: 0 })
    }

    fn op_load(&mut self, reg: u8) -> Result<(), VMError> {
        let value = self.current_frame_mut()?.registers.get(reg)?.clone();
        self.stack.push(value)
    }

    fn op_store(&mut self, reg: u8) -> Result<(), VMError> {
        self.current_frame_mut()?.registers.check(reg)?;
        let value = self.stack.pop()?;
        self.current_frame_mut()?.registers.set(reg, value)
    }

    fn op_branch(
        &mut self,
        jump_when: bool,
        offset: usize,
        rel: i32,
        next: usize,
        code_len: usize,
    ) -> Result<(), VMError> {
        let condition = self.stack.peek(0)?.as_bool()?;
        let target = Self::jump_target(offset, rel, code_len)?;
        self.stack.pop()?;
        self.advance(if condition == jump_when { target } else { next })
    }

    fn op_call(&mut self, name: &str, entry: u32, next: usize) -> Result<(), VMError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VMError::CallDepthExceeded {
                max: self.config.max_call_depth,
            });
        }
        let context = self.loader.load(name)?;
        let len = context.code().len();
        if entry as usize > len {
            return Err(VMError::InvalidJump {
                target: i64::from(entry),
                len,
            });
        }

        self.advance(next)?;
        self.frames.push(ExecutionFrame::new(
            context,
            entry as usize,
            self.config.register_count,
        ));
        Ok(())
    }

    /// Runs the callback against snapshots of the stack, registers and event log,
    /// with storage writes buffered in a private overlay. The overlay is committed
    /// only when the callback succeeds; on error everything is restored.
    fn op_extcall(&mut self, method: &str, interop: Interop, next: usize) -> Result<(), VMError> {
        let stack_snapshot = self.stack.clone();
        let events_len = self.events.len();
        let overlay = self
            .storage
            .as_ref()
            .map(|base| Arc::new(OverlayStorage::new(Arc::clone(base))));
        let call_storage: Option<SharedStorage> = overlay
            .as_ref()
            .map(|overlay| Arc::clone(overlay) as SharedStorage);

        let frame = self
            .frames
            .last_mut()
            .ok_or(VMError::UnexpectedEndOfScript { offset: next })?;
        let registers_snapshot = frame.registers.clone();

        let result = {
            let mut ctx = InteropContext::new(
                method,
                &mut self.stack,
                frame,
                call_storage.as_ref(),
                &mut self.events,
            );
            (interop.callback)(&mut ctx)
        }
        .and_then(|outcome| {
            if let Some(overlay) = &overlay {
                overlay.commit().map_err(|e| VMError::InteropFailed {
                    name: method.to_string(),
                    reason: e.to_string(),
                })?;
            }
            Ok(outcome)
        });

        match result {
            Ok(outcome) => {
                self.advance(next)?;
                if outcome == InteropOutcome::Halt {
                    self.state = ExecutionState::Halt;
                }
                Ok(())
            }
            Err(err) => {
                self.stack = stack_snapshot;
                self.events.truncate(events_len);
                if let Some(frame) = self.frames.last_mut() {
                    frame.registers = registers_snapshot;
                }
                Err(err)
            }
        }
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("state", &self.state)
            .field("call_depth", &self.frames.len())
            .field("stack_len", &self.stack.len())
            .field("steps", &self.steps)
            .finish()
    }
}
