//! Instruction set definitions.
//!
//! [`for_each_instruction!`] holds the canonical instruction table (opcode,
//! mnemonic, operands, base gas) and feeds it to [`define_instructions!`], which
//! generates:
//! - [`Instruction`], the bare opcode enum with `TryFrom<u8>`, mnemonics and gas
//! - [`Op`], a decoded instruction carrying its operands, with `decode`/`encode`
//!
//! # Bytecode Format
//!
//! One opcode byte followed by the operands, in table order:
//! - `Object`: canonical [`VMObject`] encoding
//! - `Reg`: 1 byte register index
//! - `Offset`: `i32` little-endian, relative to the first byte of the jump instruction
//! - `Name`: length-prefixed UTF-8
//! - `U32`: `u32` little-endian

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::object::VMObject;

macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack
            // =========================
            /// NOP ; no effect
            Nop = 0x00, "NOP" => [], 1,
            /// PUSH object ; push a literal
            Push = 0x01, "PUSH" => [value: Object], 2,
            /// POP ; drop the top item
            Pop = 0x02, "POP" => [], 1,
            /// DUP ; duplicate the top item
            Dup = 0x03, "DUP" => [], 1,
            /// SWAP ; exchange the top two items
            Swap = 0x04, "SWAP" => [], 1,
            // =========================
            // Registers
            // =========================
            /// LOAD r ; push a copy of register r
            Load = 0x10, "LOAD" => [reg: Reg], 1,
            /// STORE r ; pop into register r
            Store = 0x11, "STORE" => [reg: Reg], 1,
            // =========================
            // Arithmetic
            // =========================
            /// ADD ; a + b
            Add = 0x20, "ADD" => [], 3,
            /// SUB ; a - b
            Sub = 0x21, "SUB" => [], 3,
            /// MUL ; a * b
            Mul = 0x22, "MUL" => [], 5,
            /// DIV ; a / b truncated toward zero
            Div = 0x23, "DIV" => [], 10,
            /// MOD ; a % b with the sign of a
            Mod = 0x24, "MOD" => [], 10,
            /// NEG ; -a
            Neg = 0x25, "NEG" => [], 2,
            // =========================
            // Logic / comparison
            // =========================
            /// EQ ; structural equality of any two objects
            Eq = 0x30, "EQ" => [], 3,
            /// LT ; a < b
            Lt = 0x31, "LT" => [], 3,
            /// GT ; a > b
            Gt = 0x32, "GT" => [], 3,
            /// LTE ; a <= b
            Lte = 0x33, "LTE" => [], 3,
            /// GTE ; a >= b
            Gte = 0x34, "GTE" => [], 3,
            /// NOT ; !a
            Not = 0x35, "NOT" => [], 1,
            /// AND ; a && b
            And = 0x36, "AND" => [], 2,
            /// OR ; a || b
            Or = 0x37, "OR" => [], 2,
            /// CAT ; concatenate two strings or two byte arrays
            Cat = 0x38, "CAT" => [], 5,
            // =========================
            // Control flow
            // =========================
            /// JMP offset ; unconditional jump
            Jmp = 0x40, "JMP" => [offset: Offset], 5,
            /// JMPIF offset ; pop a Bool, jump if true
            JmpIf = 0x41, "JMPIF" => [offset: Offset], 5,
            /// JMPNOT offset ; pop a Bool, jump if false
            JmpNot = 0x42, "JMPNOT" => [offset: Offset], 5,
            /// CALL context, offset ; enter `context` at `offset` in a new frame
            Call = 0x43, "CALL" => [context: Name, offset: U32], 50,
            /// RET ; leave the current frame
            Ret = 0x44, "RET" => [], 5,
            /// EXTCALL method ; invoke a host interop (plus the interop's own cost)
            ExtCall = 0x45, "EXTCALL" => [method: Name], 10,
        }
    };
}

macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $gas:expr
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidOpcode {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            pub const ALL: &'static [Instruction] = &[$( Instruction::$name ),*];

            pub const fn opcode(&self) -> u8 {
                *self as u8
            }

            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Static cost charged before the instruction runs.
            pub const fn base_gas(&self) -> u64 {
                match self {
                    $( Instruction::$name => $gas, )*
                }
            }

            pub const fn operand_count(&self) -> usize {
                match self {
                    $( Instruction::$name => <[&str]>::len(&[$( stringify!($field) ),*]), )*
                }
            }
        }

        /// A decoded instruction with its operands.
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub enum Op {
            $(
                $(#[$doc])*
                $name { $( $field: define_instructions!(@ty $kind) ),* },
            )*
        }

        impl Op {
            pub fn instruction(&self) -> Instruction {
                match self {
                    $( Op::$name { .. } => Instruction::$name, )*
                }
            }

            /// Operand-free form of `instruction`, if it takes no operands.
            pub fn bare(instruction: Instruction) -> Option<Op> {
                match instruction {
                    $( Instruction::$name => define_instructions!(@bare $name [$( $field )*]), )*
                }
            }

            /// Decodes the instruction starting at `offset` in `code`.
            ///
            /// Returns the op and its encoded length. `PUSH` literals may not carry
            /// `Interop` objects: those only come from the host.
            pub fn decode_at(code: &[u8], offset: usize) -> Result<(Op, usize), VMError> {
                let mut input = code
                    .get(offset..)
                    .filter(|rest| !rest.is_empty())
                    .ok_or(VMError::UnexpectedEndOfScript { offset })?;
                let available = input.len();
                let opcode = input[0];
                input = &input[1..];
                let instruction = Instruction::try_from(opcode)
                    .map_err(|_| VMError::InvalidOpcode { opcode, offset })?;

                let op = match instruction {
                    $(
                        Instruction::$name => Op::$name {
                            $( $field: Decode::decode(&mut input)
                                .map_err(|err| operand_error(err, offset))?, )*
                        },
                    )*
                };
                if let Op::Push { value: VMObject::Interop { .. } } = &op {
                    return Err(VMError::InvalidOperand { offset });
                }
                Ok((op, available - input.len()))
            }
        }

        impl Encode for Op {
            #[allow(unused_variables)]
            fn encode<S: EncodeSink>(&self, out: &mut S) {
                match self {
                    $(
                        Op::$name { $( $field ),* } => {
                            out.write(&[$opcode]);
                            $( Encode::encode($field, out); )*
                        }
                    )*
                }
            }
        }
    };

    // ---------- operand types ----------
    (@ty Object) => { VMObject };
    (@ty Reg)    => { u8 };
    (@ty Offset) => { i32 };
    (@ty Name)   => { String };
    (@ty U32)    => { u32 };

    // ---------- operand-free construction ----------
    (@bare $name:ident []) => { Some(Op::$name {}) };
    (@bare $name:ident [$( $field:ident )+]) => { None };
}

fn operand_error(err: DecodeError, offset: usize) -> VMError {
    match err {
        DecodeError::UnexpectedEof => VMError::UnexpectedEndOfScript { offset },
        _ => VMError::InvalidOperand { offset },
    }
}

for_each_instruction!(define_instructions);

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mnemonic = self.instruction().mnemonic();
        match self {
            Op::Push { value } => write!(f, "{mnemonic} {value}"),
            Op::Load { reg } | Op::Store { reg } => write!(f, "{mnemonic} r{reg}"),
            Op::Jmp { offset } | Op::JmpIf { offset } | Op::JmpNot { offset } => {
                write!(f, "{mnemonic} {offset:+}")
            }
            Op::Call { context, offset } => write!(f, "{mnemonic} {context} {offset}"),
            Op::ExtCall { method } => write!(f, "{mnemonic} {method}"),
            _ => write!(f, "{mnemonic}"),
        }
    }
}

/// Decodes a whole code buffer into `(offset, op)` pairs.
pub fn disassemble(code: &[u8]) -> Result<Vec<(usize, Op)>, VMError> {
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let (op, size) = Op::decode_at(code, offset)?;
        out.push((offset, op));
        offset += size;
    }
    Ok(out)
}
