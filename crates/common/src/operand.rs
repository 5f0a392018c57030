//! Instruction operands.
//!
//! Operands are decoded once when a module is loaded and never change
//! afterwards. The interpreter resolves them to a [`RuntimeValue`] or to a
//! writable cell at execution time.

use crate::value::RuntimeValue;
use std::fmt;

/// On-disk operand type tags.
pub mod tag {
    pub const INT: u8 = 0;
    pub const FLOAT: u8 = 1;
    pub const STRING: u8 = 2;
    pub const ABSOLUTE_SLOT: u8 = 3;
    pub const RELATIVE_SLOT: u8 = 4;
    pub const INSTR_TARGET: u8 = 5;
    pub const FUNC_TARGET: u8 = 6;
    pub const HOST_CALL_TARGET: u8 = 7;
    pub const REGISTER: u8 = 8;
}

/// The return register, the only register the machine has.
pub const RETURN_REGISTER: u32 = 0;

/// A decoded instruction operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal, materialized from the string table at load time.
    Str(String),
    /// Stack cell. Negative indices are relative to the frame pointer,
    /// non-negative ones to the stack base.
    AbsoluteSlot(i32),
    /// Array element: `base ± value-of(stack[index_slot])`.
    ///
    /// Non-negative bases grow upward (globals), negative bases grow
    /// downward (locals).
    RelativeSlot {
        /// Cell of element 0.
        base: i32,
        /// Cell holding the integer element index.
        index_slot: i32,
    },
    /// Instruction index.
    InstrTarget(u32),
    /// Function table index.
    FuncTarget(u32),
    /// Host-call name table index.
    HostCallTarget(u32),
    /// Register id; only [`RETURN_REGISTER`] is valid.
    Register(u32),
}

impl Operand {
    /// The on-disk tag for this operand.
    pub fn tag(&self) -> u8 {
        match self {
            Operand::Int(_) => tag::INT,
            Operand::Float(_) => tag::FLOAT,
            Operand::Str(_) => tag::STRING,
            Operand::AbsoluteSlot(_) => tag::ABSOLUTE_SLOT,
            Operand::RelativeSlot { .. } => tag::RELATIVE_SLOT,
            Operand::InstrTarget(_) => tag::INSTR_TARGET,
            Operand::FuncTarget(_) => tag::FUNC_TARGET,
            Operand::HostCallTarget(_) => tag::HOST_CALL_TARGET,
            Operand::Register(_) => tag::REGISTER,
        }
    }

    /// The literal value, if this operand is a literal.
    pub fn literal(&self) -> Option<RuntimeValue> {
        match self {
            Operand::Int(i) => Some(RuntimeValue::Int(*i)),
            Operand::Float(f) => Some(RuntimeValue::Float(*f)),
            Operand::Str(s) => Some(RuntimeValue::String(s.clone())),
            _ => None,
        }
    }

    /// Shorthand for the return register operand.
    pub fn ret() -> Self {
        Operand::Register(RETURN_REGISTER)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Int(value)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Float(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Str(value.to_owned())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Int(i) => write!(f, "{i}"),
            Operand::Float(x) => write!(f, "{x:?}"),
            Operand::Str(s) => write!(f, "{s:?}"),
            Operand::AbsoluteSlot(i) => write!(f, "[{i}]"),
            Operand::RelativeSlot { base, index_slot } => write!(f, "[{base}+[{index_slot}]]"),
            Operand::InstrTarget(i) => write!(f, "@{i}"),
            Operand::FuncTarget(i) => write!(f, "fn#{i}"),
            Operand::HostCallTarget(i) => write!(f, "host#{i}"),
            Operand::Register(_) => f.write_str("_RetVal"),
        }
    }
}
