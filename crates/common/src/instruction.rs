//! Decoded instructions.

use crate::opcode::Opcode;
use crate::operand::Operand;
use std::fmt;

/// A single instruction: an opcode and its ordered operand list.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The operation to perform.
    pub opcode: Opcode,
    /// Operands, in encoding order.
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Create a new instruction.
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    /// An instruction with no operands.
    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    /// Operand `i`.
    ///
    /// Modules are validated at load time, so every operand index the
    /// interpreter asks for exists.
    pub fn operand(&self, i: usize) -> Option<&Operand> {
        self.operands.get(i)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}
