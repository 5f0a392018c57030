//! Opcode definitions for the Ember instruction set.

use crate::error::ModuleError;
use std::fmt;

/// Identifies the operation to perform.
///
/// The `#[repr(u16)]` discriminant is the on-disk encoding.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// No operation.
    Nop = 0,
    /// Copy operand 1 into the slot or register named by operand 0.
    Mov = 1,

    // Binary arithmetic: pop right, pop left, push result typed by left.
    /// Addition.
    Add = 2,
    /// Subtraction.
    Sub = 3,
    /// Multiplication.
    Mul = 4,
    /// Division; truncating for integers.
    Div = 5,
    /// Integer remainder.
    Mod = 6,
    /// Exponentiation.
    Exp = 7,

    // Unary: mutate top of stack in place.
    /// Negate.
    Neg = 8,
    /// Increment by one.
    Inc = 9,
    /// Decrement by one.
    Dec = 10,

    // Bitwise (integer left operand only).
    /// Bitwise and.
    And = 11,
    /// Bitwise or.
    Or = 12,
    /// Bitwise exclusive or.
    Xor = 13,
    /// Bitwise complement of the top of stack.
    Not = 14,
    /// Shift left.
    Shl = 15,
    /// Arithmetic shift right.
    Shr = 16,

    // Strings.
    /// Append operand 1 to the string in operand 0.
    Concat = 17,
    /// `dest, src, index`: dest becomes the one-character string `src[index]`.
    GetChar = 18,
    /// `dest, index, src`: replace `dest[index]` with the first character of src.
    SetChar = 19,

    // Control flow.
    /// Unconditional jump.
    Jmp = 20,
    /// Pop two, jump if equal.
    Je = 21,
    /// Pop two, jump if not equal.
    Jne = 22,
    /// Pop two, jump if left > right.
    Jg = 23,
    /// Pop two, jump if left < right.
    Jl = 24,
    /// Pop two, jump if left >= right.
    Jge = 25,
    /// Pop two, jump if left <= right.
    Jle = 26,
    /// Pop one, jump if truthy.
    BrTrue = 27,
    /// Pop one, jump if falsy.
    BrFalse = 28,

    // Stack.
    /// Push operand 0.
    Push = 29,
    /// Pop into operand 0.
    Pop = 30,
    /// Push a copy of the top of stack.
    Dup = 31,
    /// Discard the top of stack.
    Remove = 32,
    /// Push `Int(0)`.
    IConst0 = 33,
    /// Push `Int(1)`.
    IConst1 = 34,
    /// Push `Float(0.0)`.
    FConst0 = 35,
    /// Push `Float(1.0)`.
    FConst1 = 36,

    // Calls.
    /// Call a script function or a host function.
    Call = 37,
    /// Return from the current script function.
    Ret = 38,

    // Heap.
    /// Allocate an object with operand 0 fields and push its reference.
    New = 39,
    /// `dest, object, index`: read an object field.
    GetField = 40,
    /// `object, index, src`: write an object field.
    SetField = 41,

    /// Square root of the top of stack; always yields a float.
    Sqrt = 42,

    // Instance lifecycle.
    /// Pause this instance for operand 0 milliseconds.
    Pause = 43,
    /// Pause this instance until the host resumes it.
    Break = 44,
    /// Stop this instance.
    Halt = 45,

    /// Software interrupt operand 0. Interrupt 0 pops and prints the top of
    /// stack.
    Trap = 46,
}

/// All opcodes, in encoding order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 47] = [
    Opcode::Nop,
    Opcode::Mov,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Div,
    Opcode::Mod,
    Opcode::Exp,
    Opcode::Neg,
    Opcode::Inc,
    Opcode::Dec,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
    Opcode::Not,
    Opcode::Shl,
    Opcode::Shr,
    Opcode::Concat,
    Opcode::GetChar,
    Opcode::SetChar,
    Opcode::Jmp,
    Opcode::Je,
    Opcode::Jne,
    Opcode::Jg,
    Opcode::Jl,
    Opcode::Jge,
    Opcode::Jle,
    Opcode::BrTrue,
    Opcode::BrFalse,
    Opcode::Push,
    Opcode::Pop,
    Opcode::Dup,
    Opcode::Remove,
    Opcode::IConst0,
    Opcode::IConst1,
    Opcode::FConst0,
    Opcode::FConst1,
    Opcode::Call,
    Opcode::Ret,
    Opcode::New,
    Opcode::GetField,
    Opcode::SetField,
    Opcode::Sqrt,
    Opcode::Pause,
    Opcode::Break,
    Opcode::Halt,
    Opcode::Trap,
];

impl Opcode {
    /// Number of operands this opcode takes.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Mov | Opcode::Concat => 2,
            Opcode::GetChar | Opcode::SetChar | Opcode::GetField | Opcode::SetField => 3,
            Opcode::Jmp
            | Opcode::Je
            | Opcode::Jne
            | Opcode::Jg
            | Opcode::Jl
            | Opcode::Jge
            | Opcode::Jle
            | Opcode::BrTrue
            | Opcode::BrFalse
            | Opcode::Push
            | Opcode::Pop
            | Opcode::Call
            | Opcode::New
            | Opcode::Pause
            | Opcode::Trap => 1,
            _ => 0,
        }
    }

    /// Whether operand 0 of this opcode is a jump target.
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            Opcode::Jmp
                | Opcode::Je
                | Opcode::Jne
                | Opcode::Jg
                | Opcode::Jl
                | Opcode::Jge
                | Opcode::Jle
                | Opcode::BrTrue
                | Opcode::BrFalse
        )
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Mov => "MOV",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Exp => "EXP",
            Opcode::Neg => "NEG",
            Opcode::Inc => "INC",
            Opcode::Dec => "DEC",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            Opcode::Not => "NOT",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Concat => "CONCAT",
            Opcode::GetChar => "GETCHAR",
            Opcode::SetChar => "SETCHAR",
            Opcode::Jmp => "JMP",
            Opcode::Je => "JE",
            Opcode::Jne => "JNE",
            Opcode::Jg => "JG",
            Opcode::Jl => "JL",
            Opcode::Jge => "JGE",
            Opcode::Jle => "JLE",
            Opcode::BrTrue => "BRTRUE",
            Opcode::BrFalse => "BRFALSE",
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Remove => "REMOVE",
            Opcode::IConst0 => "ICONST0",
            Opcode::IConst1 => "ICONST1",
            Opcode::FConst0 => "FCONST0",
            Opcode::FConst1 => "FCONST1",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::New => "NEW",
            Opcode::GetField => "GETFIELD",
            Opcode::SetField => "SETFIELD",
            Opcode::Sqrt => "SQRT",
            Opcode::Pause => "PAUSE",
            Opcode::Break => "BREAK",
            Opcode::Halt => "HALT",
            Opcode::Trap => "TRAP",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl TryFrom<u16> for Opcode {
    type Error = ModuleError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        ALL_OPCODES
            .get(value as usize)
            .copied()
            .ok_or(ModuleError::UnknownOpcode(value))
    }
}
