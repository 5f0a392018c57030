//! Errors from decoding and validating Ember modules.

use crate::opcode::Opcode;
use thiserror::Error;

/// Errors that occur while decoding or validating a module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// The file does not start with the module magic.
    #[error("bad magic: expected \"EMB0\", found {found:02x?}")]
    BadMagic { found: [u8; 4] },

    /// The format version is not supported by this runtime.
    #[error("unsupported module version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// The byte stream ended in the middle of a field.
    #[error("unexpected end of module at byte {offset} while reading {what}")]
    UnexpectedEof { offset: usize, what: &'static str },

    /// Bytes remain after the host-call table.
    #[error("{count} trailing bytes after the host-call table")]
    TrailingBytes { count: usize },

    /// Opcode value not recognized.
    #[error("unknown opcode: {0}")]
    UnknownOpcode(u16),

    /// Operand type tag not recognized.
    #[error("unknown operand tag {tag} in instruction {at}")]
    UnknownOperandTag { at: usize, tag: u8 },

    /// Instruction carries the wrong number of operands for its opcode.
    #[error("{opcode} at instruction {at} takes {expected} operands, found {found}")]
    OperandCount {
        at: usize,
        opcode: Opcode,
        expected: usize,
        found: usize,
    },

    /// Operand has a kind the opcode cannot use in that position.
    #[error("operand {index} of {opcode} at instruction {at} has the wrong kind")]
    BadOperand {
        at: usize,
        opcode: Opcode,
        index: usize,
    },

    /// String operand refers past the end of the string table.
    #[error("string index {index} out of range (table size {len}) in instruction {at}")]
    StringIndexOutOfRange { at: usize, index: u32, len: usize },

    /// Call operand refers past the end of the function table.
    #[error("function index {index} out of range (table size {len})")]
    FunctionIndexOutOfRange { index: u32, len: usize },

    /// Call operand refers past the end of the host-call table.
    #[error("host-call index {index} out of range (table size {len}) in instruction {at}")]
    HostCallIndexOutOfRange { at: usize, index: u32, len: usize },

    /// Jump target or function entry point past the end of the stream.
    #[error("instruction index {target} out of range (stream length {len})")]
    InstrTargetOutOfRange { target: u32, len: usize },

    /// Register operand other than the return register.
    #[error("unknown register {id} in instruction {at}")]
    UnknownRegister { at: usize, id: u32 },

    /// Priority tier byte not recognized.
    #[error("unknown priority tier {0}")]
    UnknownPriority(u8),

    /// A string or name is not valid UTF-8.
    #[error("invalid UTF-8 in {what}")]
    InvalidUtf8 { what: &'static str },

    /// A name is too long for its one-byte length prefix.
    #[error("name {name:?} exceeds 255 bytes")]
    NameTooLong { name: String },

    /// A count or index does not fit its on-disk field.
    #[error("{what} does not fit in its on-disk field")]
    FieldOverflow { what: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_bad_magic() {
        assert_eq!(
            ModuleError::BadMagic {
                found: *b"XSE0"
            }
            .to_string(),
            "bad magic: expected \"EMB0\", found [58, 53, 45, 30]"
        );
    }

    #[test]
    fn display_unsupported_version() {
        assert_eq!(
            ModuleError::UnsupportedVersion { major: 0, minor: 7 }.to_string(),
            "unsupported module version 0.7"
        );
    }

    #[test]
    fn display_operand_count() {
        assert_eq!(
            ModuleError::OperandCount {
                at: 3,
                opcode: Opcode::Mov,
                expected: 2,
                found: 1
            }
            .to_string(),
            "MOV at instruction 3 takes 2 operands, found 1"
        );
    }

    #[test]
    fn display_eof() {
        assert_eq!(
            ModuleError::UnexpectedEof {
                offset: 12,
                what: "stack size"
            }
            .to_string(),
            "unexpected end of module at byte 12 while reading stack size"
        );
    }
}
