//! Errors for the Ember VM.
//!
//! [`RuntimeError`] is raised by the interpreter and always carries the
//! index of the faulting instruction (`at`). [`LoadError`] is the result of
//! loading a module into a new instance. [`ApiError`] is what the embedding
//! API returns.

use crate::scheduler::InstanceId;
use ember_common::{ModuleError, ValueKind};
use std::path::PathBuf;
use thiserror::Error;

/// Faults raised while executing an instance.
///
/// A fault stops the faulting instance. Other instances are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Push past the end of the stack.
    #[error("stack overflow at instruction {at}")]
    StackOverflow { at: usize },

    /// Pop from an empty stack.
    #[error("stack underflow at instruction {at}")]
    StackUnderflow { at: usize },

    /// Operand resolved to a cell outside the stack.
    #[error("stack index {index} out of range at instruction {at}")]
    SlotOutOfRange { at: usize, index: i64 },

    /// Operand kind cannot be used where it appears.
    #[error("invalid operand at instruction {at}")]
    BadOperand { at: usize },

    /// Value of the wrong kind for the operation.
    #[error("type mismatch: unexpected {found} at instruction {at}")]
    TypeMismatch { at: usize, found: ValueKind },

    /// Integer DIV or MOD by zero.
    #[error("division by zero at instruction {at}")]
    DivisionByZero { at: usize },

    /// GETCHAR/SETCHAR index outside the string.
    #[error("character index {index} out of range (length {len}) at instruction {at}")]
    StringIndexOutOfRange { at: usize, index: i64, len: usize },

    /// Object handle refers to a collected object.
    #[error("dangling object reference at instruction {at}")]
    DanglingObject { at: usize },

    /// Field index outside the object.
    #[error("field {index} out of range (object has {len} fields) at instruction {at}")]
    FieldOutOfRange { at: usize, index: i64, len: usize },

    /// NEW with a negative field count, or more fields than the
    /// configured limit.
    #[error("cannot allocate an object with {count} fields at instruction {at}")]
    BadFieldCount { at: usize, count: i64 },

    /// The heap could not hold another object.
    #[error("out of memory allocating {fields} fields at instruction {at}")]
    OutOfMemory { at: usize, fields: usize },

    /// TRAP with an interrupt number that has no handler.
    #[error("unknown interrupt {interrupt} at instruction {at}")]
    UnknownInterrupt { at: usize, interrupt: i64 },

    /// Writing TRAP output failed.
    #[error("cannot write output at instruction {at}: {message}")]
    Output { at: usize, message: String },

    /// No host function registered under the called name.
    #[error("host function {name:?} is not registered (instruction {at})")]
    UnknownHostFunction { at: usize, name: String },

    /// No script function with the given name.
    #[error("function {name:?} not found (instruction {at})")]
    UnknownFunction { at: usize, name: String },

    /// Function index outside the function table.
    #[error("function index {index} out of range at instruction {at}")]
    FunctionOutOfRange { at: usize, index: u32 },

    /// RET with no active call.
    #[error("RET without a matching call at instruction {at}")]
    ReturnWithoutCall { at: usize },

    /// Host function read a parameter that was not passed.
    #[error("parameter {index} requested but only {count} passed (instruction {at})")]
    ParamOutOfRange { at: usize, index: usize, count: usize },

    /// Failure reported by a host function.
    #[error("host function failed at instruction {at}: {message}")]
    Host { at: usize, message: String },
}

/// Failures while loading a module into a new instance.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The module file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a valid module.
    #[error(transparent)]
    Decode(#[from] ModuleError),

    /// The instance stack could not be allocated, or is larger than the
    /// configured maximum.
    #[error("cannot allocate a stack of {cells} cells")]
    OutOfMemory { cells: usize },

    /// The runtime already holds its maximum number of instances.
    #[error("no free instance slot (limit {limit})")]
    NoFreeInstanceSlot { limit: usize },
}

/// Errors returned by the embedding API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The handle does not name a loaded instance.
    #[error("no instance {0}")]
    UnknownInstance(InstanceId),

    /// The module has no function with that name.
    #[error("instance {instance} has no function {name:?}")]
    FunctionNotFound { instance: InstanceId, name: String },

    /// The instance faulted and was stopped.
    #[error("instance {instance} faulted: {source}")]
    Fault {
        instance: InstanceId,
        #[source]
        source: RuntimeError,
    },

    /// A synchronous call could not run to completion because the instance
    /// broke, halted or was stopped.
    #[error("synchronous call to {name:?} in instance {instance} was suspended")]
    SyncCallSuspended { instance: InstanceId, name: String },
}
