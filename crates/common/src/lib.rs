//! Ember common types and the binary module format.
//!
//! This crate holds everything the virtual machine consumes and everything
//! a module producer needs:
//!
//! - [`RuntimeValue`] and [`ObjectRef`]: what lives in stack cells, object
//!   fields and the return register
//! - [`Opcode`], [`Operand`], [`Instruction`]: the decoded instruction model
//! - [`Module`] and [`FunctionDescriptor`]: a loaded program, with
//!   [`Module::decode`] / [`Module::encode`] for the on-disk format
//! - [`ModuleBuilder`]: in-memory module assembly
//! - [`ModuleError`]: decode and validation failures

mod codec;

pub mod builder;
pub mod error;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod operand;
pub mod value;

pub use builder::ModuleBuilder;
pub use error::ModuleError;
pub use instruction::Instruction;
pub use module::{FunctionDescriptor, Module, Priority};
pub use opcode::Opcode;
pub use operand::Operand;
pub use value::{ObjectRef, RuntimeValue, ValueKind};
