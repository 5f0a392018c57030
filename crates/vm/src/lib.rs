//! Ember virtual machine: executes decoded modules.
//!
//! The VM is a tagged-value stack machine with:
//! - One stack array per instance, addressed both by slot (globals, locals,
//!   array elements) and as an evaluation stack at `top`
//! - A mark-and-sweep heap of fixed-size objects
//! - Native host functions callable from scripts by name
//! - A cooperative scheduler interleaving independent instances
//!
//! # Usage
//!
//! ```
//! use ember_common::{ModuleBuilder, Opcode, Operand};
//! use ember_vm::run_module;
//!
//! let mut b = ModuleBuilder::new();
//! let main = b.function("_Main", 0, 0);
//! b.emit(Opcode::Mov, vec![Operand::ret(), Operand::Int(42)]);
//! b.op(Opcode::Ret);
//! b.set_main(main);
//!
//! assert_eq!(run_module(b.build().unwrap()).unwrap(), 42);
//! ```

pub mod call;
pub mod clock;
pub mod config;
pub mod error;
pub mod execute;
pub mod heap;
pub mod host;
pub mod machine;
pub mod output;
pub mod scheduler;

pub use call::{CallInfo, CallKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RuntimeConfig, Timeslices};
pub use error::{ApiError, LoadError, RuntimeError};
pub use execute::{Budget, RunOutcome};
pub use heap::{CollectStats, Heap};
pub use host::{HostFn, HostRegistry};
pub use machine::{ExecutionState, Wake};
pub use output::Output;
pub use scheduler::{InstanceId, Runtime, SchedulerMode, SliceReport};

use ember_common::Module;

/// Load `module` into a fresh runtime, run its main function to completion
/// and return the exit code.
///
/// # Errors
///
/// Returns [`ApiError`] if the module cannot be loaded, has no main
/// function, or faults.
pub fn run_module(module: Module) -> Result<i64, ApiError> {
    let mut runtime = Runtime::default();
    let id = runtime.load_module(module)?;
    runtime.run_main(id)
}
