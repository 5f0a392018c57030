//! Host function bridge.
//!
//! Host functions are native callbacks that scripts call by name. A callback
//! receives the calling instance's [`ExecutionState`], reads its arguments
//! with the `param*` accessors and finishes with one of the `return_*`
//! methods, which store the result and discard the arguments.

use crate::call::CallKind;
use crate::error::RuntimeError;
use crate::machine::ExecutionState;
use ember_common::RuntimeValue;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

/// A native function callable from scripts.
pub type HostFn = Rc<dyn Fn(&mut ExecutionState) -> Result<(), RuntimeError>>;

/// Host functions by exact name, in registration order.
#[derive(Clone, Default)]
pub struct HostRegistry {
    functions: IndexMap<String, HostFn>,
}

impl HostRegistry {
    /// Register `f` under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut ExecutionState) -> Result<(), RuntimeError> + 'static,
    {
        self.functions.insert(name.to_owned(), Rc::new(f));
    }

    pub fn get(&self, name: &str) -> Option<HostFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl ExecutionState {
    /// Register a host function visible only to this instance.
    pub fn register_host<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut ExecutionState) -> Result<(), RuntimeError> + 'static,
    {
        self.hosts.register(name, f);
    }

    /// Number of arguments passed to the running host function.
    pub fn param_count(&self) -> usize {
        self.top.saturating_sub(self.frame)
    }

    /// Argument `i`, counted down from the top of the stack: the last
    /// argument pushed is parameter 0.
    pub fn param(&self, i: usize) -> Result<&RuntimeValue, RuntimeError> {
        let count = self.param_count();
        if i >= count {
            return Err(RuntimeError::ParamOutOfRange {
                at: self.executing,
                index: i,
                count,
            });
        }
        Ok(&self.stack[self.top - (i + 1)])
    }

    pub fn param_as_int(&self, i: usize) -> Result<i64, RuntimeError> {
        self.param(i).map(RuntimeValue::coerce_int)
    }

    pub fn param_as_float(&self, i: usize) -> Result<f64, RuntimeError> {
        self.param(i).map(RuntimeValue::coerce_float)
    }

    /// Argument `i` as a string; null and object arguments are a type
    /// mismatch.
    pub fn param_as_string(&self, i: usize) -> Result<String, RuntimeError> {
        let value = self.param(i)?;
        value.coerce_string().ok_or(RuntimeError::TypeMismatch {
            at: self.executing,
            found: value.kind(),
        })
    }

    /// Discard the arguments and return nothing.
    pub fn return_void(&mut self) {
        if self.top > self.frame {
            self.stack[self.frame..self.top].fill(RuntimeValue::Null);
            self.top = self.frame;
        }
    }

    /// Store `value` in the return register and discard the arguments.
    pub fn return_with(&mut self, value: RuntimeValue) {
        self.ret = value;
        self.return_void();
    }

    pub fn return_int(&mut self, value: i64) {
        self.return_with(RuntimeValue::Int(value));
    }

    pub fn return_float(&mut self, value: f64) {
        self.return_with(RuntimeValue::Float(value));
    }

    pub fn return_string(&mut self, value: impl Into<String>) {
        self.return_with(RuntimeValue::String(value.into()));
    }

    /// Enter a script function from inside a host callback.
    ///
    /// Push the function's arguments first. The function body starts as
    /// soon as the callback returns, and its `RET` resumes the script after
    /// the instruction that called the host.
    pub fn enter_function(&mut self, name: &str) -> Result<(), RuntimeError> {
        self.enter(name, CallKind::Script)
    }

    /// A host failure at the current instruction.
    pub fn host_error(&self, message: impl Into<String>) -> RuntimeError {
        RuntimeError::Host {
            at: self.executing,
            message: message.into(),
        }
    }
}
