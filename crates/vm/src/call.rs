//! Call protocol: frame layout, CALL/RET and host-call dispatch.
//!
//! Stack layout of an active call, bottom to top:
//!
//! ```text
//! [param 0 .. param N-1] [return cell] [local M-1 .. local 0] [marker cell]
//!                                                                          ^ frame
//! ```
//!
//! Parameter `k` lives at `frame - (M + 2 + N) + k`, local `j` at
//! `frame - (2 + j)`. The return and marker cells hold `Null`; the return
//! address and caller frame they stand for are kept in a [`CallInfo`] on a
//! parallel control stack. Compiled slot offsets depend only on this
//! layout, never on what the cells contain.

use crate::error::RuntimeError;
use crate::host::HostRegistry;
use crate::machine::ExecutionState;
use ember_common::RuntimeValue;

/// Who started a call, which decides what happens when it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Ordinary script-to-script call.
    Script,
    /// Entered synchronously by the host; returning ends the host's run.
    HostBoundary,
    /// Entered by the host to run under the scheduler; returning with no
    /// outer call left stops the instance.
    Scheduled,
}

/// Typed record of one active call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallInfo {
    /// Function-table index of the callee.
    pub function: u32,
    pub caller_frame: usize,
    pub return_ip: usize,
    pub kind: CallKind,
}

/// What the interpreter loop does after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    /// A `HostBoundary` call returned.
    HostReturn,
    /// A `Scheduled` call returned and the instance stopped.
    Finished,
}

impl ExecutionState {
    /// Enter function `function`, whose arguments are already pushed.
    pub(crate) fn push_call(
        &mut self,
        function: u32,
        kind: CallKind,
        return_ip: usize,
    ) -> Result<(), RuntimeError> {
        let at = self.executing;
        let f = self
            .module
            .function(function)
            .ok_or(RuntimeError::FunctionOutOfRange {
                at,
                index: function,
            })?;
        let entry = f.entry as usize;
        let params = f.param_count as usize;
        let reserved = f.local_count as usize + 2;

        if self.top < params {
            return Err(RuntimeError::StackUnderflow { at });
        }
        let new_top = self.top + reserved;
        if new_top > self.stack.len() {
            return Err(RuntimeError::StackOverflow { at });
        }
        self.stack[self.top..new_top].fill(RuntimeValue::Null);
        self.top = new_top;

        self.frames.push(CallInfo {
            function,
            caller_frame: self.frame,
            return_ip,
            kind,
        });
        self.frame = new_top;
        self.ip = entry;
        Ok(())
    }

    /// Return from the innermost call, discarding its parameters, locals
    /// and any leftover intermediates.
    pub(crate) fn exec_ret(&mut self) -> Result<Flow, RuntimeError> {
        let at = self.executing;
        let info = self
            .frames
            .pop()
            .ok_or(RuntimeError::ReturnWithoutCall { at })?;
        let size = self
            .module
            .function(info.function)
            .ok_or(RuntimeError::FunctionOutOfRange {
                at,
                index: info.function,
            })?
            .frame_size();
        let base = self
            .frame
            .checked_sub(size)
            .ok_or(RuntimeError::StackUnderflow { at })?;

        let end = self.top.max(self.frame);
        self.stack[base..end].fill(RuntimeValue::Null);
        self.top = base;
        self.frame = info.caller_frame;
        self.ip = info.return_ip;

        if self.module.main == Some(info.function) {
            self.exit_code = self.ret.coerce_int();
        }

        Ok(match info.kind {
            CallKind::Script => Flow::Continue,
            CallKind::HostBoundary => Flow::HostReturn,
            CallKind::Scheduled if self.frames.is_empty() => {
                self.running = false;
                Flow::Finished
            }
            CallKind::Scheduled => Flow::Continue,
        })
    }

    /// Invoke the host function named by host-call table entry `index`.
    ///
    /// Instance-scoped functions shadow global ones. No frame is pushed:
    /// the callback reads its arguments below `top` and clears them itself.
    pub(crate) fn call_host(
        &mut self,
        index: u32,
        globals: &HostRegistry,
    ) -> Result<(), RuntimeError> {
        let at = self.executing;
        let name = self
            .module
            .host_calls
            .get(index as usize)
            .ok_or(RuntimeError::BadOperand { at })?;
        let callback = self
            .hosts
            .get(name)
            .or_else(|| globals.get(name))
            .ok_or_else(|| RuntimeError::UnknownHostFunction {
                at,
                name: name.clone(),
            })?;
        callback(self)
    }

    /// Push a call for the named function on behalf of the host.
    ///
    /// The call returns to the current instruction pointer, so an instance
    /// interrupted mid-slice resumes where it stopped.
    pub(crate) fn enter(&mut self, name: &str, kind: CallKind) -> Result<(), RuntimeError> {
        let function =
            self.module
                .find_function(name)
                .ok_or_else(|| RuntimeError::UnknownFunction {
                    at: self.executing,
                    name: name.to_owned(),
                })?;
        self.push_call(function, kind, self.ip)
    }
}
