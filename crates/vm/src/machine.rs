//! Per-instance execution state: the value stack, registers, heap and
//! operand resolution.

use crate::call::CallInfo;
use crate::error::{LoadError, RuntimeError};
use crate::heap::{CollectStats, Heap};
use crate::host::HostRegistry;
use crate::output::Output;
use ember_common::{Module, Operand, RuntimeValue};
use std::rc::Rc;
use tracing::debug;

/// Why a paused instance is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// Runnable again once the clock reaches this time.
    At(u64),
    /// Runnable again only after the host resumes it.
    OnResume,
}

/// A writable location named by an operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Place {
    Cell(usize),
    Ret,
}

/// One script instance.
///
/// The stack is a single array of cells used two ways: globals, locals and
/// array elements are addressed by slot operands, while expression
/// intermediates are pushed and popped at `top`. Cells `0..global_size`
/// hold globals.
#[derive(Debug)]
pub struct ExecutionState {
    pub(crate) module: Rc<Module>,
    pub(crate) stack: Vec<RuntimeValue>,
    pub(crate) top: usize,
    pub(crate) frame: usize,
    /// Typed call records, one per active call; parallel to the marker cells.
    pub(crate) frames: Vec<CallInfo>,
    /// Next instruction to execute.
    pub(crate) ip: usize,
    /// Instruction currently executing, reported in faults.
    pub(crate) executing: usize,
    pub(crate) ret: RuntimeValue,
    pub(crate) running: bool,
    pub(crate) pause: Option<Wake>,
    pub(crate) exit_code: i64,
    pub(crate) heap: Heap,
    pub(crate) hosts: HostRegistry,
    pub(crate) timeslice_ms: u64,
    pub(crate) output: Output,
}

impl ExecutionState {
    /// Create an instance with a stack of `stack_cells` cells.
    pub fn new(
        module: Rc<Module>,
        stack_cells: usize,
        gc_threshold: usize,
        timeslice_ms: u64,
    ) -> Result<Self, LoadError> {
        let globals = module.global_size as usize;
        if globals > stack_cells {
            return Err(LoadError::OutOfMemory { cells: globals });
        }
        let mut stack = Vec::new();
        stack
            .try_reserve_exact(stack_cells)
            .map_err(|_| LoadError::OutOfMemory { cells: stack_cells })?;
        stack.resize(stack_cells, RuntimeValue::Null);

        Ok(Self {
            module,
            stack,
            top: globals,
            frame: globals,
            frames: Vec::new(),
            ip: 0,
            executing: 0,
            ret: RuntimeValue::Null,
            running: false,
            pause: None,
            exit_code: 0,
            heap: Heap::new(gc_threshold),
            hosts: HostRegistry::default(),
            timeslice_ms,
            output: Output::default(),
        })
    }

    /// Where `TRAP 0` prints.
    pub fn set_output(&mut self, output: Output) {
        self.output = output;
    }

    /// Return to the freshly loaded state. Instance host functions, the
    /// output and the timeslice are kept.
    pub fn reset(&mut self) {
        self.stack.fill(RuntimeValue::Null);
        let globals = self.module.global_size as usize;
        self.top = globals;
        self.frame = globals;
        self.frames.clear();
        self.ip = 0;
        self.executing = 0;
        self.ret = RuntimeValue::Null;
        self.running = false;
        self.pause = None;
        self.exit_code = 0;
        self.heap.clear();
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pause_state(&self) -> Option<Wake> {
        self.pause
    }

    /// Value the entry function last returned, as an integer.
    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn return_value(&self) -> &RuntimeValue {
        &self.ret
    }

    /// Index one past the last occupied cell.
    pub fn top(&self) -> usize {
        self.top
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Number of active calls.
    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn cell(&self, index: usize) -> Option<&RuntimeValue> {
        self.stack.get(index)
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn timeslice_ms(&self) -> u64 {
        self.timeslice_ms
    }

    /// Push a value, e.g. an argument for a call about to be entered.
    pub fn push_value(&mut self, value: RuntimeValue) -> Result<(), RuntimeError> {
        self.push(value)
    }

    pub(crate) fn push(&mut self, value: RuntimeValue) -> Result<(), RuntimeError> {
        let cell = self
            .stack
            .get_mut(self.top)
            .ok_or(RuntimeError::StackOverflow { at: self.executing })?;
        *cell = value;
        self.top += 1;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<RuntimeValue, RuntimeError> {
        if self.top == 0 {
            return Err(RuntimeError::StackUnderflow { at: self.executing });
        }
        self.top -= 1;
        Ok(std::mem::take(&mut self.stack[self.top]))
    }

    /// The top-of-stack cell, for in-place unary operations.
    pub(crate) fn peek_mut(&mut self) -> Result<&mut RuntimeValue, RuntimeError> {
        match self.top.checked_sub(1) {
            Some(i) => Ok(&mut self.stack[i]),
            None => Err(RuntimeError::StackUnderflow { at: self.executing }),
        }
    }

    /// Translate a stored slot index to an absolute cell index. Negative
    /// indices are relative to the frame pointer.
    fn cell_index(&self, raw: i64) -> Result<usize, RuntimeError> {
        let absolute = if raw < 0 {
            self.frame as i64 + raw
        } else {
            raw
        };
        usize::try_from(absolute)
            .ok()
            .filter(|&i| i < self.stack.len())
            .ok_or(RuntimeError::SlotOutOfRange {
                at: self.executing,
                index: raw,
            })
    }

    pub(crate) fn place(&self, op: &Operand) -> Result<Place, RuntimeError> {
        match *op {
            Operand::AbsoluteSlot(index) => self.cell_index(i64::from(index)).map(Place::Cell),
            Operand::RelativeSlot { base, index_slot } => {
                let slot = self.cell_index(i64::from(index_slot))?;
                let offset = self.stack[slot].coerce_int();
                let base = i64::from(base);
                // Global arrays grow upward from their base, local arrays downward.
                let raw = if base >= 0 {
                    base.wrapping_add(offset)
                } else {
                    base.wrapping_sub(offset)
                };
                self.cell_index(raw).map(Place::Cell)
            }
            Operand::Register(_) => Ok(Place::Ret),
            _ => Err(RuntimeError::BadOperand { at: self.executing }),
        }
    }

    pub(crate) fn place_mut(&mut self, place: Place) -> &mut RuntimeValue {
        match place {
            Place::Cell(i) => &mut self.stack[i],
            Place::Ret => &mut self.ret,
        }
    }

    /// Resolve an operand to a value: literals directly, slots and the
    /// return register by copying their contents.
    pub(crate) fn value(&self, op: &Operand) -> Result<RuntimeValue, RuntimeError> {
        if let Some(literal) = op.literal() {
            return Ok(literal);
        }
        Ok(match self.place(op)? {
            Place::Cell(i) => self.stack[i].clone(),
            Place::Ret => self.ret.clone(),
        })
    }

    /// Overwrite the slot or register named by `op`.
    pub(crate) fn store(&mut self, op: &Operand, value: RuntimeValue) -> Result<(), RuntimeError> {
        let place = self.place(op)?;
        *self.place_mut(place) = value;
        Ok(())
    }

    /// Run a full collection with the stack below `top` and the return
    /// register as roots.
    pub fn collect_garbage(&mut self) -> CollectStats {
        let roots = self.stack[..self.top].iter().chain(std::iter::once(&self.ret));
        let stats = self.heap.collect(roots);
        debug!(
            freed = stats.freed,
            survivors = stats.survivors,
            threshold = self.heap.threshold(),
            "collected heap"
        );
        stats
    }
}
