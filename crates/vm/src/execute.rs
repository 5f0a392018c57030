//! Interpreter loop and opcode dispatch.

use crate::call::{CallKind, Flow};
use crate::clock::Clock;
use crate::error::RuntimeError;
use crate::host::HostRegistry;
use crate::machine::{ExecutionState, Wake};
use crate::output::print_text;
use ember_common::{Instruction, ObjectRef, Opcode, Operand, RuntimeValue, ValueKind};
use std::cmp::Ordering;
use std::rc::Rc;

/// How long one call to [`ExecutionState::run`] may execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// Run until the instance stops, pauses or returns to the host.
    Unbounded,
    /// Wall-clock budget, checked between instructions.
    Millis(u64),
}

/// Why [`ExecutionState::run`] handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The budget ran out; the instance is still runnable.
    SliceExpired,
    /// The instance is paused (PAUSE, BREAK or the host).
    Paused,
    /// The instance is no longer running.
    Stopped,
    /// A call entered synchronously by the host returned.
    Returned,
}

impl ExecutionState {
    /// Execute instructions until the budget is spent or the instance
    /// pauses, stops or returns to the host.
    ///
    /// A fault stops the instance and is returned as the error.
    pub fn run(
        &mut self,
        budget: Budget,
        globals: &HostRegistry,
        clock: &dyn Clock,
    ) -> Result<RunOutcome, RuntimeError> {
        let module = Rc::clone(&self.module);
        let start = clock.now_ms();

        loop {
            if !self.running {
                return Ok(RunOutcome::Stopped);
            }
            match self.pause {
                None => {}
                Some(Wake::At(t)) if clock.now_ms() >= t => self.pause = None,
                Some(_) => return Ok(RunOutcome::Paused),
            }

            let Some(instr) = module.instructions.get(self.ip) else {
                // Ran off the end of the stream.
                self.running = false;
                return Ok(RunOutcome::Stopped);
            };

            match self.step(instr, globals, clock) {
                Ok(Flow::Continue) => {}
                Ok(Flow::HostReturn) => return Ok(RunOutcome::Returned),
                Ok(Flow::Finished) => return Ok(RunOutcome::Stopped),
                Err(e) => {
                    self.running = false;
                    return Err(e);
                }
            }

            if !self.running {
                return Ok(RunOutcome::Stopped);
            }
            if self.pause.is_some() {
                return Ok(RunOutcome::Paused);
            }
            if let Budget::Millis(ms) = budget {
                if clock.now_ms().saturating_sub(start) >= ms {
                    return Ok(RunOutcome::SliceExpired);
                }
            }
        }
    }

    /// Execute one instruction.
    fn step(
        &mut self,
        instr: &Instruction,
        globals: &HostRegistry,
        clock: &dyn Clock,
    ) -> Result<Flow, RuntimeError> {
        self.executing = self.ip;
        self.ip += 1;

        match instr.opcode {
            Opcode::Nop => {}

            Opcode::Mov => {
                let value = self.value(self.arg(instr, 1)?)?;
                self.store(self.arg(instr, 0)?, value)?;
            }

            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Exp
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr => self.exec_binary(instr.opcode)?,

            Opcode::Neg | Opcode::Inc | Opcode::Dec | Opcode::Not | Opcode::Sqrt => {
                self.exec_unary(instr.opcode)?
            }

            Opcode::Concat => self.exec_concat(instr)?,
            Opcode::GetChar => self.exec_getchar(instr)?,
            Opcode::SetChar => self.exec_setchar(instr)?,

            Opcode::Jmp => self.ip = self.target(instr)?,
            Opcode::Je | Opcode::Jne | Opcode::Jg | Opcode::Jl | Opcode::Jge | Opcode::Jle => {
                let target = self.target(instr)?;
                let right = self.pop()?;
                let left = self.pop()?;
                if compare(instr.opcode, &left, &right, self.executing)? {
                    self.ip = target;
                }
            }
            Opcode::BrTrue | Opcode::BrFalse => {
                let target = self.target(instr)?;
                let truthy = self.pop()?.is_truthy();
                if truthy == (instr.opcode == Opcode::BrTrue) {
                    self.ip = target;
                }
            }

            Opcode::Push => {
                let value = self.value(self.arg(instr, 0)?)?;
                self.push(value)?;
            }
            Opcode::Pop => {
                let value = self.pop()?;
                self.store(self.arg(instr, 0)?, value)?;
            }
            Opcode::Dup => {
                let value = self.peek_mut()?.clone();
                self.push(value)?;
            }
            Opcode::Remove => {
                self.pop()?;
            }
            Opcode::IConst0 => self.push(RuntimeValue::Int(0))?,
            Opcode::IConst1 => self.push(RuntimeValue::Int(1))?,
            Opcode::FConst0 => self.push(RuntimeValue::Float(0.0))?,
            Opcode::FConst1 => self.push(RuntimeValue::Float(1.0))?,

            Opcode::Call => match *self.arg(instr, 0)? {
                Operand::FuncTarget(f) => self.push_call(f, CallKind::Script, self.ip)?,
                Operand::HostCallTarget(h) => self.call_host(h, globals)?,
                _ => return Err(RuntimeError::BadOperand { at: self.executing }),
            },
            Opcode::Ret => return self.exec_ret(),

            Opcode::New => self.exec_new(instr)?,
            Opcode::GetField => {
                let object = self.object(self.arg(instr, 1)?)?;
                let index = self.value(self.arg(instr, 2)?)?.coerce_int();
                let value = self.field(object, index)?.clone();
                self.store(self.arg(instr, 0)?, value)?;
            }
            Opcode::SetField => {
                let object = self.object(self.arg(instr, 0)?)?;
                let index = self.value(self.arg(instr, 1)?)?.coerce_int();
                let value = self.value(self.arg(instr, 2)?)?;
                *self.field(object, index)? = value;
            }

            Opcode::Pause => {
                let ms = self.value(self.arg(instr, 0)?)?.coerce_int().max(0) as u64;
                self.pause = Some(Wake::At(clock.now_ms().saturating_add(ms)));
            }
            Opcode::Break => self.pause = Some(Wake::OnResume),
            Opcode::Halt => self.running = false,
            Opcode::Trap => self.exec_trap(instr)?,
        }

        Ok(Flow::Continue)
    }

    fn arg<'i>(&self, instr: &'i Instruction, i: usize) -> Result<&'i Operand, RuntimeError> {
        instr
            .operand(i)
            .ok_or(RuntimeError::BadOperand { at: self.executing })
    }

    fn target(&self, instr: &Instruction) -> Result<usize, RuntimeError> {
        match self.arg(instr, 0)? {
            Operand::InstrTarget(t) => Ok(*t as usize),
            _ => Err(RuntimeError::BadOperand { at: self.executing }),
        }
    }

    // ---- Arithmetic ----

    /// Pop right, pop left, push the result typed by the left operand.
    fn exec_binary(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let at = self.executing;
        let right = self.pop()?;
        let left = self.pop()?;

        let result = match left {
            RuntimeValue::Int(a) => RuntimeValue::Int(int_binary(opcode, a, right.coerce_int(), at)?),
            RuntimeValue::Float(a) => match float_binary(opcode, a, right.coerce_float()) {
                Some(x) => RuntimeValue::Float(x),
                None => {
                    return Err(RuntimeError::TypeMismatch {
                        at,
                        found: ValueKind::Float,
                    })
                }
            },
            other => {
                return Err(RuntimeError::TypeMismatch {
                    at,
                    found: other.kind(),
                })
            }
        };

        self.push(result)
    }

    /// Replace the top of stack with the result of a unary operation.
    fn exec_unary(&mut self, opcode: Opcode) -> Result<(), RuntimeError> {
        let at = self.executing;
        let top = self.peek_mut()?;

        let result = match (opcode, &*top) {
            (Opcode::Neg, RuntimeValue::Int(a)) => RuntimeValue::Int(a.wrapping_neg()),
            (Opcode::Neg, RuntimeValue::Float(x)) => RuntimeValue::Float(-x),
            (Opcode::Inc, RuntimeValue::Int(a)) => RuntimeValue::Int(a.wrapping_add(1)),
            (Opcode::Inc, RuntimeValue::Float(x)) => RuntimeValue::Float(x + 1.0),
            (Opcode::Dec, RuntimeValue::Int(a)) => RuntimeValue::Int(a.wrapping_sub(1)),
            (Opcode::Dec, RuntimeValue::Float(x)) => RuntimeValue::Float(x - 1.0),
            (Opcode::Not, RuntimeValue::Int(a)) => RuntimeValue::Int(!a),
            (Opcode::Sqrt, v @ (RuntimeValue::Int(_) | RuntimeValue::Float(_))) => {
                RuntimeValue::Float(v.coerce_float().sqrt())
            }
            (_, other) => {
                return Err(RuntimeError::TypeMismatch {
                    at,
                    found: other.kind(),
                })
            }
        };

        *top = result;
        Ok(())
    }

    // ---- Strings ----
    //
    // A destination that does not hold a string is left untouched.

    fn exec_concat(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let suffix = self.value(self.arg(instr, 1)?)?.coerce_string();
        let place = self.place(self.arg(instr, 0)?)?;
        if let (RuntimeValue::String(s), Some(suffix)) = (self.place_mut(place), suffix) {
            s.push_str(&suffix);
        }
        Ok(())
    }

    fn exec_getchar(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let Some(text) = self.value(self.arg(instr, 1)?)?.coerce_string() else {
            return Ok(());
        };
        let index = self.value(self.arg(instr, 2)?)?.coerce_int();
        let ch = usize::try_from(index)
            .ok()
            .and_then(|i| text.chars().nth(i))
            .ok_or(RuntimeError::StringIndexOutOfRange {
                at: self.executing,
                index,
                len: text.chars().count(),
            })?;
        self.store(self.arg(instr, 0)?, RuntimeValue::String(ch.to_string()))
    }

    fn exec_setchar(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let at = self.executing;
        let index = self.value(self.arg(instr, 1)?)?.coerce_int();
        let Some(ch) = self
            .value(self.arg(instr, 2)?)?
            .coerce_string()
            .and_then(|s| s.chars().next())
        else {
            return Ok(());
        };
        let place = self.place(self.arg(instr, 0)?)?;
        let RuntimeValue::String(s) = self.place_mut(place) else {
            return Ok(());
        };

        let len = s.chars().count();
        let (start, old) = usize::try_from(index)
            .ok()
            .and_then(|i| s.char_indices().nth(i))
            .ok_or(RuntimeError::StringIndexOutOfRange { at, index, len })?;
        let mut buf = [0u8; 4];
        s.replace_range(start..start + old.len_utf8(), ch.encode_utf8(&mut buf));
        Ok(())
    }

    // ---- Interrupts ----

    fn exec_trap(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let at = self.executing;
        let interrupt = self.value(self.arg(instr, 0)?)?.coerce_int();
        match interrupt {
            0 => {
                let value = self.pop()?;
                self.output
                    .write_line(&print_text(&value))
                    .map_err(|e| RuntimeError::Output {
                        at,
                        message: e.to_string(),
                    })
            }
            _ => Err(RuntimeError::UnknownInterrupt { at, interrupt }),
        }
    }

    // ---- Heap ----

    fn exec_new(&mut self, instr: &Instruction) -> Result<(), RuntimeError> {
        let at = self.executing;
        let count = self.value(self.arg(instr, 0)?)?.coerce_int();
        let fields = usize::try_from(count)
            .ok()
            .filter(|&n| n <= self.heap.max_fields())
            .ok_or(RuntimeError::BadFieldCount { at, count })?;
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        let object = self
            .heap
            .allocate(fields)
            .ok_or(RuntimeError::OutOfMemory { at, fields })?;
        self.push(RuntimeValue::Object(object))
    }

    fn object(&self, op: &Operand) -> Result<ObjectRef, RuntimeError> {
        let value = self.value(op)?;
        value.as_object().ok_or(RuntimeError::TypeMismatch {
            at: self.executing,
            found: value.kind(),
        })
    }

    fn field(&mut self, object: ObjectRef, index: i64) -> Result<&mut RuntimeValue, RuntimeError> {
        let at = self.executing;
        let fields = self
            .heap
            .fields_mut(object)
            .ok_or(RuntimeError::DanglingObject { at })?;
        let len = fields.len();
        let i = usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or(RuntimeError::FieldOutOfRange { at, index, len })?;
        Ok(&mut fields[i])
    }
}

fn int_binary(opcode: Opcode, a: i64, b: i64, at: usize) -> Result<i64, RuntimeError> {
    Ok(match opcode {
        Opcode::Add => a.wrapping_add(b),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::Div | Opcode::Mod if b == 0 => return Err(RuntimeError::DivisionByZero { at }),
        Opcode::Div => a.wrapping_div(b),
        Opcode::Mod => a.wrapping_rem(b),
        Opcode::Exp => int_pow(a, b),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        Opcode::Shl => shift_count(b).map_or(0, |n| a << n),
        // Counts past the width fill with the sign bit.
        Opcode::Shr => a >> shift_count(b).unwrap_or(63),
        _ => return Err(RuntimeError::BadOperand { at }),
    })
}

/// Shift counts outside `0..64` have no bit-level meaning.
fn shift_count(b: i64) -> Option<u32> {
    u32::try_from(b).ok().filter(|&n| n < 64)
}

/// Float result, or `None` for integer-only operations.
fn float_binary(opcode: Opcode, a: f64, b: f64) -> Option<f64> {
    match opcode {
        Opcode::Add => Some(a + b),
        Opcode::Sub => Some(a - b),
        Opcode::Mul => Some(a * b),
        Opcode::Div => Some(a / b),
        Opcode::Exp => Some(a.powf(b)),
        _ => None,
    }
}

fn int_pow(base: i64, exp: i64) -> i64 {
    if exp < 0 {
        return match base {
            1 => 1,
            -1 if exp % 2 == 0 => 1,
            -1 => -1,
            _ => 0,
        };
    }
    base.wrapping_pow(u32::try_from(exp).unwrap_or(u32::MAX))
}

/// Evaluate a conditional jump's condition, typed by the left operand.
fn compare(
    opcode: Opcode,
    left: &RuntimeValue,
    right: &RuntimeValue,
    at: usize,
) -> Result<bool, RuntimeError> {
    match opcode {
        Opcode::Je => return Ok(values_equal(left, right)),
        Opcode::Jne => return Ok(!values_equal(left, right)),
        _ => {}
    }

    let ordering = match left {
        RuntimeValue::Int(a) => Some(a.cmp(&right.coerce_int())),
        RuntimeValue::Float(x) => x.partial_cmp(&right.coerce_float()),
        other => {
            return Err(RuntimeError::TypeMismatch {
                at,
                found: other.kind(),
            })
        }
    };
    // Comparisons with NaN are false.
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match opcode {
        Opcode::Jg => ordering == Ordering::Greater,
        Opcode::Jl => ordering == Ordering::Less,
        Opcode::Jge => ordering != Ordering::Less,
        Opcode::Jle => ordering != Ordering::Greater,
        _ => false,
    })
}

fn values_equal(left: &RuntimeValue, right: &RuntimeValue) -> bool {
    match (left, right) {
        (RuntimeValue::Int(a), r) => *a == r.coerce_int(),
        (RuntimeValue::Float(x), r) => *x == r.coerce_float(),
        (RuntimeValue::String(a), RuntimeValue::String(b)) => a == b,
        (RuntimeValue::Null, RuntimeValue::Null) => true,
        (RuntimeValue::Object(a), RuntimeValue::Object(b)) => a == b,
        _ => false,
    }
}
