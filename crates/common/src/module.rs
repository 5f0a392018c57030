//! Loaded module representation and the binary module format.
//!
//! A module file is a header, the instruction stream, then three tables
//! (strings, functions, host-call names). String operands are materialized
//! from the string table at decode time, so a decoded [`Module`] carries no
//! string table of its own; [`Module::encode`] rebuilds one.

use crate::codec::{Reader, Writer};
use crate::error::ModuleError;
use crate::instruction::Instruction;
use crate::opcode::Opcode;
use crate::operand::{tag, Operand, RETURN_REGISTER};

/// File magic.
pub const MAGIC: [u8; 4] = *b"EMB0";

/// Supported format version (major, minor).
pub const VERSION: (u8, u8) = (1, 0);

/// Scheduling priority tier requested by a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Explicit timeslice in milliseconds.
    User(u32),
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    fn tier(self) -> u8 {
        match self {
            Priority::User(_) => 0,
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
        }
    }

    fn from_tier(tier: u8, user_ms: u32) -> Result<Self, ModuleError> {
        match tier {
            0 => Ok(Priority::User(user_ms)),
            1 => Ok(Priority::Low),
            2 => Ok(Priority::Medium),
            3 => Ok(Priority::High),
            other => Err(ModuleError::UnknownPriority(other)),
        }
    }
}

/// Entry in the function table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor {
    pub name: String,
    /// Index of the first instruction.
    pub entry: u32,
    pub param_count: u8,
    pub local_count: u32,
}

impl FunctionDescriptor {
    /// Stack cells an active call occupies: parameters, the return-address
    /// cell, locals and the marker cell.
    pub fn frame_size(&self) -> usize {
        self.param_count as usize + self.local_count as usize + 2
    }
}

/// A decoded, validated program.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Requested stack size in cells; 0 selects the runtime default.
    pub stack_size: u32,
    /// Cells reserved at the stack base for globals.
    pub global_size: u32,
    /// Function-table index of the entry function.
    pub main: Option<u32>,
    pub priority: Priority,
    pub instructions: Vec<Instruction>,
    pub functions: Vec<FunctionDescriptor>,
    /// Host function names, referenced by `HostCallTarget` operands.
    pub host_calls: Vec<String>,
}

/// A string operand waiting for the string table: (instruction, operand, string index).
type StringFixup = (usize, usize, u32);

impl Module {
    /// Decode and validate a module file.
    pub fn decode(bytes: &[u8]) -> Result<Self, ModuleError> {
        let mut r = Reader::new(bytes);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(r.take(4, "magic")?);
        if magic != MAGIC {
            return Err(ModuleError::BadMagic { found: magic });
        }
        let major = r.u8("major version")?;
        let minor = r.u8("minor version")?;
        if (major, minor) != VERSION {
            return Err(ModuleError::UnsupportedVersion { major, minor });
        }

        let stack_size = r.u32("stack size")?;
        let global_size = r.u32("global size")?;
        let main_present = r.u8("main flag")?;
        let main_index = r.u32("main index")?;
        let tier = r.u8("priority tier")?;
        let user_ms = r.u32("user timeslice")?;
        let priority = Priority::from_tier(tier, user_ms)?;

        let (mut instructions, fixups) = decode_instructions(&mut r)?;

        let string_count = r.u32("string count")? as usize;
        let mut strings = Vec::with_capacity(string_count.min(r.remaining() / 4));
        for _ in 0..string_count {
            let len = r.u32("string length")? as usize;
            strings.push(r.string(len, "string table")?);
        }
        for (at, index, sidx) in fixups {
            let s = strings
                .get(sidx as usize)
                .ok_or(ModuleError::StringIndexOutOfRange {
                    at,
                    index: sidx,
                    len: strings.len(),
                })?;
            instructions[at].operands[index] = Operand::Str(s.clone());
        }

        let function_count = r.u32("function count")? as usize;
        let mut functions = Vec::with_capacity(function_count.min(r.remaining() / 10));
        for _ in 0..function_count {
            let entry = r.u32("function entry")?;
            let param_count = r.u8("parameter count")?;
            let local_count = r.u32("local count")?;
            let name_len = r.u8("function name length")? as usize;
            let name = r.string(name_len, "function name")?;
            functions.push(FunctionDescriptor {
                name,
                entry,
                param_count,
                local_count,
            });
        }

        let host_count = r.u32("host-call count")? as usize;
        let mut host_calls = Vec::with_capacity(host_count.min(r.remaining()));
        for _ in 0..host_count {
            let len = r.u8("host-call name length")? as usize;
            host_calls.push(r.string(len, "host-call name")?);
        }

        if r.remaining() > 0 {
            return Err(ModuleError::TrailingBytes {
                count: r.remaining(),
            });
        }

        let module = Module {
            stack_size,
            global_size,
            main: (main_present != 0).then_some(main_index),
            priority,
            instructions,
            functions,
            host_calls,
        };
        module.validate()?;
        Ok(module)
    }

    /// Encode to the binary module format.
    ///
    /// String literals are interned in first-use order. Fails if a value
    /// does not fit its on-disk field (an `Int` outside `i32`, a name longer
    /// than 255 bytes).
    pub fn encode(&self) -> Result<Vec<u8>, ModuleError> {
        let mut w = Writer::default();
        w.bytes(&MAGIC);
        w.u8(VERSION.0);
        w.u8(VERSION.1);
        w.u32(self.stack_size);
        w.u32(self.global_size);
        w.u8(u8::from(self.main.is_some()));
        w.u32(self.main.unwrap_or(0));
        w.u8(self.priority.tier());
        w.u32(match self.priority {
            Priority::User(ms) => ms,
            _ => 0,
        });

        let mut strings: Vec<&str> = Vec::new();
        w.len32(self.instructions.len(), "instruction count")?;
        for instr in &self.instructions {
            w.u16(instr.opcode as u16);
            let count = u8::try_from(instr.operands.len()).map_err(|_| {
                ModuleError::FieldOverflow {
                    what: "operand count",
                }
            })?;
            w.u8(count);
            for op in &instr.operands {
                encode_operand(&mut w, op, &mut strings)?;
            }
        }

        w.len32(strings.len(), "string count")?;
        for s in &strings {
            w.len32(s.len(), "string length")?;
            w.bytes(s.as_bytes());
        }

        w.len32(self.functions.len(), "function count")?;
        for f in &self.functions {
            w.u32(f.entry);
            w.u8(f.param_count);
            w.u32(f.local_count);
            w.short_name(&f.name)?;
        }

        w.len32(self.host_calls.len(), "host-call count")?;
        for name in &self.host_calls {
            w.short_name(name)?;
        }
        Ok(w.finish())
    }

    /// Check every cross-reference in the module.
    ///
    /// [`Module::decode`] calls this; modules assembled in memory should be
    /// validated before they are executed.
    pub fn validate(&self) -> Result<(), ModuleError> {
        let len = self.instructions.len();
        let in_stream = |target: u32| {
            if (target as usize) < len {
                Ok(())
            } else {
                Err(ModuleError::InstrTargetOutOfRange { target, len })
            }
        };

        for (at, instr) in self.instructions.iter().enumerate() {
            let expected = instr.opcode.operand_count();
            if instr.operands.len() != expected {
                return Err(ModuleError::OperandCount {
                    at,
                    opcode: instr.opcode,
                    expected,
                    found: instr.operands.len(),
                });
            }
            for (index, op) in instr.operands.iter().enumerate() {
                if !operand_fits(instr.opcode, index, op) {
                    return Err(ModuleError::BadOperand {
                        at,
                        opcode: instr.opcode,
                        index,
                    });
                }
                match *op {
                    Operand::InstrTarget(t) => in_stream(t)?,
                    Operand::FuncTarget(f) => self.check_function(f)?,
                    Operand::HostCallTarget(h) if h as usize >= self.host_calls.len() => {
                        return Err(ModuleError::HostCallIndexOutOfRange {
                            at,
                            index: h,
                            len: self.host_calls.len(),
                        });
                    }
                    Operand::Register(id) if id != RETURN_REGISTER => {
                        return Err(ModuleError::UnknownRegister { at, id });
                    }
                    _ => {}
                }
            }
        }

        for f in &self.functions {
            in_stream(f.entry)?;
        }
        if let Some(main) = self.main {
            self.check_function(main)?;
        }
        Ok(())
    }

    fn check_function(&self, index: u32) -> Result<(), ModuleError> {
        if (index as usize) < self.functions.len() {
            Ok(())
        } else {
            Err(ModuleError::FunctionIndexOutOfRange {
                index,
                len: self.functions.len(),
            })
        }
    }

    /// Function-table index for `name`, compared ASCII case-insensitively.
    pub fn find_function(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .map(|i| i as u32)
    }

    pub fn function(&self, index: u32) -> Option<&FunctionDescriptor> {
        self.functions.get(index as usize)
    }
}

fn decode_instructions(
    r: &mut Reader<'_>,
) -> Result<(Vec<Instruction>, Vec<StringFixup>), ModuleError> {
    let count = r.u32("instruction count")? as usize;
    // Every instruction takes at least three bytes; never trust the count
    // for the allocation size.
    let mut instructions = Vec::with_capacity(count.min(r.remaining() / 3));
    let mut fixups = Vec::new();

    for at in 0..count {
        let opcode = Opcode::try_from(r.u16("opcode")?)?;
        let found = r.u8("operand count")? as usize;
        let expected = opcode.operand_count();
        if found != expected {
            return Err(ModuleError::OperandCount {
                at,
                opcode,
                expected,
                found,
            });
        }

        let mut operands = Vec::with_capacity(found);
        for index in 0..found {
            let op = match r.u8("operand tag")? {
                tag::INT => Operand::Int(i64::from(r.i32("int operand")?)),
                tag::FLOAT => Operand::Float(f64::from(r.f32("float operand")?)),
                tag::STRING => {
                    fixups.push((at, index, r.u32("string operand")?));
                    Operand::Str(String::new())
                }
                tag::ABSOLUTE_SLOT => Operand::AbsoluteSlot(r.i32("stack index")?),
                tag::RELATIVE_SLOT => Operand::RelativeSlot {
                    base: r.i32("stack index")?,
                    index_slot: r.i32("index slot")?,
                },
                tag::INSTR_TARGET => Operand::InstrTarget(r.u32("jump target")?),
                tag::FUNC_TARGET => Operand::FuncTarget(r.u32("function index")?),
                tag::HOST_CALL_TARGET => Operand::HostCallTarget(r.u32("host-call index")?),
                tag::REGISTER => Operand::Register(r.u32("register id")?),
                other => return Err(ModuleError::UnknownOperandTag { at, tag: other }),
            };
            operands.push(op);
        }
        instructions.push(Instruction::new(opcode, operands));
    }
    Ok((instructions, fixups))
}

fn encode_operand<'m>(
    w: &mut Writer,
    op: &'m Operand,
    strings: &mut Vec<&'m str>,
) -> Result<(), ModuleError> {
    w.u8(op.tag());
    match op {
        Operand::Int(i) => {
            let v = i32::try_from(*i).map_err(|_| ModuleError::FieldOverflow {
                what: "int operand",
            })?;
            w.i32(v);
        }
        Operand::Float(x) => w.f32(*x as f32),
        Operand::Str(s) => {
            let index = match strings.iter().position(|t| *t == s.as_str()) {
                Some(i) => i,
                None => {
                    strings.push(s.as_str());
                    strings.len() - 1
                }
            };
            w.len32(index, "string index")?;
        }
        Operand::AbsoluteSlot(i) => w.i32(*i),
        Operand::RelativeSlot { base, index_slot } => {
            w.i32(*base);
            w.i32(*index_slot);
        }
        Operand::InstrTarget(t) | Operand::FuncTarget(t) | Operand::HostCallTarget(t) => w.u32(*t),
        Operand::Register(id) => w.u32(*id),
    }
    Ok(())
}

fn is_place(op: &Operand) -> bool {
    matches!(
        op,
        Operand::AbsoluteSlot(_) | Operand::RelativeSlot { .. } | Operand::Register(_)
    )
}

fn is_value(op: &Operand) -> bool {
    is_place(op) || op.literal().is_some()
}

/// Whether `op` is usable as operand `index` of `opcode`.
fn operand_fits(opcode: Opcode, index: usize, op: &Operand) -> bool {
    use Opcode::*;
    match (opcode, index) {
        (op_code, 0) if op_code.is_branch() => matches!(op, Operand::InstrTarget(_)),
        (Call, 0) => matches!(op, Operand::FuncTarget(_) | Operand::HostCallTarget(_)),
        (Mov | Pop | Concat | GetChar | SetChar | GetField, 0) => is_place(op),
        _ => is_value(op),
    }
}
