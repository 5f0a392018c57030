//! In-memory module construction.
//!
//! The text assembler lives outside this workspace; `ModuleBuilder` is how
//! tests, the CLI and embedders produce modules without it.

use crate::error::ModuleError;
use crate::instruction::Instruction;
use crate::module::{FunctionDescriptor, Module, Priority};
use crate::opcode::Opcode;
use crate::operand::Operand;

/// Incrementally assembles a [`Module`].
///
/// ```
/// use ember_common::{ModuleBuilder, Opcode, Operand};
///
/// let mut b = ModuleBuilder::new();
/// let main = b.function("_Main", 0, 0);
/// b.emit(Opcode::Push, vec![Operand::Int(14)]);
/// b.emit(Opcode::Pop, vec![Operand::ret()]);
/// b.op(Opcode::Ret);
/// b.set_main(main);
/// let module = b.build().unwrap();
/// assert_eq!(module.instructions.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    stack_size: u32,
    global_size: u32,
    main: Option<u32>,
    priority: Priority,
    instructions: Vec<Instruction>,
    functions: Vec<FunctionDescriptor>,
    host_calls: Vec<String>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requested stack size in cells (0 = runtime default).
    pub fn stack_size(&mut self, cells: u32) -> &mut Self {
        self.stack_size = cells;
        self
    }

    /// Number of global cells at the stack base.
    pub fn globals(&mut self, cells: u32) -> &mut Self {
        self.global_size = cells;
        self
    }

    pub fn priority(&mut self, priority: Priority) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Declare a function whose body starts at the next emitted instruction.
    pub fn function(&mut self, name: &str, params: u8, locals: u32) -> u32 {
        let index = self.declare_function(name, params, locals);
        self.place_function(index);
        index
    }

    /// Declare a function before its body is emitted, for forward calls.
    /// Its entry is fixed later with [`ModuleBuilder::place_function`].
    pub fn declare_function(&mut self, name: &str, params: u8, locals: u32) -> u32 {
        self.functions.push(FunctionDescriptor {
            name: name.to_owned(),
            entry: 0,
            param_count: params,
            local_count: locals,
        });
        (self.functions.len() - 1) as u32
    }

    /// Point a declared function's entry at the next emitted instruction.
    pub fn place_function(&mut self, index: u32) {
        let here = self.here();
        if let Some(f) = self.functions.get_mut(index as usize) {
            f.entry = here;
        }
    }

    /// Index of a host function name, added to the table on first use.
    pub fn host_call(&mut self, name: &str) -> u32 {
        let index = match self.host_calls.iter().position(|h| h == name) {
            Some(i) => i,
            None => {
                self.host_calls.push(name.to_owned());
                self.host_calls.len() - 1
            }
        };
        index as u32
    }

    pub fn set_main(&mut self, function: u32) -> &mut Self {
        self.main = Some(function);
        self
    }

    /// Index the next emitted instruction will get.
    pub fn here(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Append an instruction and return its index.
    pub fn emit(&mut self, opcode: Opcode, operands: Vec<Operand>) -> u32 {
        let at = self.here();
        self.instructions.push(Instruction::new(opcode, operands));
        at
    }

    /// Append an instruction without operands.
    pub fn op(&mut self, opcode: Opcode) -> u32 {
        self.emit(opcode, Vec::new())
    }

    /// Emit a branch whose target is not known yet; fix it with
    /// [`ModuleBuilder::patch_target`].
    pub fn emit_forward(&mut self, opcode: Opcode) -> u32 {
        self.emit(opcode, vec![Operand::InstrTarget(0)])
    }

    /// Rewrite the jump target of the branch at `at`.
    pub fn patch_target(&mut self, at: u32, target: u32) {
        if let Some(op) = self
            .instructions
            .get_mut(at as usize)
            .and_then(|i| i.operands.first_mut())
        {
            *op = Operand::InstrTarget(target);
        }
    }

    /// Finish and validate the module.
    pub fn build(&self) -> Result<Module, ModuleError> {
        let module = Module {
            stack_size: self.stack_size,
            global_size: self.global_size,
            main: self.main,
            priority: self.priority,
            instructions: self.instructions.clone(),
            functions: self.functions.clone(),
            host_calls: self.host_calls.clone(),
        };
        module.validate()?;
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_declared_function() {
        let mut b = ModuleBuilder::new();
        let main = b.function("_Main", 0, 0);
        let helper = b.declare_function("Helper", 1, 2);
        b.emit(Opcode::Push, vec![Operand::Int(1)]);
        b.emit(Opcode::Call, vec![Operand::FuncTarget(helper)]);
        b.op(Opcode::Ret);
        b.place_function(helper);
        b.op(Opcode::Ret);
        b.set_main(main);

        let module = b.build().unwrap();
        assert_eq!(module.functions[helper as usize].entry, 3);
        assert_eq!(module.main, Some(main));
    }

    #[test]
    fn patched_branch() {
        let mut b = ModuleBuilder::new();
        b.function("_Main", 0, 0);
        let jump = b.emit_forward(Opcode::Jmp);
        b.op(Opcode::Nop);
        let target = b.op(Opcode::Ret);
        b.patch_target(jump, target);
        let module = b.build().unwrap();
        assert_eq!(
            module.instructions[0].operands,
            vec![Operand::InstrTarget(2)]
        );
    }

    #[test]
    fn host_calls_are_interned() {
        let mut b = ModuleBuilder::new();
        assert_eq!(b.host_call("Print"), 0);
        assert_eq!(b.host_call("Explode"), 1);
        assert_eq!(b.host_call("Print"), 0);
    }

    #[test]
    fn build_validates() {
        let mut b = ModuleBuilder::new();
        b.emit(Opcode::Jmp, vec![Operand::InstrTarget(9)]);
        assert_eq!(
            b.build(),
            Err(ModuleError::InstrTargetOutOfRange { target: 9, len: 1 })
        );
    }
}
