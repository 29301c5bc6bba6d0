//! Stored-program assembly.
//!
//! `ProgramBuilder` appends instructions top to bottom. Forward jumps are
//! written against [`ProgramBuilder::count`], the address the next
//! instruction will occupy, so every target is known when the jump is
//! emitted. [`ProgramBuilder::finish`] checks all targets and freezes the
//! result into a [`Program`] ready for upload.

use crate::tmcl::types::{AxisParam, CalcOp, Condition, GlobalVar, Instruction, Operand};
use std::fmt;
use thiserror::Error;

/// Error types for program assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// No instructions were emitted
    #[error("Program is empty")]
    Empty,

    /// A jump points past the end of the program
    #[error("Jump at {at} targets {target}, program has {len} instructions")]
    JumpOutOfRange {
        /// Address of the jump
        at: usize,
        /// Requested target
        target: usize,
        /// Program length
        len: usize,
    },
}

/// An assembled, immutable stored program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
}

impl Program {
    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Instruction at `address`.
    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.instructions.get(address)
    }

    /// All instructions in address order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
}

impl fmt::Display for Program {
    /// Mnemonic listing, one `address: instruction` line per instruction.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (address, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{address:4}: {instruction}")?;
        }
        Ok(())
    }
}

/// Builder for a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Address the next emitted instruction will occupy.
    pub fn count(&self) -> usize {
        self.instructions.len()
    }

    /// Target for a jump emitted next that skips the `n` instructions
    /// following it.
    pub fn skip(&self, n: usize) -> usize {
        self.count() + 1 + n
    }

    /// Append an instruction and return the new program length.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len()
    }

    /// WAIT TICKS
    pub fn wait(&mut self, ticks: u32) -> usize {
        self.push(Instruction::Wait { ticks })
    }

    /// STOP (end of program)
    pub fn stop(&mut self) -> usize {
        self.push(Instruction::Stop)
    }

    /// GAP: load an axis parameter into the accumulator.
    pub fn get_param(&mut self, param: AxisParam) -> usize {
        self.push(Instruction::GetParam(param))
    }

    /// SAP / AAP
    pub fn set_param(&mut self, param: AxisParam, value: Operand) -> usize {
        self.push(Instruction::SetParam(param, value))
    }

    /// GGP: load a global into the accumulator.
    pub fn get_global(&mut self, var: GlobalVar) -> usize {
        self.push(Instruction::GetGlobal(var))
    }

    /// SGP / AGP
    pub fn set_global(&mut self, var: GlobalVar, value: Operand) -> usize {
        self.push(Instruction::SetGlobal(var, value))
    }

    /// CALC: accumulator op immediate
    pub fn calc(&mut self, op: CalcOp, value: i32) -> usize {
        self.push(Instruction::Calc(op, value))
    }

    /// CALCX: accumulator op X
    pub fn calcx(&mut self, op: CalcOp) -> usize {
        self.push(Instruction::CalcX(op))
    }

    /// COMP: compare the accumulator against `value`
    pub fn comp(&mut self, value: i32) -> usize {
        self.push(Instruction::Comp(value))
    }

    /// JC: jump to `target` if `condition` holds for the last comparison
    pub fn jump_if(&mut self, condition: Condition, target: usize) -> usize {
        self.push(Instruction::JumpIf(condition, target))
    }

    /// JA: jump to `target`
    pub fn jump(&mut self, target: usize) -> usize {
        self.push(Instruction::JumpAlways(target))
    }

    /// Validate jump targets and freeze the program.
    ///
    /// # Errors
    /// Returns `ProgramError::Empty` for an empty program and
    /// `ProgramError::JumpOutOfRange` for the first jump whose target is not
    /// an instruction address.
    pub fn finish(self) -> Result<Program, ProgramError> {
        let len = self.instructions.len();
        if len == 0 {
            return Err(ProgramError::Empty);
        }
        for (at, instruction) in self.instructions.iter().enumerate() {
            if let Some(target) = instruction.jump_target() {
                if target >= len {
                    return Err(ProgramError::JumpOutOfRange { at, target, len });
                }
            }
        }
        Ok(Program {
            instructions: self.instructions,
        })
    }
}
