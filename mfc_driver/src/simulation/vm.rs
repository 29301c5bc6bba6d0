//! Stored-program interpreter.
//!
//! Executes [`Program`]s the way a TMCM-class module does: one accumulator,
//! one X register and the result of the last comparison. The interpreter
//! runs until the program yields so that the caller can interleave motor
//! updates:
//! - `WAIT` suspends for the given number of ticks
//! - a backward jump ends the current pass
//! - `STOP` or a fault ends the program

use mfc_common::tmcl::program::Program;
use mfc_common::tmcl::types::{AxisParam, CalcOp, GlobalVar, Instruction, Operand};
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{trace, warn};

/// Instructions executed per tick before the interpreter yields on its own.
pub const INSTRUCTION_BUDGET: usize = 1024;

/// Register access used by the interpreter.
pub trait RegisterFile {
    /// Read an axis parameter.
    fn get_param(&mut self, param: AxisParam) -> i32;
    /// Write an axis parameter.
    fn set_param(&mut self, param: AxisParam, value: i32);
    /// Read a global parameter.
    fn get_global(&mut self, var: GlobalVar) -> i32;
    /// Write a global parameter.
    fn set_global(&mut self, var: GlobalVar, value: i32);
}

/// Conditions that abort a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VmFault {
    /// Division or remainder by zero
    #[error("division by zero at {at}")]
    DivisionByZero {
        /// Faulting address
        at: usize,
    },
    /// Instruction not valid in this form
    #[error("invalid instruction at {at}")]
    InvalidInstruction {
        /// Faulting address
        at: usize,
    },
    /// Program counter left program memory
    #[error("address {at} outside program")]
    AddressOutOfRange {
        /// Faulting address
        at: usize,
    },
}

/// Why the interpreter returned control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Yield {
    /// Program suspended in `WAIT`
    Waiting,
    /// Program jumped backward; one pass complete
    Looped,
    /// Instruction budget used up
    Budget,
    /// Program executed `STOP`
    Halted,
    /// Program aborted
    Faulted(VmFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Waiting { remaining: u32 },
}

/// Interpreter state of one module.
#[derive(Debug, Clone)]
pub struct ProgramVm {
    pc: usize,
    accumulator: i32,
    x: i32,
    comparison: Ordering,
    state: RunState,
}

impl Default for ProgramVm {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramVm {
    /// Create an idle interpreter.
    pub fn new() -> Self {
        Self {
            pc: 0,
            accumulator: 0,
            x: 0,
            comparison: Ordering::Equal,
            state: RunState::Idle,
        }
    }

    /// Reset registers and start at address 0.
    pub fn start(&mut self) {
        *self = Self::new();
        self.state = RunState::Running;
    }

    /// Stop execution.
    pub fn halt(&mut self) {
        self.state = RunState::Idle;
    }

    /// Returns true while a program is running or waiting.
    pub fn is_running(&self) -> bool {
        self.state != RunState::Idle
    }

    /// Address of the next instruction.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Accumulator contents.
    pub fn accumulator(&self) -> i32 {
        self.accumulator
    }

    /// X register contents.
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Advance one timer tick: count down a pending wait, then run.
    ///
    /// Returns `None` if no program is running.
    pub fn tick(&mut self, program: &Program, regs: &mut dyn RegisterFile) -> Option<Yield> {
        match self.state {
            RunState::Idle => None,
            RunState::Waiting { remaining } if remaining > 1 => {
                self.state = RunState::Waiting {
                    remaining: remaining - 1,
                };
                Some(Yield::Waiting)
            }
            RunState::Waiting { .. } | RunState::Running => {
                self.state = RunState::Running;
                Some(self.run(program, regs))
            }
        }
    }

    /// Execute instructions until the program yields.
    pub fn run(&mut self, program: &Program, regs: &mut dyn RegisterFile) -> Yield {
        if self.state != RunState::Running {
            return Yield::Halted;
        }
        for _ in 0..INSTRUCTION_BUDGET {
            let at = self.pc;
            let Some(instruction) = program.get(at).copied() else {
                return self.fault(VmFault::AddressOutOfRange { at });
            };
            self.pc += 1;
            trace!("vm {at:4}: {instruction}  A={} X={}", self.accumulator, self.x);

            match instruction {
                Instruction::Wait { ticks: 0 } => {}
                Instruction::Wait { ticks } => {
                    self.state = RunState::Waiting { remaining: ticks };
                    return Yield::Waiting;
                }
                Instruction::Stop => {
                    self.state = RunState::Idle;
                    return Yield::Halted;
                }
                Instruction::GetParam(param) => self.accumulator = regs.get_param(param),
                Instruction::SetParam(param, operand) => {
                    regs.set_param(param, self.operand(operand))
                }
                Instruction::GetGlobal(var) => self.accumulator = regs.get_global(var),
                Instruction::SetGlobal(var, operand) => {
                    regs.set_global(var, self.operand(operand))
                }
                Instruction::Calc(CalcOp::Load, value) => self.accumulator = value,
                Instruction::Calc(CalcOp::Swap, _) => {
                    return self.fault(VmFault::InvalidInstruction { at });
                }
                Instruction::Calc(op, value) => match arithmetic(op, self.accumulator, value) {
                    Some(result) => self.accumulator = result,
                    None => return self.fault(VmFault::DivisionByZero { at }),
                },
                Instruction::CalcX(CalcOp::Load) => self.x = self.accumulator,
                Instruction::CalcX(CalcOp::Swap) => {
                    std::mem::swap(&mut self.accumulator, &mut self.x)
                }
                Instruction::CalcX(op) => match arithmetic(op, self.accumulator, self.x) {
                    Some(result) => self.accumulator = result,
                    None => return self.fault(VmFault::DivisionByZero { at }),
                },
                Instruction::Comp(value) => self.comparison = self.accumulator.cmp(&value),
                Instruction::JumpIf(condition, target) => {
                    if condition.holds(self.comparison) && self.jump(at, target) {
                        return Yield::Looped;
                    }
                }
                Instruction::JumpAlways(target) => {
                    if self.jump(at, target) {
                        return Yield::Looped;
                    }
                }
            }
        }
        Yield::Budget
    }

    /// Set the program counter. Returns true for a backward jump.
    fn jump(&mut self, at: usize, target: usize) -> bool {
        self.pc = target;
        target <= at
    }

    fn operand(&self, operand: Operand) -> i32 {
        match operand {
            Operand::Value(value) => value,
            Operand::Accumulator => self.accumulator,
        }
    }

    fn fault(&mut self, fault: VmFault) -> Yield {
        warn!("Stored program aborted: {}", fault);
        self.state = RunState::Idle;
        Yield::Faulted(fault)
    }
}

/// `a op b` with wrapping overflow. `None` on division by zero.
fn arithmetic(op: CalcOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        CalcOp::Add => a.wrapping_add(b),
        CalcOp::Sub => a.wrapping_sub(b),
        CalcOp::Mul => a.wrapping_mul(b),
        CalcOp::Div | CalcOp::Mod if b == 0 => return None,
        CalcOp::Div => a.wrapping_div(b),
        CalcOp::Mod => a.wrapping_rem(b),
        CalcOp::And => a & b,
        CalcOp::Or => a | b,
        CalcOp::Xor => a ^ b,
        CalcOp::Not => !a,
        CalcOp::Load => b,
        CalcOp::Swap => a,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfc_common::tmcl::program::ProgramBuilder;
    use mfc_common::tmcl::types::Condition;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Registers {
        params: HashMap<AxisParam, i32>,
        globals: HashMap<GlobalVar, i32>,
    }

    impl RegisterFile for Registers {
        fn get_param(&mut self, param: AxisParam) -> i32 {
            self.params.get(&param).copied().unwrap_or(0)
        }
        fn set_param(&mut self, param: AxisParam, value: i32) {
            self.params.insert(param, value);
        }
        fn get_global(&mut self, var: GlobalVar) -> i32 {
            self.globals.get(&var).copied().unwrap_or(0)
        }
        fn set_global(&mut self, var: GlobalVar, value: i32) {
            self.globals.insert(var, value);
        }
    }

    fn started(p: ProgramBuilder) -> (Program, ProgramVm) {
        let mut vm = ProgramVm::new();
        vm.start();
        (p.finish().unwrap(), vm)
    }

    #[test]
    fn test_arithmetic_truncates_toward_zero() {
        assert_eq!(arithmetic(CalcOp::Div, -7, 3), Some(-2));
        assert_eq!(arithmetic(CalcOp::Div, 7, -3), Some(-2));
        assert_eq!(arithmetic(CalcOp::Mod, -7, 3), Some(-1));
        assert_eq!(arithmetic(CalcOp::Div, 1, 0), None);
        assert_eq!(arithmetic(CalcOp::Div, i32::MIN, -1), Some(i32::MIN));
        assert_eq!(arithmetic(CalcOp::Mul, i32::MAX, 2), Some(-2));
    }

    #[test]
    fn test_calcx_load_swap_sub() {
        let mut p = ProgramBuilder::new();
        p.calc(CalcOp::Load, 10);
        p.calcx(CalcOp::Load); // X = 10
        p.calc(CalcOp::Load, 25);
        p.calcx(CalcOp::Sub); // A = 15
        p.calcx(CalcOp::Swap); // A = 10, X = 15
        p.set_global(GlobalVar::User(3), Operand::Accumulator);
        p.stop();
        let (program, mut vm) = started(p);
        let mut regs = Registers::default();

        assert_eq!(vm.run(&program, &mut regs), Yield::Halted);
        assert_eq!(regs.globals[&GlobalVar::User(3)], 10);
        assert_eq!(vm.x(), 15);
        assert!(!vm.is_running());
    }

    #[test]
    fn test_wait_resumes_after_ticks() {
        let mut p = ProgramBuilder::new();
        p.wait(2);
        p.set_param(AxisParam::TargetSpeed, Operand::Value(5));
        p.stop();
        let (program, mut vm) = started(p);
        let mut regs = Registers::default();

        assert_eq!(vm.run(&program, &mut regs), Yield::Waiting);
        assert_eq!(vm.tick(&program, &mut regs), Some(Yield::Waiting));
        assert!(regs.params.is_empty());
        assert_eq!(vm.tick(&program, &mut regs), Some(Yield::Halted));
        assert_eq!(regs.params[&AxisParam::TargetSpeed], 5);
        assert_eq!(vm.tick(&program, &mut regs), None);
    }

    #[test]
    fn test_backward_jump_ends_pass() {
        let mut p = ProgramBuilder::new();
        p.get_global(GlobalVar::User(0));
        p.calc(CalcOp::Add, 1);
        p.set_global(GlobalVar::User(0), Operand::Accumulator);
        p.jump(0);
        let (program, mut vm) = started(p);
        let mut regs = Registers::default();

        for expected in 1..=3 {
            assert_eq!(vm.tick(&program, &mut regs), Some(Yield::Looped));
            assert_eq!(regs.globals[&GlobalVar::User(0)], expected);
        }
        assert!(vm.is_running());
    }

    #[test]
    fn test_conditional_jump_uses_last_comparison() {
        let mut p = ProgramBuilder::new();
        p.calc(CalcOp::Load, -4);
        p.comp(0);
        p.calc(CalcOp::Load, 99); // comparison flag survives
        p.jump_if(Condition::Lt, p.skip(1));
        p.calc(CalcOp::Load, 0);
        p.set_global(GlobalVar::User(1), Operand::Accumulator);
        p.stop();
        let (program, mut vm) = started(p);
        let mut regs = Registers::default();

        vm.run(&program, &mut regs);
        assert_eq!(regs.globals[&GlobalVar::User(1)], 99);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let mut p = ProgramBuilder::new();
        p.calc(CalcOp::Load, 3);
        p.calc(CalcOp::Div, 0);
        p.stop();
        let (program, mut vm) = started(p);

        let result = vm.run(&program, &mut Registers::default());
        assert_eq!(result, Yield::Faulted(VmFault::DivisionByZero { at: 1 }));
        assert!(!vm.is_running());
    }

    #[test]
    fn test_calc_swap_is_invalid() {
        let mut p = ProgramBuilder::new();
        p.calc(CalcOp::Swap, 0);
        let (program, mut vm) = started(p);
        assert_eq!(
            vm.run(&program, &mut Registers::default()),
            Yield::Faulted(VmFault::InvalidInstruction { at: 0 })
        );
    }

    #[test]
    fn test_running_off_the_end_faults() {
        let mut p = ProgramBuilder::new();
        p.comp(0);
        let (program, mut vm) = started(p);
        assert_eq!(
            vm.run(&program, &mut Registers::default()),
            Yield::Faulted(VmFault::AddressOutOfRange { at: 1 })
        );
    }

    #[test]
    fn test_self_jump_yields_every_pass() {
        let mut p = ProgramBuilder::new();
        p.comp(0);
        p.jump_if(Condition::Eq, 1);
        let (program, mut vm) = started(p);
        assert_eq!(vm.run(&program, &mut Registers::default()), Yield::Looped);
        assert_eq!(vm.run(&program, &mut Registers::default()), Yield::Looped);
        assert_eq!(vm.pc(), 1);
    }

    #[test]
    fn test_long_straight_line_hits_budget() {
        let mut p = ProgramBuilder::new();
        for _ in 0..INSTRUCTION_BUDGET + 10 {
            p.calc(CalcOp::Add, 1);
        }
        p.stop();
        let (program, mut vm) = started(p);
        let mut regs = Registers::default();

        assert_eq!(vm.run(&program, &mut regs), Yield::Budget);
        assert_eq!(vm.accumulator(), INSTRUCTION_BUDGET as i32);
        assert_eq!(vm.run(&program, &mut regs), Yield::Halted);
        assert_eq!(vm.accumulator(), INSTRUCTION_BUDGET as i32 + 10);
    }
}
