//! TMCL register identifiers and the stored-program instruction set.
//!
//! This module defines the data structures shared between the host driver
//! and any device backend:
//! - `AxisParam` - Indexed axis parameters (speeds, currents, encoder)
//! - `GlobalVar` - Global parameters (application status, user variables)
//! - `Instruction` - One stored-program instruction
//! - `CalcOp` / `Condition` / `Operand` - Instruction arguments

use crate::tmcl::consts::{APPLICATION_STATUS_NUMBER, MAX_USER_VARIABLE};
use std::fmt;
use std::ops::RangeInclusive;

/// Axis parameters of a single-axis TMCM-class module.
///
/// Discriminants are the TMCL parameter numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AxisParam {
    /// Target position of the internal ramp generator
    TargetPosition = 0,
    /// Actual position of the internal ramp generator
    ActualPosition = 1,
    /// Commanded velocity
    TargetSpeed = 2,
    /// Current velocity
    ActualSpeed = 3,
    /// Velocity limit for positioning
    MaximumSpeed = 4,
    /// Acceleration limit
    MaximumAcceleration = 5,
    /// Peak motor current
    MaximumCurrent = 6,
    /// Current used while the motor is at rest
    StandbyCurrent = 7,
    /// Microstep resolution as a power of two
    MicrostepResolution = 140,
    /// Ramp divisor
    RampDivisor = 153,
    /// Pulse divisor
    PulseDivisor = 154,
    /// Mixed decay threshold (-1 disables mixed decay)
    MixedDecayThreshold = 203,
    /// stallGuard threshold (0 disables stall detection)
    StallDetectionThreshold = 205,
    /// Quadrature encoder counter
    EncoderPosition = 209,
    /// Encoder prescaler
    EncoderPrescaler = 210,
    /// Velocity above which the driver switches to full steps
    FullstepThreshold = 211,
}

impl AxisParam {
    /// Every parameter known to this crate, in parameter-number order.
    pub const ALL: [AxisParam; 16] = [
        AxisParam::TargetPosition,
        AxisParam::ActualPosition,
        AxisParam::TargetSpeed,
        AxisParam::ActualSpeed,
        AxisParam::MaximumSpeed,
        AxisParam::MaximumAcceleration,
        AxisParam::MaximumCurrent,
        AxisParam::StandbyCurrent,
        AxisParam::MicrostepResolution,
        AxisParam::RampDivisor,
        AxisParam::PulseDivisor,
        AxisParam::MixedDecayThreshold,
        AxisParam::StallDetectionThreshold,
        AxisParam::EncoderPosition,
        AxisParam::EncoderPrescaler,
        AxisParam::FullstepThreshold,
    ];

    /// TMCL parameter number.
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Snake-case parameter name, as used in configuration files and logs.
    pub const fn name(self) -> &'static str {
        match self {
            AxisParam::TargetPosition => "target_position",
            AxisParam::ActualPosition => "actual_position",
            AxisParam::TargetSpeed => "target_speed",
            AxisParam::ActualSpeed => "actual_speed",
            AxisParam::MaximumSpeed => "maximum_speed",
            AxisParam::MaximumAcceleration => "maximum_acceleration",
            AxisParam::MaximumCurrent => "maximum_current",
            AxisParam::StandbyCurrent => "standby_current",
            AxisParam::MicrostepResolution => "microstep_resolution",
            AxisParam::RampDivisor => "ramp_divisor",
            AxisParam::PulseDivisor => "pulse_divisor",
            AxisParam::MixedDecayThreshold => "mixed_decay_threshold",
            AxisParam::StallDetectionThreshold => "stall_detection_threshold",
            AxisParam::EncoderPosition => "encoder_position",
            AxisParam::EncoderPrescaler => "encoder_prescaler",
            AxisParam::FullstepThreshold => "fullstep_threshold",
        }
    }

    /// Range of values the module accepts for this parameter.
    pub fn range(self) -> RangeInclusive<i32> {
        match self {
            AxisParam::TargetPosition
            | AxisParam::ActualPosition
            | AxisParam::EncoderPosition => i32::MIN..=i32::MAX,
            AxisParam::TargetSpeed | AxisParam::ActualSpeed => -2047..=2047,
            AxisParam::MaximumSpeed | AxisParam::MaximumAcceleration => 0..=2047,
            AxisParam::MaximumCurrent | AxisParam::StandbyCurrent => 0..=255,
            AxisParam::MicrostepResolution => 0..=6,
            AxisParam::RampDivisor | AxisParam::PulseDivisor => 0..=13,
            AxisParam::MixedDecayThreshold => -1..=2048,
            AxisParam::StallDetectionThreshold => -64..=63,
            AxisParam::EncoderPrescaler => 0..=65535,
            AxisParam::FullstepThreshold => 0..=2048,
        }
    }

    /// Whether `value` is inside [`AxisParam::range`].
    pub fn accepts(self, value: i32) -> bool {
        self.range().contains(&value)
    }
}

impl fmt::Display for AxisParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Global parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalVar {
    /// Stored-program execution status (bank 0, read-only)
    ApplicationStatus,
    /// General purpose user variable `gp<n>` (bank 2)
    User(u8),
}

impl GlobalVar {
    /// Global parameter bank.
    pub const fn bank(self) -> u8 {
        match self {
            GlobalVar::ApplicationStatus => 0,
            GlobalVar::User(_) => 2,
        }
    }

    /// Parameter number within the bank.
    pub const fn number(self) -> u8 {
        match self {
            GlobalVar::ApplicationStatus => APPLICATION_STATUS_NUMBER,
            GlobalVar::User(n) => n,
        }
    }

    /// Whether the host (or a stored program) may write this variable.
    pub const fn is_writable(self) -> bool {
        matches!(self, GlobalVar::User(_))
    }

    /// Whether this identifier refers to a variable that exists on the module.
    pub const fn is_valid(self) -> bool {
        match self {
            GlobalVar::ApplicationStatus => true,
            GlobalVar::User(n) => n <= MAX_USER_VARIABLE,
        }
    }
}

impl fmt::Display for GlobalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalVar::ApplicationStatus => f.write_str("tmcl_application_status"),
            GlobalVar::User(n) => write!(f, "gp{n}"),
        }
    }
}

/// Source of a value written by `SetParam` / `SetGlobal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Immediate value encoded in the instruction
    Value(i32),
    /// Current accumulator contents
    Accumulator,
}

/// Arithmetic operation for `Calc` and `CalcX`.
///
/// With `CalcX`, `Load` copies the accumulator into X and `Swap` exchanges
/// the two registers. With `Calc`, `Load` sets the accumulator to the
/// immediate value and `Swap` is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcOp {
    /// Addition
    Add,
    /// Subtraction
    Sub,
    /// Multiplication
    Mul,
    /// Division, truncating toward zero
    Div,
    /// Remainder
    Mod,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Bitwise not of the accumulator
    Not,
    /// Load
    Load,
    /// Swap accumulator and X (`CalcX` only)
    Swap,
}

impl CalcOp {
    /// TMCL type mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            CalcOp::Add => "ADD",
            CalcOp::Sub => "SUB",
            CalcOp::Mul => "MUL",
            CalcOp::Div => "DIV",
            CalcOp::Mod => "MOD",
            CalcOp::And => "AND",
            CalcOp::Or => "OR",
            CalcOp::Xor => "XOR",
            CalcOp::Not => "NOT",
            CalcOp::Load => "LOAD",
            CalcOp::Swap => "SWAP",
        }
    }
}

/// Jump condition, evaluated against the result of the last `Comp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Accumulator equal to the compared value
    Eq,
    /// Accumulator not equal
    Ne,
    /// Accumulator greater
    Gt,
    /// Accumulator greater or equal
    Ge,
    /// Accumulator less
    Lt,
    /// Accumulator less or equal
    Le,
}

impl Condition {
    /// TMCL condition mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Condition::Eq => "EQ",
            Condition::Ne => "NE",
            Condition::Gt => "GT",
            Condition::Ge => "GE",
            Condition::Lt => "LT",
            Condition::Le => "LE",
        }
    }

    /// Evaluate the condition for a comparison `accumulator.cmp(&value)`.
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            Condition::Eq => ordering == Equal,
            Condition::Ne => ordering != Equal,
            Condition::Gt => ordering == Greater,
            Condition::Ge => ordering != Less,
            Condition::Lt => ordering == Less,
            Condition::Le => ordering != Greater,
        }
    }
}

/// One stored-program instruction.
///
/// Jump targets are absolute, 0-based program addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// WAIT TICKS
    Wait {
        /// Number of timer ticks to suspend
        ticks: u32,
    },
    /// STOP: end of program
    Stop,
    /// GAP: accumulator = parameter
    GetParam(AxisParam),
    /// SAP (immediate) / AAP (accumulator)
    SetParam(AxisParam, Operand),
    /// GGP: accumulator = global
    GetGlobal(GlobalVar),
    /// SGP (immediate) / AGP (accumulator)
    SetGlobal(GlobalVar, Operand),
    /// CALC: accumulator op immediate
    Calc(CalcOp, i32),
    /// CALCX: accumulator op X
    CalcX(CalcOp),
    /// COMP: compare accumulator against immediate
    Comp(i32),
    /// JC: conditional jump
    JumpIf(Condition, usize),
    /// JA: unconditional jump
    JumpAlways(usize),
}

impl Instruction {
    /// Jump target, if this is a jump instruction.
    pub const fn jump_target(&self) -> Option<usize> {
        match self {
            Instruction::JumpIf(_, addr) | Instruction::JumpAlways(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Wait { ticks } => write!(f, "WAIT TICKS, 0, {ticks}"),
            Instruction::Stop => f.write_str("STOP"),
            Instruction::GetParam(p) => write!(f, "GAP {}, 0", p.number()),
            Instruction::SetParam(p, Operand::Value(v)) => write!(f, "SAP {}, 0, {v}", p.number()),
            Instruction::SetParam(p, Operand::Accumulator) => write!(f, "AAP {}, 0", p.number()),
            Instruction::GetGlobal(g) => write!(f, "GGP {}, {}", g.number(), g.bank()),
            Instruction::SetGlobal(g, Operand::Value(v)) => {
                write!(f, "SGP {}, {}, {v}", g.number(), g.bank())
            }
            Instruction::SetGlobal(g, Operand::Accumulator) => {
                write!(f, "AGP {}, {}", g.number(), g.bank())
            }
            Instruction::Calc(op, v) => write!(f, "CALC {}, {v}", op.mnemonic()),
            Instruction::CalcX(op) => write!(f, "CALCX {}", op.mnemonic()),
            Instruction::Comp(v) => write!(f, "COMP {v}"),
            Instruction::JumpIf(c, addr) => write!(f, "JC {}, {addr}", c.mnemonic()),
            Instruction::JumpAlways(addr) => write!(f, "JA {addr}"),
        }
    }
}
