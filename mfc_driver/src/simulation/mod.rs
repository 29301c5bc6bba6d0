//! Simulated TMCM-140 module.
//!
//! This module provides a software module for development and testing
//! without the focus drive attached: a stored-program interpreter, a motor
//! and encoder model, and the device that combines them behind
//! `TmclInterface`.

mod device;
mod motor;
mod vm;

pub use device::{ClockHandle, SimulatedDevice};
pub use motor::{ACCELERATION_SCALE, MotorSimulator, SPEED_PER_COUNT};
pub use vm::{INSTRUCTION_BUDGET, ProgramVm, RegisterFile, VmFault, Yield};
