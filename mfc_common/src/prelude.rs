//! Prelude module for common re-exports.
//!
//! ```rust
//! use mfc_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DriverConfig, SharedConfig};
pub use crate::tmcl::config::{DeviceConfig, SimulationConfig};

// ─── TMCL ───────────────────────────────────────────────────────────
pub use crate::tmcl::interface::{TmclError, TmclInterface};
pub use crate::tmcl::program::{Program, ProgramBuilder, ProgramError};
pub use crate::tmcl::types::{AxisParam, CalcOp, Condition, GlobalVar, Instruction, Operand};
