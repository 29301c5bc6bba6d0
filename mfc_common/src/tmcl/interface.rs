//! TMCL register interface trait and error types.
//!
//! This module defines:
//! - `TmclInterface` trait - Register/command access to a motion control module
//! - `TmclError` enum - Error types for module communication

use crate::tmcl::program::Program;
use crate::tmcl::types::{AxisParam, GlobalVar};
use std::sync::Arc;
use thiserror::Error;

/// Error types for TMCL communication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TmclError {
    /// Serial I/O failed
    #[error("Communication error: {0}")]
    Communication(String),

    /// Reply frame could not be parsed
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Module answered with a non-success status
    #[error("{command} rejected: {reason}")]
    Rejected {
        /// Command that was rejected
        command: &'static str,
        /// Reason reported by the module
        reason: String,
    },
}

impl From<std::io::Error> for TmclError {
    fn from(e: std::io::Error) -> Self {
        TmclError::Communication(e.to_string())
    }
}

/// Trait defining synchronous register access to a TMCM-class module.
///
/// Implementations own the transport and serialize their own command
/// frames, so every method takes `&self`. Calls block for one round trip
/// and are never retried: a retried motion command could be applied twice.
///
/// # Contract
///
/// | Operation | Effect |
/// |-----------|--------|
/// | `set_params()` | All values applied, or none |
/// | `upload_program()` | Program memory replaced as one unit |
/// | `start_program()` | Execution starts at address 0 |
pub trait TmclInterface: Send + Sync {
    /// Read an axis parameter.
    fn get_param(&self, param: AxisParam) -> Result<i32, TmclError>;

    /// Write an axis parameter.
    fn set_param(&self, param: AxisParam, value: i32) -> Result<(), TmclError>;

    /// Write several axis parameters, all-or-nothing.
    fn set_params(&self, params: &[(AxisParam, i32)]) -> Result<(), TmclError>;

    /// Read a global parameter.
    fn get_global(&self, var: GlobalVar) -> Result<i32, TmclError>;

    /// Write a global parameter.
    fn set_global(&self, var: GlobalVar, value: i32) -> Result<(), TmclError>;

    /// Rotate at a constant speed (ROR/ROL). Positive values turn right.
    fn rotate(&self, speed: i32) -> Result<(), TmclError>;

    /// Stop the motor (MST).
    fn stop(&self) -> Result<(), TmclError>;

    /// Start the stored program.
    fn start_program(&self) -> Result<(), TmclError>;

    /// Stop the stored program.
    fn stop_program(&self) -> Result<(), TmclError>;

    /// Replace program memory with `program`.
    ///
    /// # Errors
    /// Return `TmclError::Rejected` if the module does not accept the
    /// download (program running, program too large).
    fn upload_program(&self, program: &Program) -> Result<(), TmclError>;
}

impl<T: TmclInterface + ?Sized> TmclInterface for Arc<T> {
    fn get_param(&self, param: AxisParam) -> Result<i32, TmclError> {
        (**self).get_param(param)
    }

    fn set_param(&self, param: AxisParam, value: i32) -> Result<(), TmclError> {
        (**self).set_param(param, value)
    }

    fn set_params(&self, params: &[(AxisParam, i32)]) -> Result<(), TmclError> {
        (**self).set_params(params)
    }

    fn get_global(&self, var: GlobalVar) -> Result<i32, TmclError> {
        (**self).get_global(var)
    }

    fn set_global(&self, var: GlobalVar, value: i32) -> Result<(), TmclError> {
        (**self).set_global(var, value)
    }

    fn rotate(&self, speed: i32) -> Result<(), TmclError> {
        (**self).rotate(speed)
    }

    fn stop(&self) -> Result<(), TmclError> {
        (**self).stop()
    }

    fn start_program(&self) -> Result<(), TmclError> {
        (**self).start_program()
    }

    fn stop_program(&self) -> Result<(), TmclError> {
        (**self).stop_program()
    }

    fn upload_program(&self, program: &Program) -> Result<(), TmclError> {
        (**self).upload_program(program)
    }
}
