//! Driver error types.

use crate::moves::MoveId;
use mfc_common::tmcl::interface::TmclError;
use mfc_common::tmcl::program::ProgramError;
use std::fmt;
use thiserror::Error;

/// Initialization step that failed to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Writing the device configuration
    ApplyConfig,
    /// Downloading the profile program
    UploadProgram,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStage::ApplyConfig => f.write_str("apply configuration"),
            InitStage::UploadProgram => f.write_str("upload profile program"),
        }
    }
}

/// Error types for motion controller operations.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// Serial transport or reply error, propagated unchanged
    #[error(transparent)]
    Transport(#[from] TmclError),

    /// Move id was never issued or has already been cleared
    #[error("Unknown move id: {0}")]
    UnknownMoveId(MoveId),

    /// The module did not acknowledge a step of driver initialization
    #[error("Device configuration failed during {stage}: {source}")]
    Configuration {
        /// Step that failed
        stage: InitStage,
        /// Underlying module error
        source: TmclError,
    },

    /// Profile program assembly failed
    #[error("Program assembly failed: {0}")]
    Program(#[from] ProgramError),
}
