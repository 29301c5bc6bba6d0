//! # MFC Driver Library
//!
//! Host-side driver for a stepper focus drive on a TMCM-140 module with
//! encoder feedback.
//!
//! The position loop runs on the module: at start the driver downloads a
//! profile program that reads the encoder every tick and writes a new
//! target speed. The host only sets the target and polls for the outcome.
//!
//! # Module Structure
//!
//! - [`controller`] - `MotionController` facade and locking
//! - [`moves`] - Move ids, statuses and the move registry
//! - [`profile`] - Profile program synthesis
//! - [`simulation`] - Simulated module for development and testing
//! - [`error`] - Driver error types
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      mfc_driver                           │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌───────────┐  │
//! │  │ MoveRegistry │◄──┤ MotionController ├──►│  profile  │  │
//! │  └──────────────┘   └────────┬─────────┘   └───────────┘  │
//! │                              │ TmclInterface              │
//! │                              ▼                            │
//! │              ┌────────────────────────────────┐           │
//! │              │ serial module / SimulatedDevice│           │
//! │              └────────────────────────────────┘           │
//! └───────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod controller;
pub mod error;
pub mod moves;
pub mod profile;
pub mod simulation;

// Re-export key types for convenience
pub use crate::controller::MotionController;
pub use crate::error::{DriverError, InitStage};
pub use crate::moves::{MoveId, MoveRecord, MoveStatus};
pub use crate::simulation::SimulatedDevice;
