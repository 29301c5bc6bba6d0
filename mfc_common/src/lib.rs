//! MFC Common Library
//!
//! Shared types for the motorized focus controller workspace.
//!
//! # Module Structure
//!
//! - [`tmcl`] - Register interface, instruction set and device configuration
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use mfc_common::prelude::*;
//!
//! let mut p = ProgramBuilder::new();
//! p.get_param(AxisParam::EncoderPosition);
//! p.jump(0);
//! assert_eq!(p.finish().unwrap().len(), 2);
//! ```

pub mod config;
pub mod prelude;
pub mod tmcl;
