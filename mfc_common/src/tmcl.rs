//! TMCL motion control module types.
//!
//! This module contains the register interface contract, identifiers,
//! instruction set and configuration for TMCM-class modules.

pub mod config;
pub mod consts;
pub mod interface;
pub mod program;
pub mod types;
