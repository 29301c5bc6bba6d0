//! TMCL module constants.
//!
//! This module contains constants for TMCM-class motion control modules,
//! including program memory size and global parameter numbering.

/// Canonical driver service name (used for logging).
pub const DRIVER_SERVICE_NAME: &str = "mfc";

/// Stored-program memory size in instructions
pub const PROGRAM_MEMORY_SIZE: usize = 2048;

/// Global parameter number of the application status (bank 0)
pub const APPLICATION_STATUS_NUMBER: u8 = 128;

/// Application status value reported while a stored program runs
pub const APPLICATION_STATUS_RUNNING: i32 = 1;

/// Application status value reported while no stored program runs
pub const APPLICATION_STATUS_STOPPED: i32 = 0;

/// Highest user variable number in bank 2
pub const MAX_USER_VARIABLE: u8 = 55;

/// Largest speed magnitude an axis accepts
pub const MAX_SPEED: i32 = 2047;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mfc/mfc.toml";
