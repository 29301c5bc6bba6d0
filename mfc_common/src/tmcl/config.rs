//! TMCL module configuration types.
//!
//! This module contains configuration types for the focus actuator:
//! - `DeviceConfig` - Motor parameters applied once at driver start
//! - `SimulationConfig` - Settings for the simulated module

use crate::config::ConfigError;
use crate::tmcl::consts::PROGRAM_MEMORY_SIZE;
use crate::tmcl::types::AxisParam;
use serde::{Deserialize, Serialize};

/// Default function for tick_us
fn default_tick_us() -> u64 {
    10_000
}

/// Default function for program_capacity
fn default_program_capacity() -> usize {
    PROGRAM_MEMORY_SIZE
}

/// Motor parameters written to the module before the profile program is
/// uploaded.
///
/// Defaults are the values the focus drive was tuned with. The profile
/// program's deceleration divisor assumes this speed/acceleration scale.
///
/// # TOML Example
///
/// ```toml
/// [device]
/// maximum_current = 50
/// maximum_acceleration = 1000
/// microstep_resolution = 5
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Peak motor current (0-255)
    pub maximum_current: i32,
    /// Acceleration limit (0-2047)
    pub maximum_acceleration: i32,
    /// Speed limit (0-2047)
    pub maximum_speed: i32,
    /// Ramp divisor (0-13)
    pub ramp_divisor: i32,
    /// Pulse divisor (0-13)
    pub pulse_divisor: i32,
    /// Current at rest (0-255)
    pub standby_current: i32,
    /// Mixed decay threshold; -1 keeps mixed decay on at all speeds, which
    /// reduces microstep nonlinearity
    pub mixed_decay_threshold: i32,
    /// Encoder prescaler; 8192 yields one count per encoder step
    pub encoder_prescaler: i32,
    /// Microstep resolution as a power of two (5 = 32 microsteps)
    pub microstep_resolution: i32,
    /// Full-step switchover speed
    pub fullstep_threshold: i32,
    /// stallGuard threshold; 0 disables stall detection
    pub stall_detection_threshold: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            maximum_current: 50,
            maximum_acceleration: 1000,
            maximum_speed: 2000,
            ramp_divisor: 7,
            pulse_divisor: 3,
            standby_current: 0,
            mixed_decay_threshold: -1,
            encoder_prescaler: 8192,
            microstep_resolution: 5,
            fullstep_threshold: 0,
            stall_detection_threshold: 0,
        }
    }
}

impl DeviceConfig {
    /// Parameter writes for this configuration, in the order they are applied.
    pub fn to_params(&self) -> Vec<(AxisParam, i32)> {
        vec![
            (AxisParam::MaximumCurrent, self.maximum_current),
            (AxisParam::MaximumAcceleration, self.maximum_acceleration),
            (AxisParam::MaximumSpeed, self.maximum_speed),
            (AxisParam::RampDivisor, self.ramp_divisor),
            (AxisParam::PulseDivisor, self.pulse_divisor),
            (AxisParam::StandbyCurrent, self.standby_current),
            (AxisParam::MixedDecayThreshold, self.mixed_decay_threshold),
            (AxisParam::EncoderPrescaler, self.encoder_prescaler),
            (AxisParam::MicrostepResolution, self.microstep_resolution),
            (AxisParam::FullstepThreshold, self.fullstep_threshold),
            (AxisParam::StallDetectionThreshold, self.stall_detection_threshold),
        ]
    }

    /// Validate every value against the range the module accepts.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first parameter that
    /// is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (param, value) in self.to_params() {
            if !param.accepts(value) {
                let range = param.range();
                return Err(ConfigError::ValidationError(format!(
                    "{} = {} is outside {}..={}",
                    param,
                    value,
                    range.start(),
                    range.end()
                )));
            }
        }
        Ok(())
    }
}

/// Settings for the simulated module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Device tick period in microseconds.
    #[serde(default = "default_tick_us")]
    pub tick_us: u64,

    /// Program memory size in instructions.
    #[serde(default = "default_program_capacity")]
    pub program_capacity: usize,

    /// Encoder count at power-up.
    #[serde(default)]
    pub initial_position: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_us: default_tick_us(),
            program_capacity: default_program_capacity(),
            initial_position: 0,
        }
    }
}

impl SimulationConfig {
    /// Validate the simulation settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_us == 0 {
            return Err(ConfigError::ValidationError(
                "tick_us must be greater than 0".to_string(),
            ));
        }
        if self.program_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "program_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
