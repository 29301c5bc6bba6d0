//! Stepper motor and encoder model.
//!
//! Speed ramps toward the commanded speed at a rate derived from
//! `maximum_acceleration`; the encoder integrates speed at
//! [`SPEED_PER_COUNT`] speed units per count per tick, carrying the
//! remainder between ticks so slow motion still advances one count at a
//! time.

use mfc_common::tmcl::consts::MAX_SPEED;
use tracing::trace;

/// Speed units that advance the encoder by one count per tick.
pub const SPEED_PER_COUNT: i32 = 64;

/// `maximum_acceleration` units per speed unit of change per tick.
pub const ACCELERATION_SCALE: i32 = 100;

/// Motor state.
#[derive(Debug, Clone, Default)]
pub struct MotorSimulator {
    target_speed: i32,
    actual_speed: i32,
    encoder_position: i32,
    /// Sub-count travel carried to the next tick
    remainder: i32,
}

impl MotorSimulator {
    /// Create a motor at rest at `position`.
    pub fn new(position: i32) -> Self {
        Self {
            encoder_position: position,
            ..Self::default()
        }
    }

    /// Commanded speed.
    pub fn target_speed(&self) -> i32 {
        self.target_speed
    }

    /// Current speed.
    pub fn actual_speed(&self) -> i32 {
        self.actual_speed
    }

    /// Encoder count.
    pub fn encoder_position(&self) -> i32 {
        self.encoder_position
    }

    /// Command a speed.
    pub fn set_target_speed(&mut self, speed: i32) {
        self.target_speed = speed.clamp(-MAX_SPEED, MAX_SPEED);
    }

    /// Overwrite the current speed.
    pub fn set_actual_speed(&mut self, speed: i32) {
        self.actual_speed = speed.clamp(-MAX_SPEED, MAX_SPEED);
    }

    /// Overwrite the encoder count. Sub-count travel is discarded.
    pub fn set_encoder_position(&mut self, position: i32) {
        self.encoder_position = position;
        self.remainder = 0;
    }

    /// Stop immediately.
    pub fn stop(&mut self) {
        self.target_speed = 0;
        self.actual_speed = 0;
    }

    /// Advance one tick.
    ///
    /// # Arguments
    /// * `maximum_speed` - Speed magnitude limit
    /// * `maximum_acceleration` - Acceleration setting
    pub fn update(&mut self, maximum_speed: i32, maximum_acceleration: i32) {
        let step = (maximum_acceleration / ACCELERATION_SCALE).max(1);
        let limit = maximum_speed.clamp(0, MAX_SPEED);
        let wanted = self.target_speed.clamp(-limit, limit);

        let delta = (wanted - self.actual_speed).clamp(-step, step);
        self.actual_speed += delta;

        self.remainder += self.actual_speed;
        let counts = self.remainder / SPEED_PER_COUNT;
        self.remainder -= counts * SPEED_PER_COUNT;
        self.encoder_position = self.encoder_position.wrapping_add(counts);

        trace!(
            "motor: target={} actual={} encoder={}",
            self.target_speed, self.actual_speed, self.encoder_position
        );
    }
}
