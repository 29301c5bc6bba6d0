//! Motion controller facade.
//!
//! `MotionController` configures the module, downloads the profile program
//! and turns host requests into register writes. Move outcomes are derived
//! by polling: a move is finished when the stored program has stopped, and
//! it succeeded when the encoder ended within [`DONE_TOLERANCE`] of the
//! target.
//!
//! # Locking
//!
//! Operations that read module state, decide and then write run under one
//! re-entrant guard, so a nested guarded call from the same thread does not
//! deadlock. `position()`, `program_running()` and `set_encoder()` are
//! single register accesses and take no lock.
//!
//! [`DONE_TOLERANCE`]: crate::moves::DONE_TOLERANCE

use crate::error::{DriverError, InitStage};
use crate::moves::{MoveId, MoveRecord, MoveRegistry, MoveStatus};
use crate::profile::{TARGET_POSITION, profile_program};
use mfc_common::tmcl::config::DeviceConfig;
use mfc_common::tmcl::consts::APPLICATION_STATUS_RUNNING;
use mfc_common::tmcl::interface::TmclInterface;
use mfc_common::tmcl::types::{AxisParam, GlobalVar};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::time::Instant;
use tracing::{debug, info};

/// Host-side driver for a focus drive running the profile program.
pub struct MotionController<D: TmclInterface> {
    /// Register interface of the module
    device: D,
    /// Configuration applied at construction
    config: DeviceConfig,
    /// Move table, also the guard serializing multi-step operations
    guard: ReentrantMutex<RefCell<MoveRegistry>>,
}

impl<D: TmclInterface> MotionController<D> {
    /// Configure the module and download the profile program.
    ///
    /// Stops any running program and the motor, writes `config`, sets the
    /// target global to the current encoder position so a later start does
    /// not seek a stale target, and downloads the program.
    ///
    /// # Errors
    /// Returns `DriverError::Configuration` if the module rejects the
    /// configuration or the download, and `DriverError::Transport` for any
    /// other failed command.
    pub fn new(device: D, config: DeviceConfig) -> Result<Self, DriverError> {
        device.stop_program()?;
        device.stop()?;

        device
            .set_params(&config.to_params())
            .map_err(|source| DriverError::Configuration {
                stage: InitStage::ApplyConfig,
                source,
            })?;

        let position = device.get_param(AxisParam::EncoderPosition)?;
        device.set_global(TARGET_POSITION, position)?;

        let program = profile_program()?;
        device
            .upload_program(&program)
            .map_err(|source| DriverError::Configuration {
                stage: InitStage::UploadProgram,
                source,
            })?;

        info!(
            "Motion controller ready at position {} ({} instructions downloaded)",
            position,
            program.len()
        );

        Ok(Self {
            device,
            config,
            guard: ReentrantMutex::new(RefCell::new(MoveRegistry::new())),
        })
    }

    /// Register interface of the module.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Configuration applied at construction.
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Current encoder position.
    pub fn position(&self) -> Result<i32, DriverError> {
        Ok(self.device.get_param(AxisParam::EncoderPosition)?)
    }

    /// Position the drive is heading for.
    ///
    /// While the profile program runs this is the commanded target;
    /// otherwise the motor is stopped or rotating freely and its target is
    /// wherever it is now.
    pub fn target_position(&self) -> Result<i32, DriverError> {
        let _guard = self.guard.lock();
        if self.program_running()? {
            Ok(self.device.get_global(TARGET_POSITION)?)
        } else {
            self.position()
        }
    }

    /// Start a move to `position`.
    ///
    /// A move that is still outstanding is marked interrupted. If the
    /// program is already running it is retargeted in place; otherwise the
    /// target is written and the program started. A program that halts on
    /// its own between the status read and the target write is restarted.
    ///
    /// # Errors
    /// If the status read or the target write fails, nothing has changed:
    /// the previous move keeps its status and no new move is recorded. If
    /// the program start fails, the previous move has already been resolved
    /// and no new move is recorded.
    pub fn move_to(&self, position: i32) -> Result<MoveId, DriverError> {
        let guard = self.guard.lock();

        let was_running = self.program_running()?;
        self.device.set_global(TARGET_POSITION, position)?;
        self.interrupt_move()?;

        if !was_running {
            self.device.start_program()?;
        } else if !self.program_running()? {
            debug!("Program halted before retarget, restarting");
            self.device.start_program()?;
        }

        let mut registry = guard.borrow_mut();
        let id = registry.begin(position, Instant::now());
        debug_assert!(registry.moving_count() <= 1);
        debug!("Move {} to {}", id, position);
        Ok(id)
    }

    /// Poll the status of move `id`.
    ///
    /// A `Moving` record is resolved once the program has stopped. With
    /// `clear`, a terminal record is removed after it is returned, so a
    /// second poll of the same id fails.
    ///
    /// # Errors
    /// Returns `DriverError::UnknownMoveId` if `id` was never issued or has
    /// been cleared.
    pub fn move_status(&self, id: MoveId, clear: bool) -> Result<MoveRecord, DriverError> {
        let guard = self.guard.lock();

        let Some(record) = guard.borrow().get(id).copied() else {
            return Err(DriverError::UnknownMoveId(id));
        };

        let status = if record.status == MoveStatus::Moving {
            let running = self.program_running()?;
            if running {
                MoveStatus::Moving
            } else {
                record.status.resolve(false, self.position()?, record.target)
            }
        } else {
            record.status
        };

        let mut registry = guard.borrow_mut();
        if status != record.status {
            debug!("Move {} {}", id, status);
            registry.set_status(id, status);
        }
        if clear && status.is_terminal() {
            registry.remove(id);
        }
        Ok(MoveRecord { status, ..record })
    }

    /// Rotate at constant `speed`. Positive values turn right.
    ///
    /// Interrupts any outstanding move and stops the program. Rotation is
    /// not tracked as a move.
    pub fn rotate(&self, speed: i32) -> Result<(), DriverError> {
        let _guard = self.guard.lock();
        self.interrupt_move()?;
        self.device.stop_program()?;
        self.device.rotate(speed)?;
        debug!("Rotating at {}", speed);
        Ok(())
    }

    /// Stop the program and the motor. Interrupts any outstanding move.
    pub fn stop(&self) -> Result<(), DriverError> {
        let _guard = self.guard.lock();
        self.interrupt_move()?;
        self.device.stop_program()?;
        self.device.stop()?;
        debug!("Stopped");
        Ok(())
    }

    /// Returns true while the module reports its stored program running.
    pub fn program_running(&self) -> Result<bool, DriverError> {
        let status = self.device.get_global(GlobalVar::ApplicationStatus)?;
        Ok(status == APPLICATION_STATUS_RUNNING)
    }

    /// Overwrite the encoder count. Does not move the motor.
    pub fn set_encoder(&self, position: i32) -> Result<(), DriverError> {
        self.device.set_param(AxisParam::EncoderPosition, position)?;
        info!("Encoder set to {}", position);
        Ok(())
    }

    /// Number of move records not yet cleared.
    pub fn pending_moves(&self) -> usize {
        self.guard.lock().borrow().len()
    }

    /// Mark the most recent move interrupted if it is still moving.
    ///
    /// The record is resolved first, so a move whose program already
    /// stopped keeps its real outcome.
    fn interrupt_move(&self) -> Result<(), DriverError> {
        let guard = self.guard.lock();
        let Some(id) = guard.borrow().last_id() else {
            return Ok(());
        };

        match self.move_status(id, false) {
            Ok(record) if record.status == MoveStatus::Moving => {
                guard.borrow_mut().set_status(id, MoveStatus::Interrupted);
                debug!("Move {} interrupted", id);
                Ok(())
            }
            Ok(_) | Err(DriverError::UnknownMoveId(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
