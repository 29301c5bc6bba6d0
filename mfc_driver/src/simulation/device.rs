//! Simulated TMCM-140 module.
//!
//! `SimulatedDevice` implements [`TmclInterface`] on top of the program
//! interpreter and the motor model. Time is advanced explicitly with
//! [`SimulatedDevice::tick`], or in the background by a clock thread from
//! [`SimulatedDevice::spawn_clock`]. Each tick runs one program step and
//! then one motor update.

use super::motor::MotorSimulator;
use super::vm::{ProgramVm, RegisterFile, Yield};
use mfc_common::tmcl::config::{DeviceConfig, SimulationConfig};
use mfc_common::tmcl::consts::{
    APPLICATION_STATUS_RUNNING, APPLICATION_STATUS_STOPPED, MAX_SPEED, PROGRAM_MEMORY_SIZE,
};
use mfc_common::tmcl::interface::{TmclError, TmclInterface};
use mfc_common::tmcl::program::Program;
use mfc_common::tmcl::types::{AxisParam, GlobalVar};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Axis parameters and globals as the interpreter sees them.
#[derive(Debug)]
struct Registers {
    /// Stored axis parameters; motion parameters live in `motor`
    params: HashMap<AxisParam, i32>,
    /// User variables by number
    globals: HashMap<u8, i32>,
    motor: MotorSimulator,
    application_status: i32,
}

impl Registers {
    fn new(initial_position: i32) -> Self {
        let mut params: HashMap<AxisParam, i32> =
            AxisParam::ALL.iter().map(|&param| (param, 0)).collect();
        params.extend(DeviceConfig::default().to_params());
        Self {
            params,
            globals: HashMap::new(),
            motor: MotorSimulator::new(initial_position),
            application_status: APPLICATION_STATUS_STOPPED,
        }
    }

    fn param(&self, param: AxisParam) -> i32 {
        match param {
            AxisParam::TargetSpeed => self.motor.target_speed(),
            AxisParam::ActualSpeed => self.motor.actual_speed(),
            AxisParam::EncoderPosition => self.motor.encoder_position(),
            other => self.params.get(&other).copied().unwrap_or_default(),
        }
    }

    fn store_param(&mut self, param: AxisParam, value: i32) {
        match param {
            AxisParam::TargetSpeed => self.motor.set_target_speed(value),
            AxisParam::ActualSpeed => self.motor.set_actual_speed(value),
            AxisParam::EncoderPosition => self.motor.set_encoder_position(value),
            other => {
                self.params.insert(other, value);
            }
        }
    }

    fn global(&self, var: GlobalVar) -> i32 {
        match var {
            GlobalVar::ApplicationStatus => self.application_status,
            GlobalVar::User(n) => self.globals.get(&n).copied().unwrap_or_default(),
        }
    }

    fn update_motor(&mut self) {
        let maximum_speed = self.param(AxisParam::MaximumSpeed);
        let maximum_acceleration = self.param(AxisParam::MaximumAcceleration);
        self.motor.update(maximum_speed, maximum_acceleration);
    }
}

impl RegisterFile for Registers {
    fn get_param(&mut self, param: AxisParam) -> i32 {
        self.param(param)
    }

    fn set_param(&mut self, param: AxisParam, value: i32) {
        let range = param.range();
        self.store_param(param, value.clamp(*range.start(), *range.end()));
    }

    fn get_global(&mut self, var: GlobalVar) -> i32 {
        self.global(var)
    }

    fn set_global(&mut self, var: GlobalVar, value: i32) {
        match var {
            GlobalVar::User(n) if var.is_valid() => {
                self.globals.insert(n, value);
            }
            _ => debug!("Program write to {} ignored", var),
        }
    }
}

#[derive(Debug)]
struct DeviceState {
    registers: Registers,
    vm: ProgramVm,
    program: Option<Program>,
    program_capacity: usize,
    ticks: u64,
}

impl DeviceState {
    fn sync_status(&mut self) {
        self.registers.application_status = if self.vm.is_running() {
            APPLICATION_STATUS_RUNNING
        } else {
            APPLICATION_STATUS_STOPPED
        };
    }
}

/// Software TMCM-140 with one axis and stored-program memory.
#[derive(Debug)]
pub struct SimulatedDevice {
    state: Mutex<DeviceState>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Create a module at encoder position 0 with full program memory.
    pub fn new() -> Self {
        Self::with_settings(0, PROGRAM_MEMORY_SIZE)
    }

    /// Create a module from simulation settings.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::with_settings(config.initial_position, config.program_capacity)
    }

    fn with_settings(initial_position: i32, program_capacity: usize) -> Self {
        Self {
            state: Mutex::new(DeviceState {
                registers: Registers::new(initial_position),
                vm: ProgramVm::new(),
                program: None,
                program_capacity,
                ticks: 0,
            }),
        }
    }

    /// Advance the module by one tick.
    ///
    /// Returns how the program yielded, or `None` if no program is running.
    pub fn tick(&self) -> Option<Yield> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let outcome = match &state.program {
            Some(program) => state.vm.tick(program, &mut state.registers),
            None => None,
        };
        if outcome == Some(Yield::Halted) {
            debug!("Stored program stopped after {} ticks", state.ticks + 1);
        }
        state.sync_status();
        state.registers.update_motor();
        state.ticks += 1;
        outcome
    }

    /// Advance the module by `n` ticks.
    pub fn run_ticks(&self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Tick until the stored program stops.
    ///
    /// Returns the number of ticks taken, or `None` if the program was still
    /// running after `max_ticks`.
    pub fn run_until_idle(&self, max_ticks: u64) -> Option<u64> {
        for n in 0..=max_ticks {
            if !self.state.lock().vm.is_running() {
                return Some(n);
            }
            if n < max_ticks {
                self.tick();
            }
        }
        None
    }

    /// Ticks elapsed since creation.
    pub fn tick_count(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Current encoder count.
    pub fn encoder_position(&self) -> i32 {
        self.state.lock().registers.motor.encoder_position()
    }

    /// Current motor speed.
    pub fn actual_speed(&self) -> i32 {
        self.state.lock().registers.motor.actual_speed()
    }

    /// Returns true while the stored program runs.
    pub fn is_program_running(&self) -> bool {
        self.state.lock().vm.is_running()
    }

    /// Currently loaded program.
    pub fn program(&self) -> Option<Program> {
        self.state.lock().program.clone()
    }

    /// Tick the module from a background thread every `period`.
    ///
    /// The clock stops when the returned handle is stopped or dropped.
    pub fn spawn_clock(self: &Arc<Self>, period: Duration) -> Result<ClockHandle, TmclError> {
        let running = Arc::new(AtomicBool::new(true));
        let device = Arc::clone(self);
        let flag = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("mfc-sim-clock".to_string())
            .spawn(move || {
                while flag.load(Ordering::Acquire) {
                    thread::sleep(period);
                    device.tick();
                }
            })?;

        info!("Simulation clock started ({:?} per tick)", period);
        Ok(ClockHandle {
            running,
            thread: Some(thread),
        })
    }

    fn rejected(command: &'static str, reason: impl Into<String>) -> TmclError {
        let reason = reason.into();
        warn!("{} rejected: {}", command, reason);
        TmclError::Rejected { command, reason }
    }

    fn check_param(command: &'static str, param: AxisParam, value: i32) -> Result<(), TmclError> {
        if param.accepts(value) {
            return Ok(());
        }
        let range = param.range();
        Err(Self::rejected(
            command,
            format!(
                "{} = {} outside {}..={}",
                param,
                value,
                range.start(),
                range.end()
            ),
        ))
    }
}

impl TmclInterface for SimulatedDevice {
    fn get_param(&self, param: AxisParam) -> Result<i32, TmclError> {
        Ok(self.state.lock().registers.param(param))
    }

    fn set_param(&self, param: AxisParam, value: i32) -> Result<(), TmclError> {
        Self::check_param("SAP", param, value)?;
        self.state.lock().registers.store_param(param, value);
        Ok(())
    }

    fn set_params(&self, params: &[(AxisParam, i32)]) -> Result<(), TmclError> {
        for &(param, value) in params {
            Self::check_param("SAP", param, value)?;
        }
        let mut state = self.state.lock();
        for &(param, value) in params {
            state.registers.store_param(param, value);
        }
        debug!("Applied {} axis parameters", params.len());
        Ok(())
    }

    fn get_global(&self, var: GlobalVar) -> Result<i32, TmclError> {
        if !var.is_valid() {
            return Err(Self::rejected("GGP", format!("no such variable {}", var)));
        }
        Ok(self.state.lock().registers.global(var))
    }

    fn set_global(&self, var: GlobalVar, value: i32) -> Result<(), TmclError> {
        match var {
            _ if !var.is_writable() => {
                Err(Self::rejected("SGP", format!("{} is read-only", var)))
            }
            GlobalVar::User(n) if var.is_valid() => {
                self.state.lock().registers.globals.insert(n, value);
                Ok(())
            }
            _ => Err(Self::rejected("SGP", format!("no such variable {}", var))),
        }
    }

    fn rotate(&self, speed: i32) -> Result<(), TmclError> {
        if !(-MAX_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(Self::rejected("ROR", format!("speed {} out of range", speed)));
        }
        self.state.lock().registers.motor.set_target_speed(speed);
        Ok(())
    }

    fn stop(&self) -> Result<(), TmclError> {
        self.state.lock().registers.motor.stop();
        Ok(())
    }

    fn start_program(&self) -> Result<(), TmclError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(program) = &state.program else {
            return Err(Self::rejected("RUN", "no program loaded"));
        };
        state.vm.start();
        state.registers.application_status = APPLICATION_STATUS_RUNNING;
        // Execution starts right away and runs up to the first yield.
        state.vm.run(program, &mut state.registers);
        state.sync_status();
        Ok(())
    }

    fn stop_program(&self) -> Result<(), TmclError> {
        let mut state = self.state.lock();
        state.vm.halt();
        state.sync_status();
        Ok(())
    }

    fn upload_program(&self, program: &Program) -> Result<(), TmclError> {
        let mut state = self.state.lock();
        if state.vm.is_running() {
            return Err(Self::rejected("download", "program running"));
        }
        if program.len() > state.program_capacity {
            return Err(Self::rejected(
                "download",
                format!(
                    "{} instructions exceed program memory of {}",
                    program.len(),
                    state.program_capacity
                ),
            ));
        }
        state.program = Some(program.clone());
        info!("Program downloaded ({} instructions)", program.len());
        Ok(())
    }
}

/// Handle to a running simulation clock.
#[derive(Debug)]
pub struct ClockHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ClockHandle {
    /// Stop the clock and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Simulation clock thread panicked");
            }
        }
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
