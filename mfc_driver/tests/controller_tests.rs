//! Motion controller integration tests.
//!
//! Drives the real profile program on the simulated module. Most tests tick
//! the module by hand so every poll happens at a known device time; the
//! contention test runs the background clock instead.

use mfc_common::config::DriverConfig;
use mfc_common::tmcl::config::{DeviceConfig, SimulationConfig};
use mfc_common::tmcl::interface::{TmclError, TmclInterface};
use mfc_common::tmcl::program::Program;
use mfc_common::tmcl::types::{AxisParam, GlobalVar};
use mfc_driver::profile::TARGET_POSITION;
use mfc_driver::{DriverError, InitStage, MotionController, MoveId, MoveStatus, SimulatedDevice};
use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const MAX_TICKS: u64 = 20_000;

type Controller = MotionController<Arc<SimulatedDevice>>;

fn setup() -> (Arc<SimulatedDevice>, Controller) {
    setup_with(SimulationConfig::default())
}

fn setup_with(simulation: SimulationConfig) -> (Arc<SimulatedDevice>, Controller) {
    let device = Arc::new(SimulatedDevice::from_config(&simulation));
    let controller = MotionController::new(Arc::clone(&device), DeviceConfig::default())
        .expect("controller initializes");
    (device, controller)
}

/// Tick until `id` resolves, polling without clearing after every tick.
fn run_to_terminal(device: &SimulatedDevice, controller: &Controller, id: MoveId) -> MoveStatus {
    for _ in 0..MAX_TICKS {
        let status = controller.move_status(id, false).expect("id known").status;
        if status.is_terminal() {
            return status;
        }
        device.tick();
    }
    panic!("move {} did not resolve within {} ticks", id, MAX_TICKS);
}

#[test]
fn test_move_reaches_target() {
    let (device, controller) = setup();
    let id = controller.move_to(1000).unwrap();
    assert_eq!(controller.target_position().unwrap(), 1000);

    assert_eq!(run_to_terminal(&device, &controller, id), MoveStatus::Done);
    assert!((controller.position().unwrap() - 1000).abs() <= 1);
    assert!(!controller.program_running().unwrap());
    assert_eq!(device.actual_speed(), 0);
}

#[test]
fn test_move_in_negative_direction() {
    let (device, controller) = setup_with(SimulationConfig {
        initial_position: 2000,
        ..SimulationConfig::default()
    });
    let id = controller.move_to(-3000).unwrap();
    assert_eq!(run_to_terminal(&device, &controller, id), MoveStatus::Done);
    assert!((controller.position().unwrap() + 3000).abs() <= 1);
}

#[test]
fn test_initialization_targets_current_position() {
    let (device, controller) = setup_with(SimulationConfig {
        initial_position: 777,
        ..SimulationConfig::default()
    });
    assert_eq!(device.get_global(TARGET_POSITION).unwrap(), 777);
    assert_eq!(controller.target_position().unwrap(), 777);
    assert!(!controller.program_running().unwrap());
    assert_eq!(controller.pending_moves(), 0);
}

#[test]
fn test_initialization_applies_configuration() {
    let device = Arc::new(SimulatedDevice::new());
    let config = DeviceConfig {
        maximum_current: 80,
        microstep_resolution: 4,
        ..DeviceConfig::default()
    };
    let controller = MotionController::new(Arc::clone(&device), config.clone()).unwrap();
    assert_eq!(device.get_param(AxisParam::MaximumCurrent).unwrap(), 80);
    assert_eq!(device.get_param(AxisParam::MicrostepResolution).unwrap(), 4);
    assert_eq!(controller.config(), &config);
}

#[test]
fn test_initialization_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[shared]
service_name = "focus-test"

[device]
maximum_current = 60

[simulation]
initial_position = -250
"#
    )
    .unwrap();

    let config = DriverConfig::load_validated(file.path()).unwrap();
    let device = Arc::new(SimulatedDevice::from_config(&config.simulation));
    let controller = MotionController::new(Arc::clone(&device), config.device.clone()).unwrap();

    assert_eq!(device.get_param(AxisParam::MaximumCurrent).unwrap(), 60);
    assert_eq!(controller.position().unwrap(), -250);
}

#[test]
fn test_oversized_program_is_configuration_error() {
    let device = SimulatedDevice::from_config(&SimulationConfig {
        program_capacity: 16,
        ..SimulationConfig::default()
    });
    let err = MotionController::new(device, DeviceConfig::default())
        .err()
        .expect("download must be rejected");
    assert!(matches!(
        err,
        DriverError::Configuration {
            stage: InitStage::UploadProgram,
            ..
        }
    ));
}

#[test]
fn test_out_of_range_config_is_configuration_error() {
    let config = DeviceConfig {
        microstep_resolution: 9,
        ..DeviceConfig::default()
    };
    let err = MotionController::new(SimulatedDevice::new(), config)
        .err()
        .expect("configuration must be rejected");
    assert!(matches!(
        err,
        DriverError::Configuration {
            stage: InitStage::ApplyConfig,
            ..
        }
    ));
}

#[test]
fn test_idempotent_stop() {
    let (device, controller) = setup();
    controller.move_to(3000).unwrap();
    device.run_ticks(100);

    controller.stop().unwrap();
    let position = controller.position().unwrap();
    assert!(!controller.program_running().unwrap());
    assert_eq!(device.actual_speed(), 0);

    controller.stop().unwrap();
    assert!(!controller.program_running().unwrap());
    assert_eq!(device.actual_speed(), 0);
    assert_eq!(controller.position().unwrap(), position);

    device.run_ticks(10);
    assert_eq!(controller.position().unwrap(), position);
}

#[test]
fn test_move_supersession() {
    let (device, controller) = setup();
    let first = controller.move_to(1000).unwrap();
    let second = controller.move_to(-300).unwrap();

    assert_eq!(controller.target_position().unwrap(), -300);
    assert_eq!(
        controller.move_status(first, true).unwrap().status,
        MoveStatus::Interrupted
    );
    assert_eq!(run_to_terminal(&device, &controller, second), MoveStatus::Done);
    assert!((controller.position().unwrap() + 300).abs() <= 1);
}

#[test]
fn test_supersession_mid_move() {
    let (device, controller) = setup();
    let first = controller.move_to(5000).unwrap();
    device.run_ticks(150);
    assert!(controller.program_running().unwrap());

    let second = controller.move_to(100).unwrap();
    assert_eq!(
        controller.move_status(first, false).unwrap().status,
        MoveStatus::Interrupted
    );
    assert_eq!(run_to_terminal(&device, &controller, second), MoveStatus::Done);
    assert!((controller.position().unwrap() - 100).abs() <= 1);
}

#[test]
fn test_halted_move_keeps_outcome_when_superseded() {
    let (device, controller) = setup();
    let first = controller.move_to(200).unwrap();
    device.run_until_idle(MAX_TICKS).expect("program stops");

    controller.move_to(0).unwrap();
    assert_eq!(
        controller.move_status(first, true).unwrap().status,
        MoveStatus::Done
    );
}

/// Simulated module whose program runs to completion right before the next
/// target write lands, once armed.
struct HaltBeforeRetarget {
    inner: Arc<SimulatedDevice>,
    armed: AtomicBool,
}

impl TmclInterface for HaltBeforeRetarget {
    fn get_param(&self, param: AxisParam) -> Result<i32, TmclError> {
        self.inner.get_param(param)
    }

    fn set_param(&self, param: AxisParam, value: i32) -> Result<(), TmclError> {
        self.inner.set_param(param, value)
    }

    fn set_params(&self, params: &[(AxisParam, i32)]) -> Result<(), TmclError> {
        self.inner.set_params(params)
    }

    fn get_global(&self, var: GlobalVar) -> Result<i32, TmclError> {
        self.inner.get_global(var)
    }

    fn set_global(&self, var: GlobalVar, value: i32) -> Result<(), TmclError> {
        if var == TARGET_POSITION && self.armed.swap(false, Ordering::SeqCst) {
            self.inner.run_until_idle(MAX_TICKS);
        }
        self.inner.set_global(var, value)
    }

    fn rotate(&self, speed: i32) -> Result<(), TmclError> {
        self.inner.rotate(speed)
    }

    fn stop(&self) -> Result<(), TmclError> {
        self.inner.stop()
    }

    fn start_program(&self) -> Result<(), TmclError> {
        self.inner.start_program()
    }

    fn stop_program(&self) -> Result<(), TmclError> {
        self.inner.stop_program()
    }

    fn upload_program(&self, program: &Program) -> Result<(), TmclError> {
        self.inner.upload_program(program)
    }
}

#[test]
fn test_retarget_restarts_program_that_just_halted() {
    let inner = Arc::new(SimulatedDevice::new());
    let device = HaltBeforeRetarget {
        inner: Arc::clone(&inner),
        armed: AtomicBool::new(false),
    };
    let controller = MotionController::new(device, DeviceConfig::default()).unwrap();

    let first = controller.move_to(200).unwrap();
    inner.run_ticks(10);
    assert!(controller.program_running().unwrap());

    controller.device().armed.store(true, Ordering::SeqCst);
    let second = controller.move_to(500).unwrap();
    assert!(!controller.device().armed.load(Ordering::SeqCst));
    assert_eq!(inner.encoder_position(), 200);

    assert!(controller.program_running().unwrap());
    assert_eq!(controller.target_position().unwrap(), 500);
    assert_eq!(
        controller.move_status(second, false).unwrap().status,
        MoveStatus::Moving
    );
    assert_eq!(
        controller.move_status(first, true).unwrap().status,
        MoveStatus::Done
    );

    inner.run_until_idle(MAX_TICKS).expect("program stops");
    let record = controller.move_status(second, true).unwrap();
    assert_eq!(record.status, MoveStatus::Done);
    assert_eq!(controller.position().unwrap(), 500);
}

#[test]
fn test_external_program_stop_fails_move() {
    let (device, controller) = setup();
    let id = controller.move_to(4000).unwrap();
    device.run_ticks(50);

    device.stop_program().unwrap();
    device.stop().unwrap();

    let record = controller.move_status(id, true).unwrap();
    assert_eq!(record.status, MoveStatus::Failed);
    assert_eq!(record.target, 4000);
}

#[test]
fn test_eviction() {
    let (device, controller) = setup();
    let id = controller.move_to(100).unwrap();
    run_to_terminal(&device, &controller, id);

    assert_eq!(controller.move_status(id, true).unwrap().status, MoveStatus::Done);
    let err = controller.move_status(id, true).unwrap_err();
    assert!(matches!(err, DriverError::UnknownMoveId(evicted) if evicted == id));
    assert_eq!(controller.pending_moves(), 0);
}

#[test]
fn test_terminal_read_without_clear_is_repeatable() {
    let (device, controller) = setup();
    let id = controller.move_to(100).unwrap();
    run_to_terminal(&device, &controller, id);

    for _ in 0..3 {
        assert_eq!(controller.move_status(id, false).unwrap().status, MoveStatus::Done);
    }
    assert_eq!(controller.pending_moves(), 1);
}

#[test]
fn test_no_false_terminal_while_moving() {
    let (device, controller) = setup();
    let id = controller.move_to(20_000).unwrap();
    for _ in 0..200 {
        device.tick();
        let record = controller.move_status(id, true).unwrap();
        assert_eq!(record.status, MoveStatus::Moving);
    }
    assert_eq!(controller.pending_moves(), 1);
}

#[test]
fn test_zero_distance_move() {
    let (device, controller) = setup_with(SimulationConfig {
        initial_position: 321,
        ..SimulationConfig::default()
    });
    let id = controller.move_to(controller.position().unwrap()).unwrap();
    assert!(controller.program_running().unwrap());

    device.tick();
    assert!(!controller.program_running().unwrap());
    assert_eq!(device.get_param(AxisParam::TargetSpeed).unwrap(), 0);
    assert_eq!(controller.move_status(id, true).unwrap().status, MoveStatus::Done);
    assert_eq!(controller.position().unwrap(), 321);
}

#[test]
fn test_interrupted_then_stopped() {
    let (device, controller) = setup();
    let id = controller.move_to(100).unwrap();
    device.run_ticks(5);
    controller.stop().unwrap();

    assert_eq!(
        controller.move_status(id, true).unwrap().status,
        MoveStatus::Interrupted
    );
}

#[test]
fn test_sequential_ids() {
    let (device, controller) = setup();
    let mut ids = Vec::new();
    for target in [100, -100, 1000] {
        let id = controller.move_to(target).unwrap();
        assert_eq!(run_to_terminal(&device, &controller, id), MoveStatus::Done);
        controller.move_status(id, true).unwrap();
        ids.push(id.get());
    }
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_rotate_interrupts_move() {
    let (device, controller) = setup();
    let id = controller.move_to(5000).unwrap();
    device.run_ticks(20);

    controller.rotate(-300).unwrap();
    assert!(!controller.program_running().unwrap());
    assert_eq!(
        controller.move_status(id, true).unwrap().status,
        MoveStatus::Interrupted
    );

    let before = controller.position().unwrap();
    device.run_ticks(200);
    let after = controller.position().unwrap();
    assert!(after < before);
    assert_eq!(controller.target_position().unwrap(), after);

    controller.stop().unwrap();
    assert_eq!(device.actual_speed(), 0);
}

#[test]
fn test_set_encoder_rezeroes() {
    let (device, controller) = setup();
    controller.set_encoder(5000).unwrap();
    assert_eq!(controller.position().unwrap(), 5000);
    assert_eq!(controller.target_position().unwrap(), 5000);

    let id = controller.move_to(5000).unwrap();
    device.tick();
    assert_eq!(controller.move_status(id, true).unwrap().status, MoveStatus::Done);
}

#[test]
fn test_concurrent_moves_with_clock() {
    let device = Arc::new(SimulatedDevice::new());
    let _clock = device
        .spawn_clock(Duration::from_micros(100))
        .expect("clock thread starts");
    let controller = Arc::new(
        MotionController::new(Arc::clone(&device), DeviceConfig::default()).unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|n| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for k in 0..5 {
                    let target = (n * 5 + k) * 40 - 400;
                    ids.push(controller.move_to(target).unwrap());
                    controller.target_position().unwrap();
                    thread::sleep(Duration::from_micros(300));
                }
                ids
            })
        })
        .collect();

    let ids: Vec<MoveId> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("mover thread"))
        .collect();
    let unique: HashSet<MoveId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 20);

    let last = *ids.iter().max().unwrap();
    assert_eq!(last.get(), 19);

    let deadline = Instant::now() + Duration::from_secs(10);
    let record = loop {
        let record = controller.move_status(last, false).unwrap();
        if record.status.is_terminal() || Instant::now() > deadline {
            break record;
        }
        thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(record.status, MoveStatus::Done);
    assert!((controller.position().unwrap() - record.target).abs() <= 1);

    for id in ids.into_iter().filter(|id| *id != last) {
        let status = controller.move_status(id, true).unwrap().status;
        assert!(
            matches!(status, MoveStatus::Interrupted | MoveStatus::Done),
            "move {} ended {}",
            id,
            status
        );
    }
    controller.stop().unwrap();
}
