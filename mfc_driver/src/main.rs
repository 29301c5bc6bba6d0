//! # MFC Driver Binary
//!
//! Command-line front end for the focus drive. Runs against the simulated
//! module, ticked in the background at the configured rate.
//!
//! Configuration is read from `/etc/mfc/mfc.toml` unless `--config` names
//! another file. A missing file means built-in defaults.
//!
//! # Usage
//!
//! ```bash
//! # Move to encoder position 5000 and wait for the outcome
//! mfc move 5000
//!
//! # Same, with an explicit configuration file
//! mfc --config ./mfc.toml move 5000
//!
//! # Rotate for two seconds, then stop
//! mfc rotate -- -400 --duration-ms 2000
//!
//! # Print the profile program listing
//! mfc program
//!
//! # Verbose JSON logs
//! mfc -v --json move 0
//! ```

use clap::{Parser, Subcommand};
use mfc_common::config::DriverConfig;
use mfc_common::tmcl::consts::{DEFAULT_CONFIG_PATH, DRIVER_SERVICE_NAME};
use mfc_driver::profile::profile_program;
use mfc_driver::{MotionController, MoveStatus, SimulatedDevice};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Poll interval while waiting for a move to finish
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// MFC - Motorized focus controller driver
#[derive(Parser, Debug)]
#[command(name = "mfc")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Host-side driver for a TMCM-140 focus drive")]
#[command(long_about = None)]
struct Args {
    /// Path to configuration file. Defaults apply when the file is missing.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs and results in JSON format
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move to an encoder position and wait for the outcome
    Move {
        /// Target encoder position
        #[arg(allow_hyphen_values = true)]
        position: i32,

        /// Give up waiting after this many milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },
    /// Rotate at constant speed, then stop
    Rotate {
        /// Speed; positive values turn right
        #[arg(allow_hyphen_values = true)]
        speed: i32,

        /// Rotation time in milliseconds
        #[arg(long, default_value_t = 1_000)]
        duration_ms: u64,
    },
    /// Print the profile program listing
    Program,
}

/// Final report of a command.
#[derive(Debug, Serialize)]
struct Report {
    command: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<MoveStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<i32>,
    position: i32,
    elapsed_ms: u128,
}

fn main() {
    if let Err(e) = run() {
        error!("{} failed: {}", DRIVER_SERVICE_NAME, e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, from_file) = DriverConfig::load_or_default(&args.config)?;

    setup_tracing(&args, &config);
    if from_file {
        debug!("Configuration loaded from {}", args.config.display());
    } else {
        debug!("{} not found, using defaults", args.config.display());
    }

    if let Command::Program = args.command {
        print!("{}", profile_program()?);
        return Ok(());
    }

    info!(
        "{} v{} starting (simulated module)",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let device = Arc::new(SimulatedDevice::from_config(&config.simulation));
    let mut clock = device.spawn_clock(Duration::from_micros(config.simulation.tick_us))?;
    let controller = Arc::new(MotionController::new(
        Arc::clone(&device),
        config.device.clone(),
    )?);

    // Setup signal handler.
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let controller = Arc::clone(&controller);
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            interrupted.store(true, Ordering::SeqCst);
            if let Err(e) = controller.stop() {
                warn!("Stop on shutdown failed: {}", e);
            }
        })?;
    }

    let started = Instant::now();
    let report = match args.command {
        Command::Move {
            position,
            timeout_ms,
        } => {
            let id = controller.move_to(position)?;
            let deadline = started + Duration::from_millis(timeout_ms);
            let record = loop {
                let record = controller.move_status(id, true)?;
                if record.status.is_terminal() {
                    break record;
                }
                if interrupted.load(Ordering::SeqCst) || Instant::now() >= deadline {
                    warn!("Move {} still moving, stopping", id);
                    controller.stop()?;
                    break controller.move_status(id, true)?;
                }
                thread::sleep(POLL_INTERVAL);
            };
            Report {
                command: "move",
                id: Some(record.id.get()),
                status: Some(record.status),
                target: Some(record.target),
                position: controller.position()?,
                elapsed_ms: started.elapsed().as_millis(),
            }
        }
        Command::Rotate { speed, duration_ms } => {
            controller.rotate(speed)?;
            let deadline = started + Duration::from_millis(duration_ms);
            while Instant::now() < deadline && !interrupted.load(Ordering::SeqCst) {
                thread::sleep(POLL_INTERVAL);
            }
            controller.stop()?;
            Report {
                command: "rotate",
                id: None,
                status: None,
                target: None,
                position: controller.position()?,
                elapsed_ms: started.elapsed().as_millis(),
            }
        }
        Command::Program => return Ok(()),
    };

    clock.stop();
    print_report(&report, args.json)?;
    info!("{} shutdown complete", config.shared.service_name);
    Ok(())
}

/// Print the final report as text or JSON.
fn print_report(report: &Report, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    match (report.id, report.status, report.target) {
        (Some(id), Some(status), Some(target)) => println!(
            "move {}: {} (target {}, position {}, {} ms)",
            id, status, target, report.position, report.elapsed_ms
        ),
        _ => println!(
            "{}: position {} ({} ms)",
            report.command, report.position, report.elapsed_ms
        ),
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and configuration.
fn setup_tracing(args: &Args, config: &DriverConfig) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.shared.log_level.as_directive()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
