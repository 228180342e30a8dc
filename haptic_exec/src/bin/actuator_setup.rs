//! Actuator setup tool.
//!
//! One-off operations on the motor board: calibration, entering torque control, idling, reading
//! the board's status and holding a constant torque for bench checks.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};
use color_eyre::{eyre::{eyre, WrapErr}, Report};
use log::{info, warn};
use structopt::StructOpt;

// Internal
use haptic_if::eqpt::odrive::{AxisRequestedState, ControlMode};
use haptic_lib::{
    actuator_driver::{ActuatorDriver, SerialPortTransport},
    ctrl_loop::SHUTDOWN_ZERO_ATTEMPTS,
    params::SetupParams,
};
use util::{
    logger::{logger_init, Console, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Interval between two polls of the axis state while calibrating.
const CALIBRATION_POLL_PERIOD: Duration = Duration::from_millis(500);

/// Interval between two torque commands while holding.
const HOLD_PERIOD: Duration = Duration::from_millis(20);

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Motor board setup operations.
#[derive(Debug, StructOpt)]
#[structopt(name = "actuator_setup")]
struct Opt {
    /// Parameter file holding the `[link]` table, relative to the params directory
    #[structopt(long, default_value = "haptic_exec.toml")]
    params: String,

    /// Path to a parameter file anywhere, used instead of --params
    #[structopt(long, parse(from_os_str))]
    params_path: Option<PathBuf>,

    /// Serial port of the motor board, overriding the parameter file
    #[structopt(short, long)]
    port: Option<String>,

    /// Axis to operate on
    #[structopt(short, long, default_value = "0")]
    axis: usize,

    #[structopt(subcommand)]
    cmd: SetupCmd,
}

#[derive(Debug, StructOpt)]
enum SetupCmd {
    /// Run the calibration sequence and wait for the axis to return to idle.
    #[structopt(name = "calibrate")]
    Calibrate {
        /// Only run the encoder offset calibration
        #[structopt(long)]
        offset_only: bool,

        /// Maximum time to wait for the calibration to finish
        #[structopt(long, default_value = "15")]
        wait_s: f64,
    },

    /// Enter closed loop control in torque mode.
    #[structopt(name = "torque-mode")]
    TorqueMode,

    /// Put the axis in idle.
    #[structopt(name = "idle")]
    Idle,

    /// Print the bus voltage, axis state, control mode, encoder and current.
    #[structopt(name = "status")]
    Status,

    /// Hold a constant torque until interrupted.
    #[structopt(name = "hold")]
    Hold {
        /// Torque to hold, in Newton meters
        torque_nm: f64,
    },
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let session = Session::new("actuator_setup", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Info, Console::Stdout, &session)
        .wrap_err("Failed to initialise logging")?;

    let mut params: SetupParams = match opt.params_path {
        Some(ref p) => util::params::load_from_path(p),
        None => util::params::load(&opt.params),
    }
    .wrap_err("Could not load the link parameters")?;

    if let Some(ref port) = opt.port {
        params.link.port = port.clone();
    }

    params.link.driver.are_valid().wrap_err("Invalid actuator driver parameters")?;

    let mut driver = ActuatorDriver::open(
        &params.link.port,
        params.link.baud_rate,
        params.link.driver.clone(),
    )
    .wrap_err("Failed to connect to the motor board")?;

    info!("Connected to the motor board on {}", params.link.port);

    let axis = opt.axis;

    match opt.cmd {
        SetupCmd::Calibrate { offset_only, wait_s } => calibrate(&mut driver, axis, offset_only, wait_s),
        SetupCmd::TorqueMode => {
            driver.set_closed_loop_control(axis)?;
            driver.set_torque_control_mode(axis)?;

            let mode = driver.read_control_mode(axis)?;
            info!("Axis {} control mode is now {:?}", axis, describe_mode(mode));
            Ok(())
        }
        SetupCmd::Idle => {
            driver.set_idle(axis)?;
            info!("Axis {} idle", axis);
            Ok(())
        }
        SetupCmd::Status => status(&mut driver, axis),
        SetupCmd::Hold { torque_nm } => hold(&mut driver, axis, torque_nm),
    }
}

fn calibrate(
    driver: &mut ActuatorDriver<SerialPortTransport>,
    axis: usize,
    offset_only: bool,
    wait_s: f64,
) -> Result<(), Report> {
    if offset_only {
        driver.run_encoder_offset_calibration(axis)?;
        info!("Encoder offset calibration started on axis {}", axis);
    } else {
        driver.run_full_calibration(axis)?;
        info!("Full calibration started on axis {}", axis);
    }

    let start = Instant::now();

    // Give the board time to leave idle before polling
    thread::sleep(CALIBRATION_POLL_PERIOD);

    while start.elapsed().as_secs_f64() < wait_s {
        match driver.read_current_state(axis) {
            Ok(code) if AxisRequestedState::from_code(code) == Some(AxisRequestedState::Idle) => {
                info!("Calibration complete after {:.1} s", start.elapsed().as_secs_f64());
                return Ok(())
            }
            Ok(code) => info!("Axis {} in state {}", axis, code),
            Err(e) => warn!("Could not read the axis state: {}", e),
        }

        thread::sleep(CALIBRATION_POLL_PERIOD);
    }

    Err(eyre!("Axis {} did not return to idle within {} s", axis, wait_s))
}

fn status(driver: &mut ActuatorDriver<SerialPortTransport>, axis: usize) -> Result<(), Report> {
    let vbus_v = driver.update_voltage()?;
    let state = driver.read_current_state(axis)?;
    let mode = driver.read_control_mode(axis)?;
    let (pos_rev, vel_revs) = driver.update_encoder_readings(axis)?;
    let current_a = driver.update_motor_current(axis)?;

    info!("Bus voltage:     {:.2} V", vbus_v);
    info!(
        "Axis {} state:    {} ({:?})",
        axis,
        state,
        AxisRequestedState::from_code(state)
    );
    info!("Control mode:    {} ({:?})", mode, describe_mode(mode));
    info!("Encoder:         {:.4} rev, {:.4} rev/s (raw, not zeroed)", pos_rev, vel_revs);
    info!("Phase current:   {:.3} A", current_a);

    Ok(())
}

fn hold(
    driver: &mut ActuatorDriver<SerialPortTransport>,
    axis: usize,
    torque_nm: f64,
) -> Result<(), Report> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .wrap_err("Failed to set the signal handler")?;
    }

    let sent_nm = driver.send_torque_command(axis, torque_nm)?;
    if sent_nm != torque_nm {
        warn!("Torque limited to {} Nm", sent_nm);
    }
    info!("Holding {} Nm on axis {}, interrupt to stop", sent_nm, axis);

    while !stop.load(Ordering::Relaxed) {
        if let Err(e) = driver.send_torque_command(axis, torque_nm) {
            warn!("Could not command the actuator: {}", e);
        }

        thread::sleep(HOLD_PERIOD);
    }

    driver.zero_torque(axis, SHUTDOWN_ZERO_ATTEMPTS)?;
    info!("Actuator zeroed");

    Ok(())
}

fn describe_mode(code: i64) -> Option<ControlMode> {
    ControlMode::from_code(code)
}
