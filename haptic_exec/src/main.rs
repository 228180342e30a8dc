//! Main haptic drum executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Connect to the motor board, zero the encoder and enter torque control
//!     - Start the tracker client reading poses from standard input
//!     - Main loop, until interrupted or the tracker stream ends:
//!         - Haptic control processing
//!         - Actuator command
//!         - Trigger output on standard output
//!         - Telemetry readback and archiving
//!     - Zero the actuator
//!
//! Since standard output carries the triggers to the synthesiser, logs go to standard error.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use structopt::StructOpt;

// Internal
use haptic_if::{pose::PoseHandoff, trigger::TriggerWriter};
use haptic_lib::{
    actuator_driver::{ActuatorDriver, SerialTransport, SimTransport},
    ctrl_loop::ControlLoop,
    haptic_ctrl::HapticCtrl,
    params::HapticExecParams,
    tracker_client::TrackerClient,
};
use util::{
    archive::Archiver,
    logger::{logger_init, Console, LevelFilter},
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Drum haptics control loop.
///
/// Reads tracked pointer poses as JSON lines on standard input and writes drum triggers on
/// standard output.
#[derive(Debug, StructOpt)]
#[structopt(name = "haptic_exec")]
struct Opt {
    /// Parameter file, relative to the params directory
    #[structopt(long, default_value = "haptic_exec.toml")]
    params: String,

    /// Path to a parameter file anywhere, used instead of --params
    #[structopt(long, parse(from_os_str))]
    params_path: Option<PathBuf>,

    /// Serial port of the motor board, overriding the parameter file
    #[structopt(short, long)]
    port: Option<String>,

    /// Write per cycle telemetry to this CSV file instead of the session archive
    #[structopt(long, parse(from_os_str))]
    telemetry: Option<PathBuf>,

    /// Drive a simulated board instead of the serial port
    #[structopt(long)]
    sim: bool,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("haptic_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, Console::Stderr, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Haptic Drum Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let mut params: HapticExecParams = match opt.params_path {
        Some(ref p) => util::params::load_from_path(p),
        None => util::params::load(&opt.params),
    }
    .wrap_err("Could not load the executable parameters")?;

    if let Some(ref port) = opt.port {
        params.link.port = port.clone();
    }

    params
        .link
        .driver
        .are_valid()
        .wrap_err("Invalid actuator driver parameters")?;
    params
        .ctrl_loop
        .are_valid()
        .wrap_err("Invalid control loop parameters")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut haptic_ctrl = HapticCtrl::default();
    haptic_ctrl
        .init(params.haptic_ctrl.clone(), Some(&session))
        .wrap_err("Failed to initialise HapticCtrl")?;
    info!("HapticCtrl init complete");

    let telemetry = match opt.telemetry {
        Some(ref p) => Archiver::from_file(p),
        None => Archiver::from_path(&session, "haptic_telemetry.csv"),
    }
    .wrap_err("Failed to create the telemetry file")?;

    // ---- STOP HANDLING ----

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .wrap_err("Failed to set the signal handler")?;
    }

    // ---- TRACKER ----

    let handoff = PoseHandoff::new();
    let tracker = TrackerClient::spawn(
        BufReader::new(io::stdin()),
        handoff.clone(),
        Some(stop.clone()),
    );
    info!("TrackerClient started");

    // ---- ACTUATOR ----

    let result = if opt.sim {
        info!("Using a simulated motor board");
        let driver = ActuatorDriver::new(SimTransport::idle_board(), params.link.driver.clone());
        run(driver, &params, haptic_ctrl, handoff, telemetry, &stop)
    } else {
        let driver = ActuatorDriver::open(
            &params.link.port,
            params.link.baud_rate,
            params.link.driver.clone(),
        )
        .wrap_err("Failed to connect to the motor board")?;
        info!("Connected to the motor board on {}", params.link.port);

        run(driver, &params, haptic_ctrl, handoff, telemetry, &stop)
    };

    // ---- SHUTDOWN ----

    let num_parse_errors = tracker.num_parse_errors();
    if num_parse_errors > 0 {
        warn!("{} tracker lines could not be parsed", num_parse_errors);
    }

    // Standard input may still be open when interrupted, only wait for a finished tracker
    if tracker.is_running() {
        info!("Tracker stream still open, not waiting for it");
    } else {
        tracker.join();
        info!("Tracker stream ended");
    }

    if result.is_ok() {
        info!("End of execution");
    }

    result
}

/// Prepare the actuator and run the control loop until stopped.
fn run<T: SerialTransport>(
    mut driver: ActuatorDriver<T>,
    params: &HapticExecParams,
    haptic_ctrl: HapticCtrl,
    handoff: PoseHandoff,
    telemetry: Archiver,
    stop: &AtomicBool,
) -> Result<(), Report> {
    let axis = params.ctrl_loop.axis;

    driver
        .zero_encoder_position(axis, params.link.encoder_zero_offset_rev)
        .wrap_err("Failed to zero the encoder")?;

    // Mode changes are not acknowledged by the board, a failed write is not fatal as the board
    // may already be in the right mode.
    if let Err(e) = driver.set_closed_loop_control(axis) {
        warn!("Could not request closed loop control: {}", e);
    }
    if let Err(e) = driver.set_torque_control_mode(axis) {
        warn!("Could not set torque control mode: {}", e);
    }

    match driver.update_voltage() {
        Ok(v) => info!("Bus voltage: {:.2} V", v),
        Err(e) => warn!("Could not read the bus voltage: {}", e),
    }

    let mut ctrl_loop = ControlLoop::new(params.ctrl_loop.clone(), driver, haptic_ctrl, handoff)
        .with_triggers(TriggerWriter::stdout(params.trigger_format))
        .with_telemetry(telemetry);

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    ctrl_loop
        .run(stop)
        .wrap_err("Failed to zero the actuator on shutdown")?;

    let stats = ctrl_loop.stats();
    info!(
        "{} cycles, {} write errors, {} read errors",
        stats.num_cycles, stats.num_write_errors, stats.num_read_errors
    );

    Ok(())
}
