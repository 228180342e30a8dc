//! Encoder spring executable.
//!
//! Renders a virtual wall on the actuator's own shaft: turning the shaft past the wall angle
//! engages a spring pushing it back. No tracking is involved, which makes this the simplest way
//! to check the motor board, the encoder and the torque sign.

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
use std::time::Instant;
use color_eyre::{eyre::WrapErr, Report};
use log::{info, trace, warn};
use serde::Serialize;
use structopt::StructOpt;

// Internal
use haptic_lib::{
    actuator_driver::{ActuatorDriver, SerialTransport, SimTransport},
    contact::RotarySpring,
    ctrl_loop::SHUTDOWN_ZERO_ATTEMPTS,
    params::EncoderSpringParams,
};
use util::{
    archive::Archiver,
    logger::{logger_init, Console, LevelFilter},
    maths::rev_to_deg,
    session::Session,
    time::cycle_remainder,
};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// Virtual wall on the actuator's encoder.
#[derive(Debug, StructOpt)]
#[structopt(name = "encoder_spring")]
struct Opt {
    /// Parameter file, relative to the params directory
    #[structopt(long, default_value = "encoder_spring.toml")]
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

#[derive(Serialize)]
struct SpringRecord {
    time_s: f64,
    current_a: Option<f64>,
    torque_nm: f64,
    displacement_deg: Option<f64>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let session = Session::new("encoder_spring", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, Console::Stdout, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("Encoder Spring Executable\n");

    let mut params: EncoderSpringParams = match opt.params_path {
        Some(ref p) => util::params::load_from_path(p),
        None => util::params::load(&opt.params),
    }
    .wrap_err("Could not load the executable parameters")?;

    if let Some(ref port) = opt.port {
        params.link.port = port.clone();
    }

    params.link.driver.are_valid().wrap_err("Invalid actuator driver parameters")?;
    params.spring.are_valid().wrap_err("Invalid spring parameters")?;
    params.are_valid().wrap_err("Invalid encoder spring parameters")?;

    let telemetry = match opt.telemetry {
        Some(ref p) => Archiver::from_file(p),
        None => Archiver::from_path(&session, "encoder_spring.csv"),
    }
    .wrap_err("Failed to create the telemetry file")?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .wrap_err("Failed to set the signal handler")?;
    }

    if opt.sim {
        let driver = ActuatorDriver::new(SimTransport::idle_board(), params.link.driver.clone());
        run(driver, &params, telemetry, &stop)
    } else {
        let driver = ActuatorDriver::open(
            &params.link.port,
            params.link.baud_rate,
            params.link.driver.clone(),
        )
        .wrap_err("Failed to connect to the motor board")?;

        run(driver, &params, telemetry, &stop)
    }
}

fn run<T: SerialTransport>(
    mut driver: ActuatorDriver<T>,
    params: &EncoderSpringParams,
    mut telemetry: Archiver,
    stop: &AtomicBool,
) -> Result<(), Report> {
    let axis = params.axis;
    let spring = RotarySpring::new(params.spring.clone());
    let period_s = params.cycle_period_s();

    driver
        .zero_encoder_position(axis, params.link.encoder_zero_offset_rev)
        .wrap_err("Failed to zero the encoder")?;
    driver
        .set_closed_loop_control(axis)
        .wrap_err("Failed to request closed loop control")?;
    driver
        .set_torque_control_mode(axis)
        .wrap_err("Failed to set torque control mode")?;

    info!(
        "Wall at {:.1} deg, running at {:.0} Hz",
        rev_to_deg(spring.params().wall_rev),
        params.cycle_frequency_hz
    );

    let start = Instant::now();
    let mut num_consec_read_errors = 0u64;

    while !stop.load(Ordering::Relaxed) {
        let cycle_start = Instant::now();
        let mut torque_nm = 0.0;
        let mut displacement_deg = None;

        match driver.update_encoder_readings(axis) {
            Ok((pos_rev, vel_revs)) => {
                num_consec_read_errors = 0;
                displacement_deg = Some(rev_to_deg(pos_rev - spring.params().wall_rev));

                match spring.command(pos_rev, vel_revs) {
                    Some(t) => {
                        match driver.send_torque_command(axis, t) {
                            Ok(sent) => torque_nm = sent,
                            Err(e) => warn!("Could not command the actuator: {}", e),
                        }

                        match driver.update_motor_current(axis) {
                            Ok(current_a) if current_a.abs() >= params.current_warn_limit_a => warn!(
                                "Current limit reached: {:.3} A for a demand of {:.3} Nm",
                                current_a, torque_nm
                            ),
                            Ok(_) => (),
                            Err(e) => trace!("Could not read the current: {}", e),
                        }
                    }
                    None => match driver.deactivate(axis) {
                        // Request closed loop again in case a fault dropped the axis out of it
                        Ok(true) => {
                            if let Err(e) = driver.set_closed_loop_control(axis) {
                                warn!("Could not request closed loop control: {}", e);
                            }
                        }
                        Ok(false) => (),
                        Err(e) => warn!("Could not deactivate the spring: {}", e),
                    },
                }
            }
            Err(e) => {
                num_consec_read_errors += 1;
                if num_consec_read_errors == 1 {
                    warn!("Could not read the encoder: {}", e);
                }
            }
        }

        let record = SpringRecord {
            time_s: start.elapsed().as_secs_f64(),
            current_a: driver.state(axis).and_then(|s| s.current_a),
            torque_nm,
            displacement_deg,
        };

        if let Err(e) = telemetry.serialise(record) {
            warn!("Could not archive telemetry: {}", e);
        }

        match cycle_remainder(period_s, cycle_start.elapsed()) {
            Ok(d) => thread::sleep(d),
            Err(overrun_s) => warn!("Cycle overran by {:.06} s", overrun_s),
        }
    }

    if let Err(e) = telemetry.flush() {
        warn!("Could not flush telemetry: {}", e);
    }

    driver
        .zero_torque(axis, SHUTDOWN_ZERO_ATTEMPTS)
        .wrap_err("Failed to zero the actuator on shutdown")?;

    info!("End of execution");

    Ok(())
}
