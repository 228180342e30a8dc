//! # Control loop
//!
//! Runs haptic control and the actuator driver at a fixed rate. Each cycle:
//!
//! - the latest pose is taken from the pose source, without waiting for the tracker,
//! - HapticCtrl computes the torque demand and any drum strikes,
//! - the torque is sent to the actuator, or the actuator is deactivated if there is no torque,
//! - strikes are written to the trigger stream,
//! - the actuator's encoder and current are read back and archived if requested.
//!
//! Failures of the actuator link are logged and the cycle carries on, the next cycle being the
//! retry. When the stop flag is raised the loop exits and sends a final zero torque.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use haptic_if::{eqpt::odrive::NUM_AXES, pose::PoseSource, trigger::TriggerWriter};
use util::{archive::Archiver, module::State, time::cycle_remainder};

use crate::{
    actuator_driver::{ActuatorDriver, DriverError, SerialTransport},
    haptic_ctrl::{self, HapticCtrl, TorqueDirection},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of attempts at the final zero torque command.
pub const SHUTDOWN_ZERO_ATTEMPTS: usize = 5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the control loop.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopParams {
    /// Actuator axis driven by the loop
    pub axis: usize,

    /// Target period of one cycle.
    ///
    /// Units: seconds
    #[serde(default = "default_cycle_period")]
    pub cycle_period_s: f64,

    /// Read the encoder and current back every cycle.
    #[serde(default)]
    pub read_telemetry: bool,
}

/// Counters kept by the loop.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct LoopStats {
    pub num_cycles: u64,
    pub num_consec_cycle_overruns: u64,
    pub num_write_errors: u64,
    pub num_consec_write_errors: u64,
    pub num_read_errors: u64,
    pub num_consec_read_errors: u64,
}

/// Summary of a single cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    /// Torque demanded by HapticCtrl
    pub torque_nm: f64,

    /// True if a command was written to the actuator
    pub command_sent: bool,

    /// Number of trigger lines written
    pub num_events: usize,

    /// HapticCtrl's report, `None` if processing failed
    pub ctrl_report: Option<haptic_ctrl::StatusReport>,
}

/// One row of the telemetry archive.
#[derive(Debug, Serialize)]
struct TelemetryRecord {
    time_s: f64,
    current_a: Option<f64>,
    torque_nm: f64,
    displacement_m: Option<f64>,
    encoder_pos_rev: Option<f64>,
    tip_speed_ms: f64,
}

/// The fixed rate control loop.
pub struct ControlLoop<T: SerialTransport, S: PoseSource, W: Write = io::Stdout> {
    params: LoopParams,

    driver: ActuatorDriver<T>,
    ctrl: HapticCtrl,
    pose_source: S,

    triggers: Option<TriggerWriter<W>>,
    telemetry: Option<Archiver>,

    start: Instant,
    stats: LoopStats,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum LoopParamsError {
    #[error("Axis {0} does not exist on the board")]
    InvalidAxis(usize),

    #[error("The cycle period must be a positive number of seconds, found {0}")]
    InvalidCyclePeriod(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LoopParams {
    pub fn are_valid(&self) -> Result<(), LoopParamsError> {
        if self.axis >= NUM_AXES {
            return Err(LoopParamsError::InvalidAxis(self.axis))
        }

        if !(self.cycle_period_s.is_finite() && self.cycle_period_s > 0.0) {
            return Err(LoopParamsError::InvalidCyclePeriod(self.cycle_period_s))
        }

        Ok(())
    }
}

impl<T: SerialTransport, S: PoseSource> ControlLoop<T, S, io::Stdout> {
    /// Create a loop with neither triggers nor telemetry.
    ///
    /// `ctrl` must already be initialised.
    pub fn new(params: LoopParams, driver: ActuatorDriver<T>, ctrl: HapticCtrl, pose_source: S) -> Self {
        Self {
            params,
            driver,
            ctrl,
            pose_source,
            triggers: None,
            telemetry: None,
            start: Instant::now(),
            stats: LoopStats::default(),
        }
    }
}

impl<T: SerialTransport, S: PoseSource, W: Write> ControlLoop<T, S, W> {
    /// Write drum strikes to `triggers`.
    pub fn with_triggers<V: Write>(self, triggers: TriggerWriter<V>) -> ControlLoop<T, S, V> {
        ControlLoop {
            params: self.params,
            driver: self.driver,
            ctrl: self.ctrl,
            pose_source: self.pose_source,
            triggers: Some(triggers),
            telemetry: self.telemetry,
            start: self.start,
            stats: self.stats,
        }
    }

    /// Archive one telemetry record per cycle.
    pub fn with_telemetry(mut self, archiver: Archiver) -> Self {
        self.telemetry = Some(archiver);
        self
    }

    pub fn driver(&self) -> &ActuatorDriver<T> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut ActuatorDriver<T> {
        &mut self.driver
    }

    pub fn ctrl(&self) -> &HapticCtrl {
        &self.ctrl
    }

    pub fn triggers(&self) -> Option<&TriggerWriter<W>> {
        self.triggers.as_ref()
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run one cycle.
    pub fn tick(&mut self) -> TickReport {
        let axis = self.params.axis;

        // ---- HAPTIC CONTROL ----

        let input = haptic_ctrl::InputData {
            pose: self.pose_source.latest_pose(),
            encoder_pos_rev: self.driver.state(axis).and_then(|s| s.encoder_pos_rev),
        };

        let (output, ctrl_report) = match self.ctrl.proc(&input) {
            Ok((o, r)) => (o, Some(r)),
            Err(e) => {
                warn!("Error during HapticCtrl processing: {}", e);
                (haptic_ctrl::OutputData::default(), None)
            }
        };

        // ---- ACTUATION ----

        let result = if output.torque_nm != 0.0 {
            self.driver
                .send_torque_command(axis, output.torque_nm)
                .map(|_| true)
        } else {
            self.driver.deactivate(axis)
        };

        let command_sent = match result {
            Ok(sent) => {
                self.stats.num_consec_write_errors = 0;
                sent
            }
            Err(e) => {
                self.stats.num_write_errors += 1;
                self.stats.num_consec_write_errors += 1;
                log_link_error(self.stats.num_consec_write_errors, "command the actuator", &e);
                false
            }
        };

        // ---- TRIGGERS ----

        let mut num_events = 0;
        if let Some(ref mut t) = self.triggers {
            for event in output.events.iter() {
                match t.send(event) {
                    Ok(()) => num_events += 1,
                    Err(e) => warn!("Could not write the trigger for drum {}: {}", event.target_id, e),
                }
            }
        }

        // ---- READBACK ----

        let needs_encoder = self.ctrl.params().torque_direction != TorqueDirection::Fixed;

        if self.params.read_telemetry || needs_encoder {
            self.read_back(axis);
        }

        // ---- ARCHIVE ----

        if let Some(ref mut arch) = self.telemetry {
            let state = self.driver.state(axis).copied().unwrap_or_default();

            let record = TelemetryRecord {
                time_s: self.start.elapsed().as_secs_f64(),
                current_a: state.current_a,
                torque_nm: output.torque_nm,
                displacement_m: output.displacement_m,
                encoder_pos_rev: state.encoder_pos_rev,
                tip_speed_ms: output.tip_speed_ms,
            };

            if let Err(e) = arch.serialise(record) {
                warn!("Could not archive telemetry: {}", e);
            }
        }

        self.stats.num_cycles += 1;

        TickReport {
            torque_nm: output.torque_nm,
            command_sent,
            num_events,
            ctrl_report,
        }
    }

    /// Run cycles until `stop` is raised, then zero the actuator.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), DriverError> {
        let period_s = self.params.cycle_period_s;

        info!("Beginning control loop at {:.1} Hz", 1.0 / period_s);

        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            self.tick();

            match cycle_remainder(period_s, cycle_start.elapsed()) {
                Ok(d) => {
                    self.stats.num_consec_cycle_overruns = 0;
                    thread::sleep(d);
                }
                Err(overrun_s) => {
                    warn!("Cycle overran by {:.06} s", overrun_s);
                    self.stats.num_consec_cycle_overruns += 1;
                }
            }
        }

        info!("Control loop stopped after {} cycles", self.stats.num_cycles);

        self.shutdown()
    }

    /// Send a zero torque, whatever was sent last, and flush the telemetry.
    ///
    /// The zero is retried up to [`SHUTDOWN_ZERO_ATTEMPTS`] times.
    pub fn shutdown(&mut self) -> Result<(), DriverError> {
        if let Some(ref mut arch) = self.telemetry {
            if let Err(e) = arch.flush() {
                warn!("Could not flush telemetry: {}", e);
            }
        }

        self.driver.zero_torque(self.params.axis, SHUTDOWN_ZERO_ATTEMPTS)?;
        info!("Actuator zeroed");
        Ok(())
    }

    fn read_back(&mut self, axis: usize) {
        let result = self
            .driver
            .update_encoder_readings(axis)
            .and_then(|_| self.driver.update_motor_current(axis));

        match result {
            Ok(current_a) => {
                self.stats.num_consec_read_errors = 0;
                trace!("Axis {} current {} A", axis, current_a);
            }
            Err(e) => {
                self.stats.num_read_errors += 1;
                self.stats.num_consec_read_errors += 1;
                log_link_error(self.stats.num_consec_read_errors, "read back the actuator", &e);
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Only the first error of a run of consecutive errors is a warning.
fn log_link_error(num_consec: u64, action: &str, e: &DriverError) {
    if num_consec == 1 {
        warn!("Could not {}: {}", action, e);
    } else {
        trace!("Could not {} ({} consecutive errors): {}", action, num_consec, e);
    }
}

fn default_cycle_period() -> f64 {
    1.0 / 500.0
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_loop_params_defaults() {
        let p: LoopParams = util::params::from_str("axis = 1\n").unwrap();

        assert_eq!(p.axis, 1);
        assert_eq!(p.cycle_period_s, 0.002);
        assert!(!p.read_telemetry);
        assert!(p.are_valid().is_ok());
    }

    #[test]
    fn test_loop_params_validation() {
        let p = |axis, cycle_period_s| LoopParams {
            axis,
            cycle_period_s,
            read_telemetry: false,
        };

        assert_eq!(p(2, 0.002).are_valid(), Err(LoopParamsError::InvalidAxis(2)));
        assert_eq!(
            p(0, -0.002).are_valid(),
            Err(LoopParamsError::InvalidCyclePeriod(-0.002))
        );
        assert!(matches!(
            p(0, f64::NAN).are_valid(),
            Err(LoopParamsError::InvalidCyclePeriod(_))
        ));
        assert!(p(0, 0.0).are_valid().is_err());
        assert!(p(1, 0.01).are_valid().is_ok());
    }
}
