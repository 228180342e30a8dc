//! # Actuator driver state
//!
//! The driver is a thin request/response client: every operation writes one command line and, for
//! queries, waits a bounded time for exactly one response line. There are no retries here, a
//! failed read is reported to the caller which simply tries again on its next cycle. Failed reads
//! never modify the stored [`ActuatorState`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::thread;

use log::{debug, trace, warn};
use serde::Serialize;
use thiserror::Error;

// Internal
use haptic_if::eqpt::odrive::{
    self, AxisRequestedState, Command, ControlMode, Property, ResponseError, NUM_AXES,
};
use util::maths::clamp;
use super::{Params, SerialOptions, SerialPortTransport, SerialTransport, TransportError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Last known state of one axis.
///
/// Every field is `None` until it has been read (or sent) successfully once.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct ActuatorState {
    /// Encoder position relative to the zero reference.
    ///
    /// Units: revolutions
    pub encoder_pos_rev: Option<f64>,

    /// Encoder velocity.
    ///
    /// Units: revolutions/second
    pub encoder_vel_revs: Option<f64>,

    /// Measured phase current.
    ///
    /// Units: amps
    pub current_a: Option<f64>,

    /// Last torque successfully written to the board.
    ///
    /// Units: Newton meters
    pub last_torque_nm: Option<f64>,
}

/// Driver for the motor board.
pub struct ActuatorDriver<T: SerialTransport> {
    transport: T,
    params: Params,

    axes: [ActuatorState; NUM_AXES],

    /// Raw encoder reading which is reported as zero, per axis
    encoder_zero_rev: [f64; NUM_AXES],

    vbus_voltage_v: Option<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Could not connect to the board on {port}: {source}")]
    Connection {
        port: String,
        source: TransportError,
    },

    #[error("Invalid response to {command:?}: {source}")]
    Protocol {
        command: String,
        source: ResponseError,
    },

    #[error("No response to {0:?} within the read timeout")]
    ReadTimeout(String),

    #[error("Could not write {0:?} within the write timeout")]
    WriteTimeout(String),

    #[error("Transport error: {0}")]
    Transport(TransportError),

    #[error("Axis {0} does not exist on the board")]
    InvalidAxis(usize),

    #[error("Cannot send a non-finite torque ({0})")]
    InvalidTorque(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ActuatorDriver<SerialPortTransport> {
    /// Open the serial port connected to the board.
    pub fn open(port: &str, baud_rate: u32, params: Params) -> Result<Self, DriverError> {
        let options = SerialOptions {
            timeout: params.write_timeout(),
            ..Default::default()
        };

        let transport = SerialPortTransport::open(port, baud_rate, options).map_err(|e| {
            DriverError::Connection {
                port: port.to_string(),
                source: e,
            }
        })?;

        debug!("Opened {} at {} baud", port, baud_rate);

        Ok(Self::new(transport, params))
    }
}

impl<T: SerialTransport> ActuatorDriver<T> {
    /// Create a driver over an already open transport.
    pub fn new(transport: T, params: Params) -> Self {
        Self {
            transport,
            params,
            axes: [ActuatorState::default(); NUM_AXES],
            encoder_zero_rev: [0.0; NUM_AXES],
            vbus_voltage_v: None,
        }
    }

    // ---- STATE ACCESS ----

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Last known state of an axis, or `None` if the axis doesn't exist.
    pub fn state(&self, axis: usize) -> Option<&ActuatorState> {
        self.axes.get(axis)
    }

    /// Last known bus voltage.
    pub fn vbus_voltage_v(&self) -> Option<f64> {
        self.vbus_voltage_v
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ---- READS ----

    /// Set the zero reference of an axis's encoder.
    ///
    /// The reference is taken so that the current encoder position is reported as `offset_rev`.
    /// Returns the raw position read from the board.
    pub fn zero_encoder_position(
        &mut self,
        axis: usize,
        offset_rev: f64,
    ) -> Result<f64, DriverError> {
        let (raw_pos_rev, vel_revs) = self.read_feedback(axis)?;

        self.encoder_zero_rev[axis] = raw_pos_rev - offset_rev;
        self.axes[axis].encoder_pos_rev = Some(offset_rev);
        self.axes[axis].encoder_vel_revs = Some(vel_revs);

        debug!(
            "Axis {} encoder zeroed at raw position {} rev (offset {} rev)",
            axis, raw_pos_rev, offset_rev
        );

        Ok(raw_pos_rev)
    }

    /// Read the position and velocity of an axis's encoder.
    ///
    /// Returns the zero referenced position and the velocity. Both values are stored together or
    /// not at all.
    pub fn update_encoder_readings(&mut self, axis: usize) -> Result<(f64, f64), DriverError> {
        let (raw_pos_rev, vel_revs) = self.read_feedback(axis)?;
        let pos_rev = raw_pos_rev - self.encoder_zero_rev[axis];

        self.axes[axis].encoder_pos_rev = Some(pos_rev);
        self.axes[axis].encoder_vel_revs = Some(vel_revs);

        Ok((pos_rev, vel_revs))
    }

    /// Read the measured phase current of an axis.
    pub fn update_motor_current(&mut self, axis: usize) -> Result<f64, DriverError> {
        self.check_axis(axis)?;

        let current_a = self.read_scalar(Property::IqMeasured(axis))?;
        self.axes[axis].current_a = Some(current_a);

        Ok(current_a)
    }

    /// Read the board's bus voltage.
    pub fn update_voltage(&mut self) -> Result<f64, DriverError> {
        let vbus_v = self.read_scalar(Property::VbusVoltage)?;
        self.vbus_voltage_v = Some(vbus_v);

        Ok(vbus_v)
    }

    /// Read the integer code of the state an axis is currently in.
    pub fn read_current_state(&mut self, axis: usize) -> Result<i64, DriverError> {
        self.check_axis(axis)?;
        self.read_integer(Property::CurrentState(axis))
    }

    /// Read the integer code of an axis's control mode.
    pub fn read_control_mode(&mut self, axis: usize) -> Result<i64, DriverError> {
        self.check_axis(axis)?;
        self.read_integer(Property::ControlMode(axis))
    }

    // ---- COMMANDS ----

    /// Send a torque demand to an axis.
    ///
    /// The demand is clamped to the driver's torque limit. Returns the torque actually sent.
    pub fn send_torque_command(&mut self, axis: usize, torque_nm: f64) -> Result<f64, DriverError> {
        self.check_axis(axis)?;

        if !torque_nm.is_finite() {
            return Err(DriverError::InvalidTorque(torque_nm))
        }

        let limit = self.params.torque_limit_nm;
        let torque_nm = clamp(&torque_nm, &-limit, &limit);

        self.send(&Command::SetTorque { axis, torque_nm })?;
        self.axes[axis].last_torque_nm = Some(torque_nm);

        trace!("Axis {} torque set to {} Nm", axis, torque_nm);

        Ok(torque_nm)
    }

    /// Remove any torque on an axis.
    ///
    /// A zero is only written if the last command sent was not already a zero, so this can be
    /// called every cycle. Returns true if a command was written.
    pub fn deactivate(&mut self, axis: usize) -> Result<bool, DriverError> {
        self.check_axis(axis)?;

        if self.axes[axis].last_torque_nm == Some(0.0) {
            return Ok(false)
        }

        self.send_torque_command(axis, 0.0)?;
        Ok(true)
    }

    /// Send a zero torque, trying up to `max_attempts` times.
    ///
    /// Used when stopping, where the zero must get through even if the link is briefly busy.
    /// Attempts are one write timeout apart. Returns the error of the last attempt if none
    /// succeeded.
    pub fn zero_torque(&mut self, axis: usize, max_attempts: usize) -> Result<(), DriverError> {
        let mut attempt = 1;

        loop {
            match self.send_torque_command(axis, 0.0) {
                Ok(_) => return Ok(()),
                Err(e @ DriverError::InvalidAxis(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Could not zero axis {} (attempt {} of {}): {}",
                        axis, attempt, max_attempts, e
                    );

                    if attempt >= max_attempts {
                        return Err(e)
                    }
                }
            }

            attempt += 1;
            thread::sleep(self.params.write_timeout());
        }
    }

    /// Request a state of an axis.
    ///
    /// Success only means the command was written, not that the board entered the state.
    pub fn set_axis_state(
        &mut self,
        axis: usize,
        state: AxisRequestedState,
    ) -> Result<(), DriverError> {
        self.check_axis(axis)?;
        self.send(&Command::Write(Property::RequestedState(axis), state.code()))?;
        debug!("Axis {} requested state {:?}", axis, state);
        Ok(())
    }

    /// Set the controller mode of an axis.
    pub fn set_control_mode(&mut self, axis: usize, mode: ControlMode) -> Result<(), DriverError> {
        self.check_axis(axis)?;
        self.send(&Command::Write(Property::ControlMode(axis), mode.code()))?;
        debug!("Axis {} control mode set to {:?}", axis, mode);
        Ok(())
    }

    pub fn set_closed_loop_control(&mut self, axis: usize) -> Result<(), DriverError> {
        self.set_axis_state(axis, AxisRequestedState::ClosedLoopControl)
    }

    pub fn set_torque_control_mode(&mut self, axis: usize) -> Result<(), DriverError> {
        self.set_control_mode(axis, ControlMode::Torque)
    }

    pub fn run_full_calibration(&mut self, axis: usize) -> Result<(), DriverError> {
        self.set_axis_state(axis, AxisRequestedState::FullCalibrationSequence)
    }

    pub fn run_encoder_offset_calibration(&mut self, axis: usize) -> Result<(), DriverError> {
        self.set_axis_state(axis, AxisRequestedState::EncoderOffsetCalibration)
    }

    pub fn set_idle(&mut self, axis: usize) -> Result<(), DriverError> {
        self.set_axis_state(axis, AxisRequestedState::Idle)
    }

    // ---- PRIVATE ----

    fn check_axis(&self, axis: usize) -> Result<(), DriverError> {
        if axis < NUM_AXES {
            Ok(())
        } else {
            Err(DriverError::InvalidAxis(axis))
        }
    }

    fn read_feedback(&mut self, axis: usize) -> Result<(f64, f64), DriverError> {
        self.check_axis(axis)?;

        let cmd = Command::Feedback { axis };
        let line = self.query(&cmd)?;

        odrive::parse_feedback(&line).map_err(|e| protocol_error(&cmd, e))
    }

    fn read_scalar(&mut self, property: Property) -> Result<f64, DriverError> {
        let cmd = Command::Read(property);
        let line = self.query(&cmd)?;

        odrive::parse_scalar(&line).map_err(|e| protocol_error(&cmd, e))
    }

    fn read_integer(&mut self, property: Property) -> Result<i64, DriverError> {
        let cmd = Command::Read(property);
        let line = self.query(&cmd)?;

        odrive::parse_integer(&line).map_err(|e| protocol_error(&cmd, e))
    }

    /// Write a command line.
    fn send(&mut self, cmd: &Command) -> Result<(), DriverError> {
        let line = cmd.to_line();

        match self.transport.write(line.as_bytes(), self.params.write_timeout()) {
            Ok(n) if n == line.len() => Ok(()),
            Ok(n) => Err(DriverError::Transport(TransportError::IncompleteWrite {
                written: n,
                expected: line.len(),
            })),
            Err(TransportError::Timeout) => Err(DriverError::WriteTimeout(command_str(cmd))),
            Err(e) => Err(DriverError::Transport(e)),
        }
    }

    /// Write a query and get its single line response.
    fn query(&mut self, cmd: &Command) -> Result<String, DriverError> {
        // Drop anything left over from an earlier query which timed out, otherwise it would be
        // taken as the response to this one.
        self.transport.clear_input().map_err(DriverError::Transport)?;

        self.send(cmd)?;

        let timeout = self.params.read_timeout();

        if !self.transport.wait_for_data(timeout) {
            return Err(DriverError::ReadTimeout(command_str(cmd)))
        }

        match self.transport.read_line(timeout) {
            Ok(line) => Ok(line),
            Err(TransportError::Timeout) => Err(DriverError::ReadTimeout(command_str(cmd))),
            Err(e) => Err(DriverError::Transport(e)),
        }
    }
}

fn command_str(cmd: &Command) -> String {
    cmd.to_line().trim_end().to_string()
}

fn protocol_error(cmd: &Command, source: ResponseError) -> DriverError {
    DriverError::Protocol {
        command: command_str(cmd),
        source,
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
