//! # ODrive ASCII Protocol
//!
//! Commands and responses for the ODrive motor board's line based ASCII protocol. Every command is
//! a single line terminated by a line feed, queries are answered with exactly one line.
//!
//! | Command              | Line                        | Response              |
//! |----------------------|-----------------------------|-----------------------|
//! | Set torque           | `c <axis> <torque>`         | none                  |
//! | Request feedback     | `f <axis>`                  | `<position> <velocity>` |
//! | Read a property      | `r <path>`                  | `<value>`             |
//! | Write a property     | `w <path> <value>`          | none                  |

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of axes (motor channels) on the board.
pub const NUM_AXES: usize = 2;

/// Terminator appended to every command line.
pub const LINE_TERMINATOR: char = '\n';

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// States which can be requested of an axis through `axis<N>.requested_state`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisRequestedState {
    Idle,
    FullCalibrationSequence,
    EncoderOffsetCalibration,
    ClosedLoopControl,
}

/// Controller modes set through `axis<N>.controller.config.control_mode`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Voltage,
    Torque,
    Velocity,
    Position,
}

/// Named board properties which can be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    /// DC bus voltage, volts
    VbusVoltage,

    /// Measured phase (quadrature) current of an axis, amps
    IqMeasured(usize),

    /// State requested of an axis
    RequestedState(usize),

    /// State the axis is currently in
    CurrentState(usize),

    /// Control mode of an axis's controller
    ControlMode(usize),
}

/// A single command line sent to the board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Set the torque setpoint of an axis, in N.m
    SetTorque { axis: usize, torque_nm: f64 },

    /// Request the position (rev) and velocity (rev/s) of an axis's encoder
    Feedback { axis: usize },

    /// Read a property
    Read(Property),

    /// Write an integer value to a property
    Write(Property, i64),
}

/// Errors raised when a response line cannot be interpreted.
#[derive(Debug, Error, PartialEq)]
pub enum ResponseError {
    #[error("No data was received")]
    Empty,

    #[error("Response does not start with a numeric character: {0:?}")]
    NotNumeric(String),

    #[error("Expected {expected} fields in response but found {found}: {line:?}")]
    WrongFieldCount {
        expected: usize,
        found: usize,
        line: String,
    },

    #[error("Could not parse {0:?} as a number")]
    ParseError(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl AxisRequestedState {
    /// The integer code used on the wire.
    pub fn code(self) -> i64 {
        match self {
            AxisRequestedState::Idle => 1,
            AxisRequestedState::FullCalibrationSequence => 3,
            AxisRequestedState::EncoderOffsetCalibration => 7,
            AxisRequestedState::ClosedLoopControl => 8,
        }
    }

    /// Get the state from a wire code, or `None` if the code is not one we request.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(AxisRequestedState::Idle),
            3 => Some(AxisRequestedState::FullCalibrationSequence),
            7 => Some(AxisRequestedState::EncoderOffsetCalibration),
            8 => Some(AxisRequestedState::ClosedLoopControl),
            _ => None,
        }
    }
}

impl ControlMode {
    /// The integer code used on the wire.
    pub fn code(self) -> i64 {
        match self {
            ControlMode::Voltage => 0,
            ControlMode::Torque => 1,
            ControlMode::Velocity => 2,
            ControlMode::Position => 3,
        }
    }

    /// Get the mode from a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ControlMode::Voltage),
            1 => Some(ControlMode::Torque),
            2 => Some(ControlMode::Velocity),
            3 => Some(ControlMode::Position),
            _ => None,
        }
    }
}

impl Property {
    /// The dotted path of the property on the board.
    pub fn path(&self) -> String {
        match self {
            Property::VbusVoltage => String::from("vbus_voltage"),
            Property::IqMeasured(axis) => {
                format!("axis{}.motor.current_control.Iq_measured", axis)
            }
            Property::RequestedState(axis) => format!("axis{}.requested_state", axis),
            Property::CurrentState(axis) => format!("axis{}.current_state", axis),
            Property::ControlMode(axis) => {
                format!("axis{}.controller.config.control_mode", axis)
            }
        }
    }
}

impl Command {
    /// Build the terminated line for this command.
    pub fn to_line(&self) -> String {
        let mut line = match self {
            Command::SetTorque { axis, torque_nm } => format!("c {} {}", axis, torque_nm),
            Command::Feedback { axis } => format!("f {}", axis),
            Command::Read(p) => format!("r {}", p.path()),
            Command::Write(p, v) => format!("w {} {}", p.path(), v),
        };
        line.push(LINE_TERMINATOR);
        line
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check that a response line looks numeric.
///
/// A valid response starts with a decimal digit, a sign or a decimal point. Anything else (for
/// example the board's `invalid property` or `unknown command` replies) is rejected.
pub fn is_valid_response(line: &str) -> bool {
    match line.trim_start().chars().next() {
        Some(c) => c.is_ascii_digit() || c == '-' || c == '+' || c == '.',
        None => false,
    }
}

/// Parse a single numeric value from a response line.
pub fn parse_scalar(line: &str) -> Result<f64, ResponseError> {
    let fields = split_fields(line, 1)?;
    parse_field(fields[0])
}

/// Parse a single integer value from a response line.
pub fn parse_integer(line: &str) -> Result<i64, ResponseError> {
    let fields = split_fields(line, 1)?;
    fields[0]
        .parse::<i64>()
        .map_err(|_| ResponseError::ParseError(fields[0].to_string()))
}

/// Parse a feedback response, `<position> <velocity>`.
///
/// Both fields must parse for the response to be accepted.
pub fn parse_feedback(line: &str) -> Result<(f64, f64), ResponseError> {
    let fields = split_fields(line, 2)?;
    Ok((parse_field(fields[0])?, parse_field(fields[1])?))
}

fn split_fields(line: &str, expected: usize) -> Result<Vec<&str>, ResponseError> {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return Err(ResponseError::Empty);
    }

    if !is_valid_response(trimmed) {
        return Err(ResponseError::NotNumeric(trimmed.to_string()));
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();

    if fields.len() != expected {
        return Err(ResponseError::WrongFieldCount {
            expected,
            found: fields.len(),
            line: trimmed.to_string(),
        });
    }

    Ok(fields)
}

fn parse_field(field: &str) -> Result<f64, ResponseError> {
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ResponseError::ParseError(field.to_string())),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
