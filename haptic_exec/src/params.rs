//! # Executable Parameters
//!
//! Parameter files for the haptic executables. Every executable talks to the motor board so they
//! all share the `[link]` table.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

use haptic_if::{eqpt::odrive::NUM_AXES, trigger::TriggerFormat};

use crate::{actuator_driver, contact::RotarySpringParams, ctrl_loop::LoopParams, haptic_ctrl};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Serial link to the motor board.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkParams {
    /// Path to the serial port, e.g. `/dev/ttyACM0`
    pub port: String,

    pub baud_rate: u32,

    /// Position reported by the encoder once zeroed at startup.
    ///
    /// Units: revolutions
    #[serde(default)]
    pub encoder_zero_offset_rev: f64,

    pub driver: actuator_driver::Params,
}

/// Parameters of the `haptic_exec` executable.
#[derive(Debug, Clone, Deserialize)]
pub struct HapticExecParams {
    pub link: LinkParams,

    pub ctrl_loop: LoopParams,

    /// Format of the trigger lines written to standard output
    #[serde(default)]
    pub trigger_format: TriggerFormat,

    pub haptic_ctrl: haptic_ctrl::Params,
}

/// Parameters of the `encoder_spring` executable.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSpringParams {
    pub link: LinkParams,

    pub axis: usize,

    /// Units: Hertz
    pub cycle_frequency_hz: f64,

    /// Measured current above which a warning is issued.
    ///
    /// Units: amps
    pub current_warn_limit_a: f64,

    pub spring: RotarySpringParams,
}

/// Parameters of the `actuator_setup` executable, read from any file with a `[link]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct SetupParams {
    pub link: LinkParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum EncoderSpringParamsError {
    #[error("Axis {0} does not exist on the board")]
    InvalidAxis(usize),

    #[error("The cycle frequency must be a positive number of Hertz, found {0}")]
    InvalidCycleFrequency(f64),

    #[error("The current warning limit must be positive, found {0}")]
    InvalidCurrentLimit(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EncoderSpringParams {
    /// Check the loop settings. The spring and the link are checked by their own parameters.
    pub fn are_valid(&self) -> Result<(), EncoderSpringParamsError> {
        if self.axis >= NUM_AXES {
            return Err(EncoderSpringParamsError::InvalidAxis(self.axis))
        }

        if !(self.cycle_frequency_hz.is_finite() && self.cycle_frequency_hz > 0.0) {
            return Err(EncoderSpringParamsError::InvalidCycleFrequency(self.cycle_frequency_hz))
        }

        if !(self.current_warn_limit_a > 0.0) {
            return Err(EncoderSpringParamsError::InvalidCurrentLimit(self.current_warn_limit_a))
        }

        Ok(())
    }

    /// Period of one cycle.
    ///
    /// Units: seconds
    pub fn cycle_period_s(&self) -> f64 {
        1.0 / self.cycle_frequency_hz
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn params_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../params")
    }

    #[test]
    fn test_shipped_haptic_exec_params() {
        let p: HapticExecParams =
            util::params::load_from_path(params_dir().join("haptic_exec.toml")).unwrap();

        assert!(p.link.driver.are_valid().is_ok());
        assert!(p.haptic_ctrl.are_valid().is_ok());
        assert_eq!(p.trigger_format, TriggerFormat::LevelSustain);

        // Any file with a link table can drive the setup tool
        let s: SetupParams =
            util::params::load_from_path(params_dir().join("haptic_exec.toml")).unwrap();
        assert_eq!(s.link.port, p.link.port);
    }

    #[test]
    fn test_shipped_encoder_spring_params() {
        let p: EncoderSpringParams =
            util::params::load_from_path(params_dir().join("encoder_spring.toml")).unwrap();

        assert!(p.spring.are_valid().is_ok());
        assert!(p.are_valid().is_ok());
        assert!((p.cycle_period_s() - 1.0 / 144.0).abs() < 1e-12);
    }

    #[test]
    fn test_encoder_spring_params_validation() {
        let base: EncoderSpringParams =
            util::params::load_from_path(params_dir().join("encoder_spring.toml")).unwrap();

        let with = |axis, cycle_frequency_hz, current_warn_limit_a| EncoderSpringParams {
            axis,
            cycle_frequency_hz,
            current_warn_limit_a,
            ..base.clone()
        };

        assert_eq!(
            with(0, 0.0, 1.5).are_valid(),
            Err(EncoderSpringParamsError::InvalidCycleFrequency(0.0))
        );
        assert!(matches!(
            with(0, f64::NAN, 1.5).are_valid(),
            Err(EncoderSpringParamsError::InvalidCycleFrequency(_))
        ));
        assert!(with(0, -144.0, 1.5).are_valid().is_err());
        assert_eq!(
            with(3, 144.0, 1.5).are_valid(),
            Err(EncoderSpringParamsError::InvalidAxis(3))
        );
        assert_eq!(
            with(0, 144.0, 0.0).are_valid(),
            Err(EncoderSpringParamsError::InvalidCurrentLimit(0.0))
        );
        assert!(with(1, 500.0, 2.0).are_valid().is_ok());
    }
}
