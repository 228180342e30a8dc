//! Parameters structure for HapticCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

use util::maths::normalise_angle;
use crate::contact::{check_drums, ContactParamsError, DrumParams};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for haptic control.
#[derive(Debug, Clone, Deserialize)]
pub struct Params {

    // ---- POINTER ----

    /// Distance from the tracked device to the tip of the drumstick, along the device's +Z axis
    /// (after correction).
    ///
    /// Units: meters
    pub pointer_length_m: f64,

    /// Rotation applied to the tracked device's attitude so that its +Z axis points along the
    /// drumstick.
    ///
    /// Units: radians, as (roll, pitch, yaw)
    pub controller_correction_rpy_rad: [f64; 3],

    // ---- FILTERING ----

    /// Smoothing coefficient of the drumstick position filter, in (0, 1].
    pub filter_alpha: f64,

    /// If set, drumstick heights implying a vertical speed above this value are treated as
    /// tracking glitches and ignored.
    ///
    /// Units: meters/second
    #[serde(default)]
    pub glitch_speed_cutoff_ms: Option<f64>,

    // ---- FORCES ----

    /// Largest torque magnitude a drum can produce.
    ///
    /// Units: Newton meters
    pub torque_limit_nm: f64,

    /// Strike speed giving the loudest level.
    ///
    /// Units: meters/second
    pub max_strike_speed_ms: f64,

    /// Direction in which the torque is applied.
    #[serde(default)]
    pub torque_direction: TorqueDirection,

    /// Actuator angle at which a reversing direction policy switches.
    ///
    /// Units: radians
    #[serde(default = "default_direction_threshold")]
    pub direction_threshold_rad: f64,

    // ---- DRUMS ----

    pub drums: Vec<DrumParams>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Sign policy applied to the drums' reaction torque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TorqueDirection {
    /// Torque is sent as computed
    Fixed,

    /// Torque is reversed when the actuator angle is above the threshold
    ReverseAbove,

    /// Torque is reversed when the actuator angle is below the threshold
    ReverseBelow,
}

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Pointer length must be finite and not negative, found {0}")]
    InvalidPointerLength(f64),

    #[error("The torque limit must be positive, found {0}")]
    InvalidTorqueLimit(f64),

    #[error("The maximum strike speed must be positive, found {0}")]
    InvalidStrikeSpeed(f64),

    #[error("No drums are defined")]
    NoDrums,

    #[error("Invalid drum: {0}")]
    InvalidDrum(ContactParamsError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Determines if the parameters are valid.
    ///
    /// The filter coefficients are checked when the filters are built.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if !(self.pointer_length_m.is_finite() && self.pointer_length_m >= 0.0) {
            return Err(ParamsError::InvalidPointerLength(self.pointer_length_m))
        }

        if !(self.torque_limit_nm > 0.0) {
            return Err(ParamsError::InvalidTorqueLimit(self.torque_limit_nm))
        }

        if !(self.max_strike_speed_ms > 0.0) {
            return Err(ParamsError::InvalidStrikeSpeed(self.max_strike_speed_ms))
        }

        if self.drums.is_empty() {
            return Err(ParamsError::NoDrums)
        }

        check_drums(&self.drums).map_err(ParamsError::InvalidDrum)
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            pointer_length_m: 0.15,
            controller_correction_rpy_rad: [std::f64::consts::PI, 0.0, 0.0],
            filter_alpha: 0.5,
            glitch_speed_cutoff_ms: None,
            torque_limit_nm: 1.5,
            max_strike_speed_ms: 8.0,
            torque_direction: TorqueDirection::Fixed,
            direction_threshold_rad: default_direction_threshold(),
            drums: Vec::new(),
        }
    }
}

impl TorqueDirection {
    /// Should the torque be reversed at this actuator angle?
    ///
    /// An unknown angle never reverses.
    pub fn reverses(self, angle_rad: Option<f64>, threshold_rad: f64) -> bool {
        let angle_rad = match angle_rad {
            Some(a) => normalise_angle(a),
            None => return false,
        };

        match self {
            TorqueDirection::Fixed => false,
            TorqueDirection::ReverseAbove => angle_rad > threshold_rad,
            TorqueDirection::ReverseBelow => angle_rad < threshold_rad,
        }
    }

    /// Apply the policy to a torque.
    pub fn apply(self, torque_nm: f64, angle_rad: Option<f64>, threshold_rad: f64) -> f64 {
        if self.reverses(angle_rad, threshold_rad) {
            -torque_nm
        } else {
            torque_nm
        }
    }
}

impl Default for TorqueDirection {
    fn default() -> Self {
        TorqueDirection::Fixed
    }
}

fn default_direction_threshold() -> f64 {
    std::f64::consts::FRAC_PI_2
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_direction_policy() {
        let t = PI / 2.0;

        assert_eq!(TorqueDirection::Fixed.apply(1.0, Some(3.0), t), 1.0);

        assert_eq!(TorqueDirection::ReverseAbove.apply(1.0, Some(2.0), t), -1.0);
        assert_eq!(TorqueDirection::ReverseAbove.apply(1.0, Some(1.0), t), 1.0);

        assert_eq!(TorqueDirection::ReverseBelow.apply(1.0, Some(1.0), t), -1.0);
        assert_eq!(TorqueDirection::ReverseBelow.apply(1.0, Some(2.0), t), 1.0);

        // Unknown angle
        assert_eq!(TorqueDirection::ReverseAbove.apply(0.7, None, t), 0.7);
        assert_eq!(TorqueDirection::ReverseBelow.apply(0.7, None, t), 0.7);
    }

    #[test]
    fn test_direction_normalises_angle() {
        // Two and a bit turns is just above zero
        let angle = 2.0 * std::f64::consts::TAU + 0.1;
        assert!(!TorqueDirection::ReverseAbove.reverses(Some(angle), PI / 2.0));
        assert!(TorqueDirection::ReverseBelow.reverses(Some(angle), PI / 2.0));
    }

    #[test]
    fn test_validation() {
        let mut p = Params::default();
        assert!(matches!(p.are_valid(), Err(ParamsError::NoDrums)));

        p.drums.push(DrumParams {
            id: 0,
            center_m: [0.0, 0.0, 0.1],
            length_m: 0.4,
            width_m: 0.4,
            stiffness: 500.0,
            sustain_range: [0.0, 500.0],
            level_range: [0.0, 3.0],
        });
        assert!(p.are_valid().is_ok());

        p.torque_limit_nm = 0.0;
        assert!(matches!(p.are_valid(), Err(ParamsError::InvalidTorqueLimit(_))));
    }

    #[test]
    fn test_load() {
        let p: Params = util::params::from_str(r#"
            pointer_length_m = 0.15
            controller_correction_rpy_rad = [3.141592653589793, 0.0, 0.0]
            filter_alpha = 0.5
            torque_limit_nm = 1.5
            max_strike_speed_ms = 8.0
            torque_direction = "ReverseAbove"

            [[drums]]
            id = 0
            center_m = [0.0, 0.0, 0.1]
            length_m = 0.4
            width_m = 0.4
            stiffness = 600.0
        "#).unwrap();

        assert_eq!(p.torque_direction, TorqueDirection::ReverseAbove);
        assert_eq!(p.direction_threshold_rad, PI / 2.0);
        assert_eq!(p.glitch_speed_cutoff_ms, None);
        assert!(p.are_valid().is_ok());
    }
}
