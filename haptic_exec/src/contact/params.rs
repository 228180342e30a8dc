//! Parameters of the contact models

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Description of a single drum.
#[derive(Debug, Clone, Deserialize)]
pub struct DrumParams {
    /// ID sent to the synthesiser when this drum is struck.
    pub id: u32,

    /// Center of the drum's striking surface in the origin frame.
    ///
    /// Units: meters
    pub center_m: [f64; 3],

    /// Extent of the surface along the Y axis.
    ///
    /// Units: meters
    pub length_m: f64,

    /// Extent of the surface along the X axis.
    ///
    /// Units: meters
    pub width_m: f64,

    /// Stiffness of the surface, the torque being `k * penetration^2`.
    ///
    /// Units: Newton meters/meter^2
    pub stiffness: f64,

    /// Sustain sent for a strike on the edge (first) and in the center (second).
    #[serde(default = "default_sustain_range")]
    pub sustain_range: [f64; 2],

    /// Level sent for a strike at rest (first) and at the maximum strike speed (second).
    #[serde(default = "default_level_range")]
    pub level_range: [f64; 2],
}

/// Parameters of an encoder driven spring.
#[derive(Debug, Clone, Deserialize)]
pub struct RotarySpringParams {
    /// Angle at which the spring engages.
    ///
    /// Units: revolutions
    pub wall_rev: f64,

    /// Units: Newton meters/revolution
    pub stiffness_nm_per_rev: f64,

    /// Units: Newton meters/(revolution/second)
    #[serde(default)]
    pub damping_nms_per_rev: f64,

    /// Units: Newton meters
    pub torque_limit_nm: f64,
}

#[derive(Debug, Error)]
pub enum ContactParamsError {
    #[error("Drum {0} has a non-positive length or width")]
    InvalidDrumSize(u32),

    #[error("Drum {0} has a negative stiffness")]
    NegativeStiffness(u32),

    #[error("More than one drum has the ID {0}")]
    DuplicateId(u32),

    #[error("Spring stiffness and damping must not be negative")]
    NegativeSpringGain,

    #[error("The torque limit must be positive, found {0}")]
    InvalidTorqueLimit(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl DrumParams {
    pub fn are_valid(&self) -> Result<(), ContactParamsError> {
        if !(self.length_m > 0.0 && self.width_m > 0.0) {
            return Err(ContactParamsError::InvalidDrumSize(self.id))
        }

        if self.stiffness < 0.0 {
            return Err(ContactParamsError::NegativeStiffness(self.id))
        }

        Ok(())
    }
}

impl RotarySpringParams {
    pub fn are_valid(&self) -> Result<(), ContactParamsError> {
        if self.stiffness_nm_per_rev < 0.0 || self.damping_nms_per_rev < 0.0 {
            return Err(ContactParamsError::NegativeSpringGain)
        }

        if !(self.torque_limit_nm > 0.0) {
            return Err(ContactParamsError::InvalidTorqueLimit(self.torque_limit_nm))
        }

        Ok(())
    }
}

impl Default for RotarySpringParams {
    fn default() -> Self {
        Self {
            wall_rev: 1.0,
            stiffness_nm_per_rev: 6.0,
            damping_nms_per_rev: 0.0,
            torque_limit_nm: 0.5,
        }
    }
}

/// Check a set of drums, including that their IDs are unique.
pub fn check_drums(drums: &[DrumParams]) -> Result<(), ContactParamsError> {
    for (i, d) in drums.iter().enumerate() {
        d.are_valid()?;

        if drums[..i].iter().any(|o| o.id == d.id) {
            return Err(ContactParamsError::DuplicateId(d.id))
        }
    }

    Ok(())
}

fn default_sustain_range() -> [f64; 2] {
    [0.0, 500.0]
}

fn default_level_range() -> [f64; 2] {
    [0.0, 3.0]
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Deserialize)]
    struct Drums {
        drums: Vec<DrumParams>,
    }

    #[test]
    fn test_load_drums() {
        let toml_str = r#"
            [[drums]]
            id = 0
            center_m = [0.0, 0.0, 0.1]
            length_m = 0.4
            width_m = 0.4
            stiffness = 500.0

            [[drums]]
            id = 1
            center_m = [0.5, 0.0, 0.2]
            length_m = 0.3
            width_m = 0.3
            stiffness = 300.0
            sustain_range = [50.0, 250.0]
            level_range = [0.5, 2.0]
        "#;

        let d: Drums = util::params::from_str(toml_str).unwrap();

        assert_eq!(d.drums.len(), 2);
        assert_eq!(d.drums[0].sustain_range, [0.0, 500.0]);
        assert_eq!(d.drums[0].level_range, [0.0, 3.0]);
        assert_eq!(d.drums[1].level_range, [0.5, 2.0]);
        assert!(check_drums(&d.drums).is_ok());
    }

    #[test]
    fn test_invalid_drums() {
        let drum = DrumParams {
            id: 3,
            center_m: [0.0; 3],
            length_m: 0.4,
            width_m: 0.4,
            stiffness: 100.0,
            sustain_range: default_sustain_range(),
            level_range: default_level_range(),
        };

        assert!(matches!(
            check_drums(&[drum.clone(), drum.clone()]),
            Err(ContactParamsError::DuplicateId(3))
        ));
        assert!(matches!(
            DrumParams { width_m: 0.0, ..drum.clone() }.are_valid(),
            Err(ContactParamsError::InvalidDrumSize(3))
        ));
        assert!(matches!(
            DrumParams { stiffness: -1.0, ..drum }.are_valid(),
            Err(ContactParamsError::NegativeStiffness(3))
        ));
    }
}
