//! Encoder driven virtual wall

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use util::maths::clamp;

use super::RotarySpringParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A damped spring engaged once the actuator turns past a wall angle.
#[derive(Debug, Clone)]
pub struct RotarySpring {
    params: RotarySpringParams,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RotarySpring {
    pub fn new(params: RotarySpringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RotarySpringParams {
        &self.params
    }

    /// Is the spring engaged at this position?
    pub fn engaged(&self, pos_rev: f64) -> bool {
        pos_rev > self.params.wall_rev
    }

    /// Magnitude of the spring torque, zero when not engaged.
    pub fn torque(&self, pos_rev: f64, vel_revs: f64) -> f64 {
        if !self.engaged(pos_rev) {
            return 0.0
        }

        let torque = self.params.stiffness_nm_per_rev * (pos_rev - self.params.wall_rev)
            + self.params.damping_nms_per_rev * vel_revs;

        clamp(&torque, &0.0, &self.params.torque_limit_nm)
    }

    /// Torque demand to send to the actuator, pushing back against the motion into the wall, or
    /// `None` if the spring is not engaged.
    pub fn command(&self, pos_rev: f64, vel_revs: f64) -> Option<f64> {
        if self.engaged(pos_rev) {
            Some(-self.torque(pos_rev, vel_revs))
        } else {
            None
        }
    }
}
