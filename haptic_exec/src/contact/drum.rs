//! Drum contact model

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::Serialize;

use haptic_if::trigger::ContactEvent;
use util::maths::{clamp, lin_map};

use super::DrumParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A drum with a horizontal, axis aligned, rectangular striking surface.
///
/// The drum pushes back on the drumstick once it goes below the surface, with a torque growing
/// with the square of the penetration.
#[derive(Debug, Clone)]
pub struct Drum {
    id: u32,
    center_m: Vector3<f64>,
    length_m: f64,
    width_m: f64,
    stiffness: f64,
    sustain_range: [f64; 2],
    level_range: [f64; 2],

    torque_limit_nm: f64,
    max_strike_speed_ms: f64,

    /// Was the drumstick below the surface on the previous contact check?
    in_contact: bool,
}

/// Result of updating a drum with a new drumstick position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrumOutput {
    /// Magnitude of the reaction torque.
    ///
    /// Units: Newton meters
    pub torque_nm: f64,

    /// Set if the drum was struck on this update.
    pub event: Option<ContactEvent>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Drum {
    /// Build a drum.
    ///
    /// `max_strike_speed_ms` is the strike speed mapped to the top of the level range.
    pub fn new(params: &DrumParams, torque_limit_nm: f64, max_strike_speed_ms: f64) -> Self {
        Self {
            id: params.id,
            center_m: Vector3::from(params.center_m),
            length_m: params.length_m,
            width_m: params.width_m,
            stiffness: params.stiffness,
            sustain_range: params.sustain_range,
            level_range: params.level_range,
            torque_limit_nm,
            max_strike_speed_ms,
            in_contact: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// True if the drumstick is currently below the surface, as of the last contact check.
    pub fn in_contact(&self) -> bool {
        self.in_contact
    }

    /// Is the position above or below the drum's surface? Edges count as inside.
    pub fn within_boundary(&self, position_m: &Vector3<f64>) -> bool {
        let half_width = self.width_m / 2.0;
        let half_length = self.length_m / 2.0;

        position_m[0] >= self.center_m[0] - half_width
            && position_m[0] <= self.center_m[0] + half_width
            && position_m[1] >= self.center_m[1] - half_length
            && position_m[1] <= self.center_m[1] + half_length
    }

    /// Height of the position above the surface, negative when below.
    pub fn displacement(&self, position_m: &Vector3<f64>) -> f64 {
        position_m[2] - self.center_m[2]
    }

    /// Magnitude of the reaction torque for a position.
    pub fn torque(&self, position_m: &Vector3<f64>) -> f64 {
        let displacement = self.displacement(position_m);

        if displacement >= 0.0 {
            return 0.0
        }

        (self.stiffness * displacement.powi(2)).abs().min(self.torque_limit_nm)
    }

    /// Update the contact state, returning true only when the drumstick has just gone below the
    /// surface.
    pub fn check_contact(&mut self, position_m: &Vector3<f64>) -> bool {
        let was_in_contact = self.in_contact;
        self.in_contact = self.displacement(position_m) < 0.0;

        self.in_contact && !was_in_contact
    }

    /// Horizontal distance between a position and the center of the drum.
    pub fn distance_to_center(&self, position_m: &Vector3<f64>) -> f64 {
        ((position_m[0] - self.center_m[0]).powi(2) + (position_m[1] - self.center_m[1]).powi(2))
            .sqrt()
    }

    /// Process a new drumstick position and vertical speed.
    ///
    /// Outside the surface's footprint the drum produces nothing and its contact state is left
    /// as it was.
    pub fn update(&mut self, position_m: &Vector3<f64>, speed_ms: f64) -> DrumOutput {
        if !self.within_boundary(position_m) {
            return DrumOutput {
                torque_nm: 0.0,
                event: None,
            }
        }

        let event = if self.check_contact(position_m) {
            Some(self.contact_event(position_m, speed_ms))
        } else {
            None
        };

        DrumOutput {
            torque_nm: self.torque(position_m),
            event,
        }
    }

    fn contact_event(&self, position_m: &Vector3<f64>, speed_ms: f64) -> ContactEvent {
        let half_diagonal = (self.length_m.powi(2) + self.width_m.powi(2)).sqrt() / 2.0;

        // Center strikes sustain longest
        let sustain = lin_map(
            (0.0, half_diagonal),
            (self.sustain_range[1], self.sustain_range[0]),
            self.distance_to_center(position_m),
        );

        let level = lin_map(
            (0.0, self.max_strike_speed_ms),
            (self.level_range[0], self.level_range[1]),
            speed_ms.abs(),
        );

        ContactEvent {
            target_id: self.id,
            level: clamp(&level, &self.level_range[0], &self.level_range[1]),
            sustain: clamp(&sustain, &self.sustain_range[0], &self.sustain_range[1]),
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn drum(torque_limit_nm: f64) -> Drum {
        Drum::new(
            &DrumParams {
                id: 4,
                center_m: [0.0, 0.0, 0.1],
                length_m: 0.4,
                width_m: 0.4,
                stiffness: 500.0,
                sustain_range: [0.0, 500.0],
                level_range: [0.0, 3.0],
            },
            torque_limit_nm,
            8.0,
        )
    }

    #[test]
    fn test_boundary() {
        let d = drum(10.0);

        assert!(d.within_boundary(&Vector3::new(0.0, 0.0, 5.0)));
        assert!(!d.within_boundary(&Vector3::new(0.3, 0.3, 0.05)));
        assert!(!d.within_boundary(&Vector3::new(0.0, -0.21, 0.05)));

        // Edges and corners are inside, every time
        for _ in 0..3 {
            assert!(d.within_boundary(&Vector3::new(0.2, 0.0, 0.0)));
            assert!(d.within_boundary(&Vector3::new(-0.2, 0.2, 0.0)));
        }
    }

    #[test]
    fn test_boundary_uses_width_for_x() {
        let mut p = drum(10.0);
        p.width_m = 0.2;
        p.length_m = 1.0;

        assert!(!p.within_boundary(&Vector3::new(0.15, 0.0, 0.0)));
        assert!(p.within_boundary(&Vector3::new(0.0, 0.45, 0.0)));
    }

    #[test]
    fn test_torque() {
        let d = drum(10.0);

        assert!((d.torque(&Vector3::new(0.0, 0.0, 0.05)) - 1.25).abs() < 1e-9);
        assert_eq!(d.torque(&Vector3::new(0.0, 0.0, 0.1)), 0.0);
        assert_eq!(d.torque(&Vector3::new(0.0, 0.0, 0.5)), 0.0);

        // Extreme penetration is limited
        assert_eq!(d.torque(&Vector3::new(0.0, 0.0, -1000.0)), 10.0);
        assert_eq!(drum(1.0).torque(&Vector3::new(0.0, 0.0, 0.05)), 1.0);
    }

    #[test]
    fn test_contact_rising_edge() {
        let mut d = drum(10.0);
        let above = Vector3::new(0.0, 0.0, 0.2);
        let below = Vector3::new(0.0, 0.0, 0.05);

        let fired: Vec<bool> = [above, below, below, below, above, below, above]
            .iter()
            .map(|p| d.check_contact(p))
            .collect();

        assert_eq!(fired, vec![false, true, false, false, false, true, false]);
    }

    #[test]
    fn test_update_inside() {
        let mut d = drum(10.0);

        let out = d.update(&Vector3::new(0.0, 0.0, 0.15), 1.0);
        assert_eq!(out, DrumOutput { torque_nm: 0.0, event: None });

        // Center strike at half the max speed
        let out = d.update(&Vector3::new(0.0, 0.0, 0.05), -4.0);
        assert!((out.torque_nm - 1.25).abs() < 1e-9);
        let event = out.event.unwrap();
        assert_eq!(event.target_id, 4);
        assert!((event.level - 1.5).abs() < 1e-9);
        assert!((event.sustain - 500.0).abs() < 1e-9);

        // Still in contact, no new event
        let out = d.update(&Vector3::new(0.0, 0.0, 0.04), 0.5);
        assert!(out.event.is_none());
        assert!(out.torque_nm > 1.25);
    }

    #[test]
    fn test_update_outside() {
        let mut d = drum(10.0);

        let out = d.update(&Vector3::new(0.3, 0.3, 0.05), 2.0);
        assert_eq!(out, DrumOutput { torque_nm: 0.0, event: None });
        assert!(!d.in_contact());
    }

    #[test]
    fn test_event_mapping_clamped() {
        let mut d = drum(10.0);

        // Corner strike far faster than the max speed
        let out = d.update(&Vector3::new(0.2, 0.2, 0.0), 100.0);
        let event = out.event.unwrap();
        assert!((event.level - 3.0).abs() < 1e-9);
        assert!(event.sustain.abs() < 1e-9);
    }
}
