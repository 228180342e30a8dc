//! Implementations for the HapticCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use serde::Serialize;
use thiserror::Error;

// Internal
use haptic_if::{
    pose::{Pose, TimedPose},
    trigger::ContactEvent,
};
use util::{maths::rev_to_rad, module::State, session::Session};
use crate::{
    contact::Drum,
    signal_filter::{FilterError, LowPassFilter, VectorExpFilter},
    vel_est::VelocityEstimator,
};
use super::{Params, ParamsError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Haptic control module state
pub struct HapticCtrl {
    params: Params,

    /// Correction applied to the tracked device's attitude
    correction_q: UnitQuaternion<f64>,

    /// Corrected device pose latched as the origin of all positions
    origin: Option<Isometry3<f64>>,

    glitch_filter: Option<LowPassFilter>,
    pos_filter: Option<VectorExpFilter<3>>,
    vel_est: VelocityEstimator,

    drums: Vec<Drum>,

    /// Time stamp of the last pose run through the filters
    last_sample_time_s: Option<f64>,

    /// Result of the last pose run through the filters, before the direction policy
    last_sample: OutputData,
    last_num_drums_in_contact: usize,
}

/// Input data to haptic control.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputData {
    /// Latest pose of the tracked device, `None` if the tracker hasn't published one.
    pub pose: Option<TimedPose>,

    /// Last known actuator encoder position, used by the torque direction policy.
    ///
    /// Units: revolutions
    pub encoder_pos_rev: Option<f64>,
}

/// Output of haptic control.
#[derive(Debug, Default, Clone)]
pub struct OutputData {
    /// Torque to apply, after the direction policy. Zero when no drum is pushing back.
    ///
    /// Units: Newton meters
    pub torque_nm: f64,

    /// Drums struck on this cycle.
    pub events: Vec<ContactEvent>,

    /// Filtered drumstick tip position in the origin frame, if one was computed.
    ///
    /// Units: meters
    pub tip_m: Option<Vector3<f64>>,

    /// Vertical speed of the drumstick tip.
    ///
    /// Units: meters/second
    pub tip_speed_ms: f64,

    /// Height of the tip above the surface of the drum giving the torque, if any.
    ///
    /// Units: meters
    pub displacement_m: Option<f64>,
}

/// Status report for HapticCtrl processing.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StatusReport {
    /// True once the origin has been latched
    pub origin_set: bool,

    /// True if an active pose was available on this cycle
    pub pose_valid: bool,

    /// Number of drums the drumstick is currently pressing into
    pub num_drums_in_contact: usize,

    /// True if the direction policy reversed the torque
    pub torque_reversed: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Parameters are invalid: {0}")]
    ParamsInvalid(ParamsError),

    #[error("Could not build the filters: {0}")]
    FilterError(FilterError),
}

#[derive(Debug, Error)]
pub enum ProcError {
    #[error("HapticCtrl has not been initialised")]
    NotInitialised,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for HapticCtrl {
    type InitData = Params;
    type InitError = InitError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = ProcError;

    /// Initialise the HapticCtrl module.
    ///
    /// Expected init data is the module's parameters.
    fn init(
        &mut self,
        init_data: Self::InitData,
        _session: Option<&Session>,
    ) -> Result<(), Self::InitError> {
        init_data.are_valid().map_err(InitError::ParamsInvalid)?;

        self.pos_filter = Some(
            VectorExpFilter::new(init_data.filter_alpha).map_err(InitError::FilterError)?,
        );

        self.glitch_filter = match init_data.glitch_speed_cutoff_ms {
            Some(c) => Some(LowPassFilter::new(c).map_err(InitError::FilterError)?),
            None => None,
        };

        let rpy = init_data.controller_correction_rpy_rad;
        self.correction_q = UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]);

        self.drums = init_data
            .drums
            .iter()
            .map(|d| Drum::new(d, init_data.torque_limit_nm, init_data.max_strike_speed_ms))
            .collect();

        self.origin = None;
        self.vel_est.reset();
        self.last_sample_time_s = None;
        self.last_sample = OutputData::default();
        self.last_num_drums_in_contact = 0;

        debug!("HapticCtrl initialised with {} drum(s)", self.drums.len());

        self.params = init_data;

        Ok(())
    }

    /// Perform cyclic processing of HapticCtrl.
    ///
    /// The first active pose becomes the origin and produces no torque. Without an active pose no
    /// torque is produced.
    ///
    /// The loop usually runs faster than the tracker, so the same pose is seen on several cycles.
    /// A pose is only filtered and evaluated against the drums once: a pose no newer than the last
    /// one processed gets the previous result again, without its events, with the direction
    /// policy applied to the current encoder angle.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        if self.pos_filter.is_none() {
            return Err(ProcError::NotInitialised)
        }

        let mut report = StatusReport {
            origin_set: self.origin.is_some(),
            ..Default::default()
        };

        let pose = match input_data.pose {
            Some(p) if p.active => p,
            _ => return Ok((OutputData::default(), report)),
        };
        report.pose_valid = true;

        if let Some(last_s) = self.last_sample_time_s {
            if pose.time_s <= last_s {
                let mut sample = self.last_sample.clone();
                sample.events.clear();
                report.num_drums_in_contact = self.last_num_drums_in_contact;

                return Ok(self.apply_direction(sample, input_data.encoder_pos_rev, report))
            }
        }
        self.last_sample_time_s = Some(pose.time_s);

        let device = self.corrected_isometry(&pose.pose);

        let origin = match self.origin {
            Some(o) => o,
            None => {
                self.origin = Some(device);
                self.last_sample = OutputData::default();
                self.last_num_drums_in_contact = 0;
                report.origin_set = true;
                info!(
                    "Origin set at {:?}",
                    device.translation.vector.as_slice()
                );
                return Ok((OutputData::default(), report))
            }
        };

        // Drumstick tip in the origin frame
        let relative = origin.inverse() * device;
        let mut tip_m = relative
            .transform_point(&Point3::new(0.0, 0.0, self.params.pointer_length_m))
            .coords;

        if let Some(ref mut g) = self.glitch_filter {
            tip_m[2] = g.filter(tip_m[2], pose.time_s);
        }

        let tip_m = match self.pos_filter {
            Some(ref mut f) => f.filter(&tip_m),
            None => return Err(ProcError::NotInitialised),
        };

        let tip_speed_ms = self.vel_est.estimate(tip_m[2], pose.time_s);

        // Every drum is updated so that all contact states stay current, the largest reaction
        // wins.
        let mut torque_nm = 0.0f64;
        let mut displacement_m = None;
        let mut events = Vec::new();

        for drum in self.drums.iter_mut() {
            let out = drum.update(&tip_m, tip_speed_ms);

            if out.torque_nm.abs() > torque_nm.abs() {
                torque_nm = out.torque_nm;
                displacement_m = Some(drum.displacement(&tip_m));
            }

            if drum.in_contact() && drum.within_boundary(&tip_m) {
                report.num_drums_in_contact += 1;
            }

            if let Some(e) = out.event {
                debug!("Drum {} struck at {:.3} m/s", e.target_id, tip_speed_ms);
                events.push(e);
            }
        }

        let sample = OutputData {
            torque_nm,
            events,
            tip_m: Some(tip_m),
            tip_speed_ms,
            displacement_m,
        };

        self.last_sample = sample.clone();
        self.last_num_drums_in_contact = report.num_drums_in_contact;

        Ok(self.apply_direction(sample, input_data.encoder_pos_rev, report))
    }
}

impl Default for HapticCtrl {
    fn default() -> Self {
        Self {
            params: Params::default(),
            correction_q: UnitQuaternion::identity(),
            origin: None,
            glitch_filter: None,
            pos_filter: None,
            vel_est: VelocityEstimator::default(),
            drums: Vec::new(),
            last_sample_time_s: None,
            last_sample: OutputData::default(),
            last_num_drums_in_contact: 0,
        }
    }
}

impl HapticCtrl {
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn drums(&self) -> &[Drum] {
        &self.drums
    }

    /// The latched origin, if set.
    pub fn origin(&self) -> Option<&Isometry3<f64>> {
        self.origin.as_ref()
    }

    /// Apply the torque direction policy for the given encoder position.
    fn apply_direction(
        &self,
        mut output: OutputData,
        encoder_pos_rev: Option<f64>,
        mut report: StatusReport,
    ) -> (OutputData, StatusReport) {
        let angle_rad = encoder_pos_rev.map(rev_to_rad);
        let direction = self.params.torque_direction;
        let threshold = self.params.direction_threshold_rad;

        if output.torque_nm != 0.0 {
            report.torque_reversed = direction.reverses(angle_rad, threshold);
        }
        output.torque_nm = direction.apply(output.torque_nm, angle_rad, threshold);

        (output, report)
    }

    fn corrected_isometry(&self, pose: &Pose) -> Isometry3<f64> {
        let mut iso = pose.to_isometry();
        iso.rotation *= self.correction_q;
        iso
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::contact::DrumParams;
    use crate::haptic_ctrl::TorqueDirection;

    fn params() -> Params {
        Params {
            pointer_length_m: 0.0,
            controller_correction_rpy_rad: [0.0; 3],
            filter_alpha: 1.0,
            drums: vec![DrumParams {
                id: 0,
                center_m: [0.0, 0.0, 0.1],
                length_m: 0.4,
                width_m: 0.4,
                stiffness: 500.0,
                sustain_range: [0.0, 500.0],
                level_range: [0.0, 3.0],
            }],
            ..Default::default()
        }
    }

    fn input(x: f64, y: f64, z: f64, time_s: f64) -> InputData {
        InputData {
            pose: Some(TimedPose {
                time_s,
                pose: Pose::new(Vector3::new(x, y, z), UnitQuaternion::identity()),
                active: true,
            }),
            encoder_pos_rev: None,
        }
    }

    fn ctrl(p: Params) -> HapticCtrl {
        let mut c = HapticCtrl::default();
        c.init(p, None).unwrap();
        c
    }

    #[test]
    fn test_not_initialised() {
        let mut c = HapticCtrl::default();
        assert!(matches!(
            c.proc(&input(0.0, 0.0, 0.0, 0.0)),
            Err(ProcError::NotInitialised)
        ));
    }

    #[test]
    fn test_origin_latched_on_first_active_pose() {
        let mut c = ctrl(params());

        // Nothing published yet, then an inactive device
        let (out, rpt) = c.proc(&InputData::default()).unwrap();
        assert_eq!(out.torque_nm, 0.0);
        assert!(!rpt.pose_valid && !rpt.origin_set);

        let mut inactive = input(5.0, 5.0, 5.0, 0.0);
        inactive.pose.as_mut().unwrap().active = false;
        c.proc(&inactive).unwrap();
        assert!(c.origin().is_none());

        let (out, rpt) = c.proc(&input(1.0, 2.0, 0.5, 0.0)).unwrap();
        assert!(rpt.origin_set);
        assert!(out.tip_m.is_none());
        assert_eq!(c.origin().unwrap().translation.vector, Vector3::new(1.0, 2.0, 0.5));

        // Positions are now relative to the origin
        let (out, _) = c.proc(&input(1.0, 2.0, 0.55, 0.01)).unwrap();
        assert!((out.tip_m.unwrap() - Vector3::new(0.0, 0.0, 0.05)).norm() < 1e-9);
        assert!((out.torque_nm - 1.25).abs() < 1e-9);
        assert!((out.displacement_m.unwrap() + 0.05).abs() < 1e-9);
        assert_eq!(out.events.len(), 1);
    }

    #[test]
    fn test_pointer_offset_and_correction() {
        // Flipping the device about X turns its +Z axis downwards
        let mut c = ctrl(Params {
            pointer_length_m: 0.15,
            controller_correction_rpy_rad: [std::f64::consts::PI, 0.0, 0.0],
            ..params()
        });

        c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();

        // The origin frame is upside down relative to the tracking frame, so moving the device
        // down by 0.1 raises it by 0.1 in the origin frame. The tip is a further 0.15 along +Z.
        let (out, _) = c.proc(&input(0.0, 0.0, -0.1, 0.01)).unwrap();
        let tip = out.tip_m.unwrap();
        assert!(tip[0].abs() < 1e-9 && tip[1].abs() < 1e-9);
        assert!((tip[2] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_from_pose_times() {
        let mut c = ctrl(params());

        c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();
        let (out, _) = c.proc(&input(0.0, 0.0, 0.2, 0.1)).unwrap();
        assert_eq!(out.tip_speed_ms, 0.0);

        let (out, _) = c.proc(&input(0.0, 0.0, 0.05, 0.2)).unwrap();
        assert!((out.tip_speed_ms - 1.5).abs() < 1e-9);
        let event = out.events[0];
        assert!((event.level - 1.5 * 3.0 / 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_magnitude_reduction() {
        let shallow = DrumParams {
            id: 1,
            center_m: [0.0, 0.0, 0.06],
            length_m: 1.0,
            width_m: 1.0,
            stiffness: 500.0,
            sustain_range: [0.0, 500.0],
            level_range: [0.0, 3.0],
        };

        for order in [vec![0, 1], vec![1, 0]] {
            let mut p = params();
            let deep = p.drums[0].clone();
            p.drums = order
                .iter()
                .map(|&i| if i == 0 { deep.clone() } else { shallow.clone() })
                .collect();

            let mut c = ctrl(p);
            c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();

            let (out, rpt) = c.proc(&input(0.0, 0.0, 0.05, 0.01)).unwrap();
            assert!((out.torque_nm - 1.25).abs() < 1e-9);
            assert_eq!(rpt.num_drums_in_contact, 2);
            assert_eq!(out.events.len(), 2);
        }
    }

    #[test]
    fn test_direction_policy() {
        let mut c = ctrl(Params {
            torque_direction: TorqueDirection::ReverseAbove,
            ..params()
        });
        c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();

        let mut i = input(0.0, 0.0, 0.05, 0.01);

        // Half a turn is above the threshold
        i.encoder_pos_rev = Some(0.4);
        let (out, rpt) = c.proc(&i).unwrap();
        assert!((out.torque_nm + 1.25).abs() < 1e-9);
        assert!(rpt.torque_reversed);

        i.encoder_pos_rev = Some(0.1);
        let (out, rpt) = c.proc(&i).unwrap();
        assert!((out.torque_nm - 1.25).abs() < 1e-9);
        assert!(!rpt.torque_reversed);
    }

    #[test]
    fn test_repeated_pose_filtered_once() {
        let smoothed = || {
            ctrl(Params {
                filter_alpha: 0.5,
                ..params()
            })
        };

        let mut once = smoothed();
        let mut polled = smoothed();

        for c in [&mut once, &mut polled] {
            c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();
            c.proc(&input(0.0, 0.0, 0.2, 0.01)).unwrap();
        }

        let (expected, _) = once.proc(&input(0.0, 0.0, 0.0, 0.02)).unwrap();

        // The same tracker sample seen on five loop cycles
        let mut outputs = Vec::new();
        for _ in 0..5 {
            outputs.push(polled.proc(&input(0.0, 0.0, 0.0, 0.02)).unwrap().0);
        }

        // 0.5 * 0.0 + 0.5 * 0.2
        assert!((expected.tip_m.unwrap()[2] - 0.1).abs() < 1e-9);
        assert_eq!(expected.torque_nm, 0.0);

        for out in outputs.iter() {
            assert_eq!(out.tip_m, expected.tip_m);
            assert_eq!(out.torque_nm, expected.torque_nm);
            assert_eq!(out.tip_speed_ms, expected.tip_speed_ms);
        }

        // An older sample arriving late is not processed either
        let (late, _) = polled.proc(&input(0.0, 0.0, -0.5, 0.015)).unwrap();
        assert_eq!(late.tip_m, expected.tip_m);
    }

    #[test]
    fn test_repeated_pose_keeps_torque_without_events() {
        let mut c = ctrl(params());
        c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();

        let (first, rpt) = c.proc(&input(0.0, 0.0, 0.05, 0.01)).unwrap();
        assert_eq!(first.events.len(), 1);
        assert_eq!(rpt.num_drums_in_contact, 1);

        let (again, rpt) = c.proc(&input(0.0, 0.0, 0.05, 0.01)).unwrap();
        assert!((again.torque_nm - 1.25).abs() < 1e-9);
        assert!(again.events.is_empty());
        assert_eq!(rpt.num_drums_in_contact, 1);
        assert!(rpt.pose_valid);
    }

    #[test]
    fn test_glitch_rejected() {
        let mut c = ctrl(Params {
            glitch_speed_cutoff_ms: Some(5.0),
            ..params()
        });
        c.proc(&input(0.0, 0.0, 0.0, 0.0)).unwrap();
        c.proc(&input(0.0, 0.0, 0.2, 0.1)).unwrap();

        // A jump into the drum in 1 ms is ignored
        let (out, _) = c.proc(&input(0.0, 0.0, -0.5, 0.101)).unwrap();
        assert_eq!(out.torque_nm, 0.0);
        assert!((out.tip_m.unwrap()[2] - 0.2).abs() < 1e-9);
    }
}
