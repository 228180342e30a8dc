//! # Pose Interface
//!
//! The tracker (a VR runtime, a motion capture system, a simulation) publishes the pose of the
//! tracked pointer once per frame. The control loop polls the latest published pose without ever
//! waiting on the tracker, so the two are connected through a [`PoseHandoff`], an atomically
//! swapped snapshot.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Position and attitude of a tracked device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Position of the device in the tracking frame.
    ///
    /// Units: meters
    pub position_m: Vector3<f64>,

    /// Attitude of the device, rotating vectors from the device frame into the tracking frame.
    pub attitude_q: UnitQuaternion<f64>,
}

/// A pose captured by the tracker at a particular time.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TimedPose {
    /// Capture time of the pose.
    ///
    /// Units: seconds, on the tracker's monotonic clock
    pub time_s: f64,

    /// The captured pose
    pub pose: Pose,

    /// True if the tracked device is currently active and the pose can be trusted.
    pub active: bool,
}

/// Single slot handoff of the latest pose between a tracker thread and the control loop.
///
/// Cloning the handoff gives another handle onto the same slot.
#[derive(Clone)]
pub struct PoseHandoff {
    slot: Arc<ArcSwapOption<TimedPose>>,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A producer of tracked pointer poses.
pub trait PoseSource {
    /// Get the most recently captured pose, or `None` if no pose has been captured yet.
    ///
    /// This function must not block on the tracker.
    fn latest_pose(&self) -> Option<TimedPose>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    /// Create a new pose.
    pub fn new(position_m: Vector3<f64>, attitude_q: UnitQuaternion<f64>) -> Self {
        Self {
            position_m,
            attitude_q,
        }
    }

    /// Convert to a rigid transform from the device frame into the tracking frame.
    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position_m), self.attitude_q)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position_m: Vector3::zeros(),
            attitude_q: UnitQuaternion::identity(),
        }
    }
}

impl PoseHandoff {
    /// Create an empty handoff.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Publish a new pose, replacing the previous one.
    pub fn publish(&self, pose: TimedPose) {
        self.slot.store(Some(Arc::new(pose)));
    }

    /// Remove the published pose, for instance when the tracker shuts down.
    pub fn clear(&self) {
        self.slot.store(None);
    }
}

impl Default for PoseHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseSource for PoseHandoff {
    fn latest_pose(&self) -> Option<TimedPose> {
        self.slot.load_full().map(|p| *p)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Point3;
    use std::f64::consts::PI;
    use std::thread;

    fn timed(z: f64, time_s: f64) -> TimedPose {
        TimedPose {
            time_s,
            pose: Pose::new(Vector3::new(0.0, 0.0, z), UnitQuaternion::identity()),
            active: true,
        }
    }

    #[test]
    fn test_to_isometry() {
        // Pointer lying along +X
        let pose = Pose::new(
            Vector3::new(1.0, 2.0, 3.0),
            UnitQuaternion::from_euler_angles(0.0, PI / 2.0, 0.0),
        );
        let tip = pose.to_isometry() * Point3::new(0.0, 0.0, 0.15);

        assert!((tip.coords - Vector3::new(1.15, 2.0, 3.0)).norm() < 1e-12);
    }

    #[test]
    fn test_handoff_latest_wins() {
        let handoff = PoseHandoff::new();
        assert_eq!(handoff.latest_pose(), None);

        handoff.publish(timed(0.1, 0.0));
        handoff.publish(timed(0.2, 0.01));
        assert_eq!(handoff.latest_pose(), Some(timed(0.2, 0.01)));

        handoff.clear();
        assert_eq!(handoff.latest_pose(), None);
    }

    #[test]
    fn test_handoff_across_threads() {
        let handoff = PoseHandoff::new();
        let producer = handoff.clone();

        thread::spawn(move || {
            for i in 0..100 {
                producer.publish(timed(i as f64 * 0.01, i as f64));
            }
        })
        .join()
        .unwrap();

        assert_eq!(handoff.latest_pose().map(|p| p.time_s), Some(99.0));
    }
}
