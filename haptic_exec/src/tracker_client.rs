//! # Tracker Client
//!
//! The tracker client receives the pose of the tracked pointer from the tracking process and
//! publishes it into a [`PoseHandoff`] for the control loop. Poses arrive as one JSON object per
//! line, for example:
//!
//! ```json
//! {"time_s": 12.345, "position_m": [0.1, 1.2, -0.3], "attitude_q": [1.0, 0.0, 0.0, 0.0], "active": true}
//! ```
//!
//! where `attitude_q` is given as `[w, x, y, z]`. Reading happens on a background thread so the
//! control loop never waits for the tracker. Lines which cannot be parsed are logged and skipped.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::io::BufRead;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::Deserialize;

use haptic_if::pose::{Pose, PoseHandoff, TimedPose};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct TrackerClient {
    bg_jh: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    num_parse_errors: Arc<AtomicU64>,
}

/// A pose message from the tracker.
#[derive(Debug, Deserialize)]
struct PoseMsg {
    time_s: f64,
    position_m: [f64; 3],

    /// Attitude as [w, x, y, z]
    attitude_q: [f64; 4],

    active: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TrackerClientError {
    #[error("Could not deserialize the pose message: {0}")]
    DeserializeError(serde_json::Error),

    #[error("The attitude quaternion has zero norm")]
    ZeroQuaternion,

    #[error("The pose contains non-finite values")]
    NonFinite,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrackerClient {
    /// Start reading poses from `reader` into `handoff`.
    ///
    /// When the reader ends (or fails) the published pose is cleared, so the control loop stops
    /// applying torque, and `end_flag` is raised if one is given.
    pub fn spawn<R>(reader: R, handoff: PoseHandoff, end_flag: Option<Arc<AtomicBool>>) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let num_parse_errors = Arc::new(AtomicU64::new(0));

        let running_clone = running.clone();
        let num_parse_errors_clone = num_parse_errors.clone();

        let bg_jh = Some(thread::spawn(move || {
            bg_thread(reader, handoff, &num_parse_errors_clone);

            running_clone.store(false, Ordering::Relaxed);
            if let Some(f) = end_flag {
                f.store(true, Ordering::Relaxed);
            }
        }));

        Self {
            bg_jh,
            running,
            num_parse_errors,
        }
    }

    /// True while the tracker stream is open.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Number of lines which could not be parsed so far.
    pub fn num_parse_errors(&self) -> u64 {
        self.num_parse_errors.load(Ordering::Relaxed)
    }

    /// Wait for the tracker stream to end.
    pub fn join(mut self) {
        if let Some(jh) = self.bg_jh.take() {
            if jh.join().is_err() {
                warn!("TrackerClient background thread panicked");
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse a single pose message line.
pub fn parse_pose(line: &str) -> Result<TimedPose, TrackerClientError> {
    let msg: PoseMsg = serde_json::from_str(line).map_err(TrackerClientError::DeserializeError)?;

    let all_finite = std::iter::once(msg.time_s)
        .chain(msg.position_m.iter().copied())
        .chain(msg.attitude_q.iter().copied())
        .all(f64::is_finite);

    if !all_finite {
        return Err(TrackerClientError::NonFinite)
    }

    let [w, x, y, z] = msg.attitude_q;
    let q = Quaternion::new(w, x, y, z);

    if q.norm() == 0.0 {
        return Err(TrackerClientError::ZeroQuaternion)
    }

    Ok(TimedPose {
        time_s: msg.time_s,
        pose: Pose::new(
            Vector3::from(msg.position_m),
            UnitQuaternion::from_quaternion(q),
        ),
        active: msg.active,
    })
}

/// Background thread, publishes every pose read from the stream.
fn bg_thread<R: BufRead>(reader: R, handoff: PoseHandoff, num_parse_errors: &AtomicU64) {
    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Could not read from the tracker stream: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_pose(&line) {
            Ok(p) => handoff.publish(p),
            Err(e) => {
                num_parse_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Could not parse the tracker message: {}", e);
            }
        }
    }

    handoff.clear();
    info!("Tracker stream ended");
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use haptic_if::pose::PoseSource;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_parse_pose() {
        let p = parse_pose(
            r#"{"time_s": 1.5, "position_m": [0.1, 0.2, 0.3], "attitude_q": [2.0, 0.0, 0.0, 0.0], "active": true}"#,
        )
        .unwrap();

        assert_eq!(p.time_s, 1.5);
        assert!(p.active);
        assert_eq!(p.pose.position_m, Vector3::new(0.1, 0.2, 0.3));
        assert!(p.pose.attitude_q.angle() < 1e-12);

        assert!(matches!(
            parse_pose(r#"{"time_s": 1.5, "position_m": [0, 0, 0], "attitude_q": [0, 0, 0, 0], "active": true}"#),
            Err(TrackerClientError::ZeroQuaternion)
        ));
        assert!(matches!(
            parse_pose("not json"),
            Err(TrackerClientError::DeserializeError(_))
        ));
        assert!(matches!(
            parse_pose(r#"{"time_s": 1.5, "position_m": [0, 0], "attitude_q": [1, 0, 0, 0], "active": true}"#),
            Err(TrackerClientError::DeserializeError(_))
        ));
    }

    #[test]
    fn test_stream() {
        let stream = concat!(
            r#"{"time_s": 0.0, "position_m": [0.0, 0.0, 0.0], "attitude_q": [1, 0, 0, 0], "active": true}"#,
            "\n",
            "garbage\n",
            "\n",
            r#"{"time_s": 0.1, "position_m": [0.0, 0.0, 0.5], "attitude_q": [1, 0, 0, 0], "active": false}"#,
            "\n",
        );

        let handoff = PoseHandoff::new();
        let end_flag = Arc::new(AtomicBool::new(false));

        let client = TrackerClient::spawn(
            Cursor::new(stream.as_bytes().to_vec()),
            handoff.clone(),
            Some(end_flag.clone()),
        );

        while client.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(client.num_parse_errors(), 1);

        // The published pose is cleared once the stream ends
        client.join();
        assert!(end_flag.load(Ordering::Relaxed));
        assert_eq!(handoff.latest_pose(), None);
    }
}
