//! # Haptic library.
//!
//! This library allows the executables and integration tests to access items defined inside the
//! haptic crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Actuator driver - talks to the motor board over a serial line
pub mod actuator_driver;

/// Signal filters - smoothing and glitch rejection for tracked positions
pub mod signal_filter;

/// Velocity estimator - finite difference speed of a scalar signal
pub mod vel_est;

/// Contact models - drums and springs which turn positions into torques
pub mod contact;

/// Haptic control module - turns pointer poses into a torque demand
pub mod haptic_ctrl;

/// Control loop - drives the haptic control and the actuator at a fixed rate
pub mod ctrl_loop;

/// Tracker client - reads pointer poses from a stream into a pose handoff
pub mod tracker_client;

/// Executable parameters - parameter files of the executables
pub mod params;
