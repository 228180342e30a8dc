//! # Actuator driver module
//!
//! This module talks to the ODrive motor board driving the haptic actuator. It sends torque
//! demands and mode changes, and reads back the encoder, current and bus voltage, keeping the
//! last known good value of each.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod params;
pub mod state;
pub mod transport;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;
pub use transport::*;
