//! Haptic control module
//!
//! Turns the tracked pointer's pose into a torque demand on the actuator, and into trigger events
//! for the synthesiser when a drum is struck.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;
