//! # Haptics interface crate.
//!
//! Provides the interfaces between the haptic control software and its
//! collaborators: the actuator board, the pose tracker and the percussion
//! synthesiser.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Command and response definitions for equipment (the actuator board)
pub mod eqpt;

/// Tracked pointer poses and the handoff between the tracker and the control loop
pub mod pose;

/// Contact trigger messages sent to the percussion synthesiser
pub mod trigger;
