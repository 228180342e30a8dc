//! # Contact models
//!
//! Contact models turn a position into a reaction torque:
//!
//! - [`Drum`] - a horizontal rectangular surface struck from above by the tracked drumstick. A
//!   strike also produces a [`ContactEvent`](haptic_if::trigger::ContactEvent) for the
//!   synthesiser.
//! - [`RotarySpring`] - a virtual wall on the actuator's own encoder angle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod drum;
mod params;
mod spring;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use drum::*;
pub use params::*;
pub use spring::*;
