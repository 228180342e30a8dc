//! # Signal filters
//!
//! Tracked positions are noisy, so they are smoothed before being used to compute forces:
//!
//! - [`ExpFilter`] and [`VectorExpFilter`] apply exponential smoothing to a scalar or to every
//!   component of a vector,
//! - [`LowPassFilter`] rejects samples implying an impossible speed, which is how tracking
//!   glitches show up.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod exp_filter;
mod low_pass;

// ---------------------------------------------------------------------------
// EXPORTS
// ---------------------------------------------------------------------------

pub use exp_filter::*;
pub use low_pass::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("Smoothing coefficient must be in (0, 1], found {0}")]
    InvalidAlpha(f64),

    #[error("Speed cutoff must be positive, found {0}")]
    InvalidCutoff(f64),
}
