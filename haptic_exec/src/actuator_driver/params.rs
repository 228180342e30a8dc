//! # Actuator driver parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Params {
    /// Maximum time allowed to write a command line.
    ///
    /// Units: milliseconds
    pub write_timeout_ms: u64,

    /// Maximum time to wait for the response to a query.
    ///
    /// Units: milliseconds
    pub read_timeout_ms: u64,

    /// Magnitude of the largest torque which will be sent to the board.
    ///
    /// Units: Newton meters
    pub torque_limit_nm: f64,
}

#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Timeouts must be greater than zero")]
    ZeroTimeout,

    #[error("The torque limit must be finite and positive, found {0}")]
    InvalidTorqueLimit(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            write_timeout_ms: 10,
            read_timeout_ms: 20,
            torque_limit_nm: 1.5,
        }
    }
}

impl Params {
    /// Determines if the parameters are valid.
    pub fn are_valid(&self) -> Result<(), ParamsError> {
        if self.write_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(ParamsError::ZeroTimeout)
        }

        if !self.torque_limit_nm.is_finite() || self.torque_limit_nm <= 0.0 {
            return Err(ParamsError::InvalidTorqueLimit(self.torque_limit_nm))
        }

        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(Params::default().are_valid().is_ok());

        let p = Params { read_timeout_ms: 0, ..Default::default() };
        assert!(matches!(p.are_valid(), Err(ParamsError::ZeroTimeout)));

        let p = Params { torque_limit_nm: f64::NAN, ..Default::default() };
        assert!(matches!(p.are_valid(), Err(ParamsError::InvalidTorqueLimit(_))));

        let p: Params = util::params::from_str(
            "write_timeout_ms = 5\nread_timeout_ms = 30\ntorque_limit_nm = 2.0\n"
        ).unwrap();
        assert_eq!(p.read_timeout(), Duration::from_millis(30));
        assert_eq!(p.torque_limit_nm, 2.0);
    }
}
