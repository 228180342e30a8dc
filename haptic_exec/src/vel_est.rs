//! # Velocity estimator
//!
//! Finite difference estimate of the speed of a scalar signal, used to measure how fast the
//! drumstick is moving vertically when it strikes.

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct VelocityEstimator {
    /// Previous sample as (value, time_s)
    last: Option<(f64, f64)>,

    last_estimate: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl VelocityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the speed (absolute rate of change) of `position` sampled at `time_s`.
    ///
    /// Returns zero on the first sample. If time has not advanced since the previous sample the
    /// previous estimate is returned and the reference is kept.
    pub fn estimate(&mut self, position: f64, time_s: f64) -> f64 {
        let (last_position, last_time_s) = match self.last {
            Some(l) => l,
            None => {
                self.last = Some((position, time_s));
                return 0.0
            }
        };

        let dt = time_s - last_time_s;
        if dt <= 0.0 {
            return self.last_estimate
        }

        self.last_estimate = (position - last_position).abs() / dt;
        self.last = Some((position, time_s));

        self.last_estimate
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_estimate() {
        let mut v = VelocityEstimator::new();

        assert_eq!(v.estimate(0.5, 10.0), 0.0);
        assert!((v.estimate(0.4, 10.1) - 1.0).abs() < 1e-9);
        assert!((v.estimate(0.6, 10.2) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_dt() {
        let mut v = VelocityEstimator::new();
        v.estimate(0.0, 1.0);
        let est = v.estimate(0.5, 1.5);

        // Repeated and backwards times keep the previous estimate and reference
        assert_eq!(v.estimate(2.0, 1.5), est);
        assert_eq!(v.estimate(2.0, 1.2), est);
        assert!((v.estimate(1.0, 2.0) - 1.0).abs() < 1e-9);

        v.reset();
        assert_eq!(v.estimate(3.0, 0.0), 0.0);
    }
}
