//! Speed limited glitch rejection filter

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::FilterError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Holds the last accepted value whenever a new sample implies a speed above the cutoff.
///
/// The reference sample used to compute the speed always advances, so a glitch only ever
/// rejects the samples on either side of a jump.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    cutoff: f64,

    /// Last sample seen, as (value, time_s)
    last: Option<(f64, f64)>,

    last_filtered: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LowPassFilter {
    /// Create a filter rejecting speeds greater than `cutoff` (units of the value per second).
    pub fn new(cutoff: f64) -> Result<Self, FilterError> {
        if !(cutoff > 0.0) {
            return Err(FilterError::InvalidCutoff(cutoff))
        }

        Ok(Self {
            cutoff,
            last: None,
            last_filtered: 0.0,
        })
    }

    /// Add a sample taken at `time_s` and get the filtered value.
    pub fn filter(&mut self, value: f64, time_s: f64) -> f64 {
        let accept = match self.last {
            None => true,
            Some((last_value, last_time_s)) => {
                let dt = time_s - last_time_s;
                dt > 0.0 && ((value - last_value) / dt).abs() <= self.cutoff
            }
        };

        self.last = Some((value, time_s));

        if accept {
            self.last_filtered = value;
        }

        self.last_filtered
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.last_filtered = 0.0;
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cutoff_validation() {
        assert!(LowPassFilter::new(0.0).is_err());
        assert!(LowPassFilter::new(-1.0).is_err());
        assert!(LowPassFilter::new(f64::NAN).is_err());
        assert!(LowPassFilter::new(5.0).is_ok());
    }

    #[test]
    fn test_rejects_glitch() {
        let mut f = LowPassFilter::new(5.0).unwrap();

        assert_eq!(f.filter(0.10, 0.00), 0.10);
        assert_eq!(f.filter(0.12, 0.01), 0.12);

        // A 1 m jump in 10 ms is held
        assert_eq!(f.filter(1.12, 0.02), 0.12);

        // Back down again, still too fast relative to the glitch
        assert_eq!(f.filter(0.13, 0.03), 0.12);

        // Normal motion resumes
        assert_eq!(f.filter(0.14, 0.04), 0.14);
    }

    #[test]
    fn test_non_increasing_time_rejected() {
        let mut f = LowPassFilter::new(5.0).unwrap();
        f.filter(0.5, 1.0);

        assert_eq!(f.filter(0.51, 1.0), 0.5);
        assert_eq!(f.filter(0.52, 0.9), 0.5);

        f.reset();
        assert_eq!(f.filter(2.0, 0.0), 2.0);
    }
}
