//! Exponential smoothing filters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::SVector;

use super::FilterError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Scalar exponential smoothing filter.
///
/// The first sample passes through unchanged, after which each output is
/// `alpha * sample + (1 - alpha) * previous_output`.
#[derive(Debug, Clone)]
pub struct ExpFilter {
    alpha: f64,
    forecast: Option<f64>,
}

/// Exponential smoothing applied to each component of a vector, all components sharing the same
/// coefficient.
#[derive(Debug, Clone)]
pub struct VectorExpFilter<const D: usize> {
    alpha: f64,
    forecast: Option<SVector<f64, D>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ExpFilter {
    pub fn new(alpha: f64) -> Result<Self, FilterError> {
        Ok(Self {
            alpha: check_alpha(alpha)?,
            forecast: None,
        })
    }

    /// Add a sample and get the filtered value.
    pub fn filter(&mut self, sample: f64) -> f64 {
        let out = match self.forecast {
            Some(f) => self.alpha * sample + (1.0 - self.alpha) * f,
            None => sample,
        };

        self.forecast = Some(out);
        out
    }

    /// Current filtered value, `None` before the first sample.
    pub fn value(&self) -> Option<f64> {
        self.forecast
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Forget all samples seen so far.
    pub fn reset(&mut self) {
        self.forecast = None;
    }
}

impl<const D: usize> VectorExpFilter<D> {
    pub fn new(alpha: f64) -> Result<Self, FilterError> {
        Ok(Self {
            alpha: check_alpha(alpha)?,
            forecast: None,
        })
    }

    /// Add a sample and get the filtered vector.
    pub fn filter(&mut self, sample: &SVector<f64, D>) -> SVector<f64, D> {
        let out = match self.forecast {
            Some(ref f) => sample * self.alpha + f * (1.0 - self.alpha),
            None => *sample,
        };

        self.forecast = Some(out);
        out
    }

    pub fn value(&self) -> Option<SVector<f64, D>> {
        self.forecast
    }

    pub fn reset(&mut self) {
        self.forecast = None;
    }
}

fn check_alpha(alpha: f64) -> Result<f64, FilterError> {
    if alpha > 0.0 && alpha <= 1.0 {
        Ok(alpha)
    } else {
        Err(FilterError::InvalidAlpha(alpha))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_alpha_range() {
        assert!(ExpFilter::new(1.0).is_ok());
        assert!(ExpFilter::new(0.01).is_ok());
        assert_eq!(ExpFilter::new(0.0).unwrap_err(), FilterError::InvalidAlpha(0.0));
        assert!(ExpFilter::new(1.5).is_err());
        assert!(ExpFilter::new(-0.5).is_err());
        assert!(ExpFilter::new(f64::NAN).is_err());
        assert!(VectorExpFilter::<3>::new(0.0).is_err());
    }

    #[test]
    fn test_first_sample_passes_through() {
        let mut f = ExpFilter::new(0.1).unwrap();
        assert_eq!(f.value(), None);
        assert_eq!(f.filter(7.25), 7.25);
        assert_eq!(f.value(), Some(7.25));
    }

    #[test]
    fn test_unit_alpha_is_identity() {
        let mut f = ExpFilter::new(1.0).unwrap();
        for x in [0.3, -2.0, 15.0, 0.0, 4.5] {
            assert_eq!(f.filter(x), x);
        }
    }

    #[test]
    fn test_blending() {
        let mut f = ExpFilter::new(0.25).unwrap();
        f.filter(0.0);

        let out = f.filter(4.0);
        assert_eq!(out, 1.0);

        // Each output lies strictly between the new sample and the previous output
        let mut prev = out;
        for x in [10.0, -3.0, 2.0, 2.0, 8.0] {
            let out = f.filter(x);
            let (lo, hi) = if x < prev { (x, prev) } else { (prev, x) };
            if lo != hi {
                assert!(out > lo && out < hi);
            }
            prev = out;
        }
    }

    #[test]
    fn test_reset() {
        let mut f = ExpFilter::new(0.5).unwrap();
        f.filter(1.0);
        f.filter(3.0);
        f.reset();
        assert_eq!(f.filter(-4.0), -4.0);
    }

    #[test]
    fn test_vector_filter() {
        let mut f = VectorExpFilter::<3>::new(0.5).unwrap();

        let first = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(f.filter(&first), first);

        let out = f.filter(&Vector3::new(3.0, 2.0, -1.0));
        assert_eq!(out, Vector3::new(2.0, 2.0, 1.0));

        f.reset();
        assert_eq!(f.value(), None);
    }
}
