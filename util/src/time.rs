//! General time utility functions

use chrono;
use std::time::Duration;

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    if let Some(ns) = duration.num_nanoseconds() {
        Some(ns as f64 / NANOS_PER_SECOND as f64)
    }
    else {
        None
    }
}

/// Get the time remaining in a cycle of `period_s` seconds which has already
/// lasted `elapsed`.
///
/// Returns `Err` with the overrun in seconds if the cycle took longer than the
/// period. A negative or non-finite period has no remainder, the whole cycle is
/// the overrun.
pub fn cycle_remainder(period_s: f64, elapsed: Duration) -> Result<Duration, f64> {
    if !(period_s.is_finite() && period_s >= 0.0) {
        return Err(elapsed.as_secs_f64())
    }

    let period = Duration::from_secs_f64(period_s);

    match period.checked_sub(elapsed) {
        Some(d) => Ok(d),
        None => Err(elapsed.as_secs_f64() - period.as_secs_f64())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duration_to_seconds() {
        let d = chrono::Duration::milliseconds(1500);
        assert_eq!(duration_to_seconds(d), Some(1.5));
    }

    #[test]
    fn test_cycle_remainder() {
        let rem = cycle_remainder(0.01, Duration::from_millis(4)).unwrap();
        assert_eq!(rem, Duration::from_millis(6));

        let overrun = cycle_remainder(0.01, Duration::from_millis(15)).unwrap_err();
        assert!((overrun - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_remainder_invalid_period() {
        let elapsed = Duration::from_millis(3);

        for period_s in [-0.002, f64::NAN, f64::INFINITY] {
            let overrun = cycle_remainder(period_s, elapsed).unwrap_err();
            assert!((overrun - 0.003).abs() < 1e-9);
        }
    }
}
