//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Return the euclidian norm (distance between) of two points.
///
/// If the points do not have the same number of dimentions then `None` is 
/// returned.
pub fn norm<T>(point_0: &[T], point_1: &[T]) -> Option<T> 
where
    T: Float + std::ops::AddAssign
{
    // Check that the dimentions match
    if point_0.len() != point_1.len() {
        return None;
    }

    // Sum all elements of the points
    let mut sum = T::zero();

    for i in 0..point_0.len() {
        sum += (point_0[i] - point_1[i]).powi(2);
    }

    // Return the squareroot of the sum
    Some(sum.sqrt())
}

/// Clamp a value between `min` and `max`.
///
/// The bounds may be given in either order.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T 
where
    T: Float
{
    let (lo, hi) = if min <= max { (*min, *max) } else { (*max, *min) };
    let mut ret = *value;

    if ret > hi {
        ret = hi
    }
    if ret < lo {
        ret = lo
    }

    ret
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
/// 
/// This function is taken from the std library as num is missing it.
///
/// In particular, the return value `r` satisfies `0.0 <= r < rhs.abs()` in
/// most cases. However, due to a floating point round-off error it can
/// result in `r == rhs.abs()`, violating the mathematical definition, if
/// `self` is much smaller than `rhs.abs()` in magnitude and `self < 0.0`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle into the range [-pi, pi].
pub fn normalise_angle<T>(angle_rad: T) -> T
where
    T: Float
{
    let pi_t = T::from(std::f64::consts::PI).unwrap();
    let tau_t = T::from(std::f64::consts::TAU).unwrap();

    if angle_rad >= -pi_t && angle_rad <= pi_t {
        return angle_rad
    }

    rem_euclid(angle_rad + pi_t, tau_t) - pi_t
}

/// Convert degrees to radians.
pub fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// Convert radians to degrees.
pub fn rad_to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Convert revolutions to degrees.
pub fn rev_to_deg(rev: f64) -> f64 {
    rev * 360.0
}

/// Convert revolutions to radians.
pub fn rev_to_rad(rev: f64) -> f64 {
    rev * std::f64::consts::TAU
}

#[cfg(test)]
mod test {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 8.0), (0.0, 3.0), 4.0), 1.5);
        // Reversed target range
        assert_eq!(lin_map((0.0, 1.0), (500.0, 0.0), 0.0), 500.0);
        assert_eq!(lin_map((0.0, 1.0), (500.0, 0.0), 1.0), 0.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&2.0, &0.0, &1.5), 1.5);
        assert_eq!(clamp(&-2.0, &0.0, &1.5), 0.0);
        assert_eq!(clamp(&1.0, &1.5, &0.0), 1.0);
        assert_eq!(clamp(&-1000.0, &-0.5, &0.5), -0.5);
    }

    #[test]
    fn test_norm() {
        assert_eq!(norm(&[0.0, 0.0], &[3.0, 4.0]), Some(5.0));
        assert_eq!(norm(&[0.0, 0.0], &[3.0]), None);
    }

    #[test]
    fn test_normalise_angle() {
        assert_eq!(normalise_angle(1.0), 1.0);
        assert!((normalise_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((normalise_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert!((normalise_angle(4.0 * PI + 0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(rev_to_deg(0.25), 90.0);
        assert!((rev_to_rad(0.5) - PI).abs() < 1e-12);
        assert!((deg_to_rad(180.0) - PI).abs() < 1e-12);
        assert!((rad_to_deg(PI) - 180.0).abs() < 1e-12);
    }
}
