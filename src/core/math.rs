//! Scalar helpers for 3D rigid body operations.

/// Tolerance below which a quaternion norm is treated as degenerate.
pub const NORM_EPSILON: f64 = 1e-12;

/// Dot product above which slerp falls back to normalized lerp.
pub const SLERP_LINEAR_THRESHOLD: f64 = 0.9995;

/// Linear interpolation between two scalars.
///
/// `t` should be in [0, 1] where 0 returns `a` and 1 returns `b`.
#[inline]
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Fraction of the way `value` lies between `start` and `end`.
///
/// Returns 0 when the interval is empty. Differences are taken in `i128`
/// so timestamps spanning the whole `i64` range do not overflow.
#[inline]
pub fn interpolation_factor(start: i64, end: i64, value: i64) -> f64 {
    if end == start {
        return 0.0;
    }
    let offset = i128::from(value) - i128::from(start);
    let span = i128::from(end) - i128::from(start);
    offset as f64 / span as f64
}
