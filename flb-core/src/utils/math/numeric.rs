//! Scalar helpers shared by the mapping and the actuator drivers.

/// Restrict `value` to `[lo, hi]`.
///
/// The caller guarantees `lo <= hi`; unlike [`f32::clamp`] this never panics
/// on inverted bounds, it simply favours `lo`.
#[inline]
pub fn clamp(
    value: f32,
    lo: f32,
    hi: f32,
) -> f32 {
    value.min(hi).max(lo)
}

/// Sign of `value` as `-1.0`, `0.0` or `1.0`.
///
/// Zero (of either sign) and NaN map to `0.0`.
#[inline]
pub fn sign(value: f32) -> f32 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}
