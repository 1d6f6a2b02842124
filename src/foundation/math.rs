use crate::foundation::core::Affine;

/// `x * y / 255`, rounded to nearest.
#[inline(always)]
pub(crate) fn mul_div255(x: u32, y: u32) -> u32 {
    (x * y + 127) / 255
}

/// Normalizes a value scaled by 255 back to 8 bits.
#[inline(always)]
pub(crate) fn norm1(v: u32) -> u32 {
    (v + 127) / 255
}

/// Normalizes a value scaled by 255^2 back to 8 bits.
#[inline(always)]
pub(crate) fn norm2(v: u32) -> u32 {
    (v + 32_512) / 65_025
}

/// `num / den` rounded to nearest. `den` must be non-zero.
#[inline(always)]
pub(crate) fn div_round(num: u64, den: u64) -> u64 {
    (num + den / 2) / den
}

/// Premultiplies one straight channel by `a`: `c * a / 255`, rounded.
#[inline(always)]
pub fn premultiply(c: u8, a: u8) -> u8 {
    mul_div255(u32::from(c), u32::from(a)) as u8
}

/// Recovers a straight channel from a premultiplied one: `c * 255 / a`, rounded.
///
/// Returns 0 for `a == 0`; out-of-range inputs (`c > a`) saturate at 255.
#[inline(always)]
pub fn demultiply(c: u8, a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    let a = u32::from(a);
    ((u32::from(c) * 255 + a / 2) / a).min(255) as u8
}

/// Maps a unit-interval value to 0..=255, clamping and rounding.
pub fn unit_to_u8(v: f32) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Linear expansion factor of an affine map, `sqrt(|det|)`.
pub fn expansion(a: &Affine) -> f64 {
    a.determinant().abs().sqrt()
}

/// Whether `a` only translates (linear part is the identity within `eps`).
pub fn is_translation(a: &Affine, eps: f64) -> bool {
    let [xx, yx, xy, yy, _, _] = a.as_coeffs();
    (xx - 1.0).abs() <= eps && yx.abs() <= eps && xy.abs() <= eps && (yy - 1.0).abs() <= eps
}

/// The integer offset of `a` if it is a translation by whole pixels.
pub fn integer_translation(a: &Affine, eps: f64) -> Option<(i32, i32)> {
    if !is_translation(a, eps) {
        return None;
    }
    let t = a.translation();
    let (rx, ry) = (t.x.round(), t.y.round());
    let in_range = rx.abs() < f64::from(i32::MAX / 4) && ry.abs() < f64::from(i32::MAX / 4);
    ((t.x - rx).abs() <= eps && (t.y - ry).abs() <= eps && in_range)
        .then_some((rx as i32, ry as i32))
}

pub fn affine_near(a: &Affine, b: &Affine, eps: f64) -> bool {
    a.as_coeffs()
        .iter()
        .zip(b.as_coeffs().iter())
        .all(|(x, y)| (x - y).abs() <= eps)
}

/// Whether `a` collapses the plane (and so cannot be inverted meaningfully).
pub fn is_singular(a: &Affine, eps: f64) -> bool {
    a.determinant().abs() <= eps
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
