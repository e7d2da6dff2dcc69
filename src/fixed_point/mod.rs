//! Q15/Q31 fixed-point arithmetic
//!
//! A Q15 value is an `i16` read as `value / 32768`; Q31 is the same for `i32`.
//! All narrowing operations saturate instead of wrapping.

mod kernels;

pub use kernels::{Kernel, correlate_q15, dot_q15, fir_q15};

pub type Q15 = i16;
pub type Q31 = i32;

pub const Q15_ONE: i32 = 32768;
pub const Q15_MAX: Q15 = i16::MAX;

#[inline]
pub fn sat16(x: i64) -> Q15 {
    x.clamp(i16::MIN as i64, i16::MAX as i64) as Q15
}

#[inline]
pub fn sat32(x: i64) -> Q31 {
    x.clamp(i32::MIN as i64, i32::MAX as i64) as Q31
}

/// `(a * b) >> 15`, saturated. `-1.0 * -1.0` yields 32767.
#[inline]
pub fn q15_mul(a: Q15, b: Q15) -> Q15 {
    sat16((a as i64 * b as i64) >> 15)
}

#[inline]
pub fn q31_mul(a: Q31, b: Q31) -> Q31 {
    sat32((a as i64 * b as i64) >> 31)
}

#[inline]
pub fn q15_abs(x: Q15) -> Q15 {
    x.saturating_abs()
}

/// Round a float in [-1, 1] to Q15.
#[inline]
pub fn q15_from_f32(x: f32) -> Q15 {
    sat16((x as f64 * Q15_ONE as f64).round() as i64)
}

#[inline]
pub fn q15_to_f32(x: Q15) -> f32 {
    x as f32 / Q15_ONE as f32
}

/// Round a float coefficient to Q15 and convert back to `i32` for use in
/// wide accumulators.
#[inline]
pub fn coeff_q15(x: f64) -> i32 {
    (x * Q15_ONE as f64).round() as i32
}

/// Shift right with round-half-up, the usual way to drop fractional bits.
#[inline]
pub fn round_shift(x: i64, shift: u32) -> i64 {
    (x + (1 << (shift - 1))) >> shift
}

/// Multiply every sample by a Q15 gain in place.
pub fn scale_q15(samples: &mut [Q15], gain: Q15) {
    for s in samples.iter_mut() {
        *s = q15_mul(*s, gain);
    }
}

/// Saturating element-wise `dst += src` over the common length.
pub fn add_sat_q15(dst: &mut [Q15], src: &[Q15]) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d = d.saturating_add(*s);
    }
}
