//! Inner-product kernels shared by the FIR stages.
//!
//! There is one algorithm per kernel. The accelerated path only replaces the
//! multiply-accumulate loop and must agree with the scalar path bit-for-bit,
//! which holds because every product and partial sum is exact in `i64`.

use std::sync::OnceLock;

use super::{Q15, sat16};

/// Implementation of the multiply-accumulate inner loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Scalar,
    #[cfg(target_arch = "aarch64")]
    Neon,
}

impl Kernel {
    /// Best kernel the running CPU supports, probed once per process.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<Kernel> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            #[cfg(target_arch = "aarch64")]
            {
                if std::arch::is_aarch64_feature_detected!("neon") {
                    log::debug!("Using NEON dot-product kernel");
                    return Kernel::Neon;
                }
            }
            log::debug!("Using scalar dot-product kernel");
            Kernel::Scalar
        })
    }

    /// Exact dot product over the common length of `a` and `b`.
    #[inline]
    pub fn dot_q15(self, a: &[Q15], b: &[Q15]) -> i64 {
        match self {
            Kernel::Scalar => scalar_dot(a, b),
            #[cfg(target_arch = "aarch64")]
            // SAFETY: `Neon` is only produced after runtime feature detection.
            Kernel::Neon => unsafe { neon::dot(a, b) },
        }
    }
}

#[inline]
fn scalar_dot(a: &[Q15], b: &[Q15]) -> i64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x as i32 * y as i32)
        .fold(0i64, |acc, p| acc + p as i64)
}

#[cfg(target_arch = "aarch64")]
mod neon {
    use std::arch::aarch64::*;

    use super::Q15;

    #[target_feature(enable = "neon")]
    pub unsafe fn dot(a: &[Q15], b: &[Q15]) -> i64 {
        let n = a.len().min(b.len());
        let lanes = n / 8;
        let mut sum = unsafe {
            let mut acc = vdupq_n_s64(0);
            for c in 0..lanes {
                let va = vld1q_s16(a.as_ptr().add(c * 8));
                let vb = vld1q_s16(b.as_ptr().add(c * 8));
                acc = vpadalq_s32(acc, vmull_s16(vget_low_s16(va), vget_low_s16(vb)));
                acc = vpadalq_s32(acc, vmull_high_s16(va, vb));
            }
            vaddvq_s64(acc)
        };
        for i in lanes * 8..n {
            sum += a[i] as i64 * b[i] as i64;
        }
        sum
    }
}

/// Exact dot product with the detected kernel.
#[inline]
pub fn dot_q15(a: &[Q15], b: &[Q15]) -> i64 {
    Kernel::detect().dot_q15(a, b)
}

/// Block FIR filter with Q15 output.
///
/// `taps_rev` holds the impulse response in reverse order and `input` carries
/// `taps_rev.len() - 1` samples of history in front of the new block, so
/// `out[n]` is the dot product of `input[n..n + taps]` with `taps_rev`.
pub fn fir_q15(taps_rev: &[Q15], input: &[Q15], out: &mut [Q15]) -> usize {
    if taps_rev.is_empty() || input.len() < taps_rev.len() {
        return 0;
    }
    let kernel = Kernel::detect();
    let count = out.len().min(input.len() + 1 - taps_rev.len());
    for (n, y) in out.iter_mut().take(count).enumerate() {
        *y = sat16(kernel.dot_q15(&input[n..n + taps_rev.len()], taps_rev) >> 15);
    }
    count
}

/// Sliding correlation of `pattern` against `signal`, one value per lag.
pub fn correlate_q15(signal: &[Q15], pattern: &[Q15], out: &mut [i64]) -> usize {
    if pattern.is_empty() || signal.len() < pattern.len() {
        return 0;
    }
    let kernel = Kernel::detect();
    let count = out.len().min(signal.len() + 1 - pattern.len());
    for (lag, c) in out.iter_mut().take(count).enumerate() {
        *c = kernel.dot_q15(&signal[lag..lag + pattern.len()], pattern);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_matches_scalar_reference() {
        let a: Vec<i16> = (0..37).map(|i| ((i * 7919) % 65536 - 32768) as i16).collect();
        let b: Vec<i16> = (0..37).map(|i| ((i * 104729) % 65536 - 32768) as i16).collect();
        let reference: i64 = a.iter().zip(&b).map(|(&x, &y)| x as i64 * y as i64).sum();
        assert_eq!(Kernel::Scalar.dot_q15(&a, &b), reference);
        assert_eq!(Kernel::detect().dot_q15(&a, &b), reference);
    }

    #[test]
    fn test_dot_extreme_values_do_not_overflow() {
        let a = vec![i16::MIN; 1000];
        let b = vec![i16::MIN; 1000];
        assert_eq!(dot_q15(&a, &b), 1000 * (1i64 << 30));
    }

    #[test]
    fn test_dot_uses_common_length() {
        assert_eq!(dot_q15(&[1, 2, 3], &[4, 5]), 14);
        assert_eq!(dot_q15(&[], &[4, 5]), 0);
    }

    #[test]
    fn test_fir_impulse_response() {
        // Taps [0.5, 0.25] reversed, one sample of zero history.
        let taps_rev = [8192, 16384];
        let input = [0, 32767, 0, 0];
        let mut out = [0i16; 3];
        assert_eq!(fir_q15(&taps_rev, &input, &mut out), 3);
        assert_eq!(out, [16383, 8191, 0]);
    }

    #[test]
    fn test_correlate_finds_pattern() {
        let pattern = [1000, -1000, 1000];
        let mut signal = vec![0i16; 20];
        signal[9..12].copy_from_slice(&pattern);
        let mut corr = vec![0i64; 20];
        let n = correlate_q15(&signal, &pattern, &mut corr);
        assert_eq!(n, 18);
        let best = (0..n).max_by_key(|&i| corr[i]).unwrap();
        assert_eq!(best, 9);
    }
}
