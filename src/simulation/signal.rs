use std::f64::consts::PI;

use crate::fixed_point::{Q15, sat16};

/// Sine tone in Q15. `amplitude` is in Q15 units (32767 = full scale).
pub fn tone(freq_hz: f64, amplitude: f64, sample_rate: f64, len: usize) -> Vec<Q15> {
    multitone(&[(freq_hz, amplitude)], sample_rate, len)
}

/// Sum of sine tones given as `(frequency, amplitude)` pairs, saturated to
/// Q15.
pub fn multitone(tones: &[(f64, f64)], sample_rate: f64, len: usize) -> Vec<Q15> {
    (0..len)
        .map(|n| {
            let t = n as f64 / sample_rate;
            let v: f64 = tones
                .iter()
                .map(|&(f, a)| a * (2.0 * PI * f * t).sin())
                .sum();
            sat16(v.round() as i64)
        })
        .collect()
}

/// Host wire format: little-endian 16-bit samples.
pub fn to_le_bytes(samples: &[Q15]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_peak_and_zero_start() {
        let t = tone(1000.0, 10000.0, 24000.0, 24);
        assert_eq!(t[0], 0);
        assert_eq!(t[6], 10000);
        assert_eq!(t[18], -10000);
    }

    #[test]
    fn test_multitone_saturates() {
        let t = multitone(&[(1000.0, 30000.0), (1000.0, 30000.0)], 24000.0, 12);
        assert_eq!(t[6], i16::MAX);
    }

    #[test]
    fn test_le_bytes() {
        assert_eq!(to_le_bytes(&[0x0102, -1]), vec![0x02, 0x01, 0xFF, 0xFF]);
    }
}
