use crate::error::Result;
use crate::fixed_point::Q15;

use super::validate_rates;

const LUT_BITS: u32 = 14;
const LUT_SIZE: usize = 1 << LUT_BITS;
const LUT_MASK: usize = LUT_SIZE - 1;

/// Phase-accumulating FM modulator.
///
/// The phase is a wrapping `u64` where a full turn is `2^64`, so the wrap
/// into `[0, 2pi)` is free. Each baseband sample `s` (read as `s / 32768`)
/// advances it by `s * sensitivity`. Output I/Q come from a quantized sine
/// table scaled to 32767.
pub struct FmModulator {
    sample_rate: f64,
    deviation_hz: f64,
    /// Phase increment per Q15 step, in turns * 2^64
    step: i64,
    phase: u64,
    sine: Box<[Q15; LUT_SIZE]>,
}

impl FmModulator {
    pub fn new(sample_rate: f64, deviation_hz: f64) -> Result<Self> {
        validate_rates(sample_rate, deviation_hz)?;

        let mut sine = Box::new([0 as Q15; LUT_SIZE]);
        for (i, s) in sine.iter_mut().enumerate() {
            let angle = 2.0 * std::f64::consts::PI * i as f64 / LUT_SIZE as f64;
            *s = (angle.sin() * 32767.0).round() as Q15;
        }

        // One Q15 step of input moves deviation/fs turns / 32768.
        let step = (deviation_hz / sample_rate * (1u64 << 49) as f64).round() as i64;

        Ok(Self {
            sample_rate,
            deviation_hz,
            step,
            phase: 0,
            sine,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn deviation(&self) -> f64 {
        self.deviation_hz
    }

    /// Radians of phase advance for a full-scale input sample.
    pub fn sensitivity(&self) -> f64 {
        2.0 * std::f64::consts::PI * self.deviation_hz / self.sample_rate
    }

    /// Current carrier phase in radians, `[0, 2pi)`.
    pub fn phase(&self) -> f64 {
        self.phase as f64 / 2f64.powi(64) * 2.0 * std::f64::consts::PI
    }

    /// Modulate `input` into `out_i`/`out_q` and return the number of I/Q
    /// pairs written (the shortest of the three slices).
    ///
    /// Phase carries across calls, so consecutive blocks form one continuous
    /// carrier.
    pub fn modulate(&mut self, input: &[Q15], out_i: &mut [Q15], out_q: &mut [Q15]) -> usize {
        let count = input.len().min(out_i.len()).min(out_q.len());
        let quarter = LUT_SIZE / 4;
        let half_bin = 1u64 << (63 - LUT_BITS);

        for ((&s, i), q) in input.iter().zip(out_i.iter_mut()).zip(out_q.iter_mut()) {
            self.phase = self.phase.wrapping_add((s as i64 * self.step) as u64);
            let index = (self.phase.wrapping_add(half_bin) >> (64 - LUT_BITS)) as usize;
            *q = self.sine[index];
            *i = self.sine[(index + quarter) & LUT_MASK];
        }
        count
    }

    /// Zero the phase accumulator. The table is kept.
    pub fn reset(&mut self) {
        self.phase = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(FmModulator::new(0.0, 5000.0).is_err());
        assert!(FmModulator::new(24000.0, 0.0).is_err());
        assert!(FmModulator::new(24000.0, 12000.0).is_err());
        assert!(FmModulator::new(24000.0, 5000.0).is_ok());
    }

    #[test]
    fn test_sensitivity() {
        let m = FmModulator::new(24000.0, 5000.0).unwrap();
        assert_abs_diff_eq!(m.sensitivity(), 2.0 * std::f64::consts::PI * 5000.0 / 24000.0, epsilon = 1e-12);
    }

    #[test]
    fn test_silence_is_unmodulated_carrier() {
        let mut m = FmModulator::new(24000.0, 5000.0).unwrap();
        let mut i = [0i16; 16];
        let mut q = [0i16; 16];
        assert_eq!(m.modulate(&[0; 16], &mut i, &mut q), 16);
        assert!(i.iter().all(|&v| v == 32767));
        assert!(q.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_constant_input_advances_phase_linearly() {
        let mut m = FmModulator::new(24000.0, 5000.0).unwrap();
        let mut i = [0i16; 10];
        let mut q = [0i16; 10];
        m.modulate(&[16384; 10], &mut i, &mut q);
        // Half-scale input: 2500 Hz offset, 10 samples.
        let expected = (2.0 * std::f64::consts::PI * 2500.0 * 10.0 / 24000.0)
            .rem_euclid(2.0 * std::f64::consts::PI);
        assert_abs_diff_eq!(m.phase(), expected, epsilon = 1e-6);

        let angle = (q[9] as f64).atan2(i[9] as f64).rem_euclid(2.0 * std::f64::consts::PI);
        assert_abs_diff_eq!(angle, expected, epsilon = 1e-3);
    }

    #[test]
    fn test_constant_envelope() {
        let mut m = FmModulator::new(48000.0, 5000.0).unwrap();
        let input: Vec<i16> = (0..500).map(|n| ((n * 131) % 60000 - 30000) as i16).collect();
        let mut i = vec![0i16; 500];
        let mut q = vec![0i16; 500];
        m.modulate(&input, &mut i, &mut q);
        for (a, b) in i.iter().zip(&q) {
            let mag = ((*a as f64).powi(2) + (*b as f64).powi(2)).sqrt();
            assert!((mag - 32767.0).abs() < 3.0, "magnitude {}", mag);
        }
    }

    #[test]
    fn test_phase_continuous_across_calls() {
        let input: Vec<i16> = (0..64).map(|n| (n * 300) as i16).collect();

        let mut whole = FmModulator::new(96000.0, 5000.0).unwrap();
        let (mut wi, mut wq) = (vec![0i16; 64], vec![0i16; 64]);
        whole.modulate(&input, &mut wi, &mut wq);

        let mut split = FmModulator::new(96000.0, 5000.0).unwrap();
        let (mut si, mut sq) = (vec![0i16; 64], vec![0i16; 64]);
        split.modulate(&input[..20], &mut si[..20], &mut sq[..20]);
        split.modulate(&input[20..], &mut si[20..], &mut sq[20..]);

        assert_eq!(wi, si);
        assert_eq!(wq, sq);
    }

    #[test]
    fn test_reset_zeroes_phase() {
        let mut m = FmModulator::new(24000.0, 5000.0).unwrap();
        m.modulate(&[20000; 7], &mut [0; 7], &mut [0; 7]);
        assert!(m.phase() > 0.0);
        m.reset();
        assert_eq!(m.phase(), 0.0);
    }
}
