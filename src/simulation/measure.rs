use std::f64::consts::PI;

use crate::fixed_point::Q15;

/// Least-squares fit of one tone to a block of samples
#[derive(Debug, Clone, Copy)]
pub struct ToneMeasurement {
    /// Peak amplitude in Q15 units
    pub amplitude: f64,
    /// Phase in radians relative to a sine starting at sample 0
    pub phase: f64,
    pub dc: f64,
    /// RMS of what the tone and DC do not explain
    pub residual_rms: f64,
}

impl ToneMeasurement {
    pub fn snr_db(&self) -> f64 {
        let signal = self.amplitude * self.amplitude / 2.0;
        let noise = (self.residual_rms * self.residual_rms).max(f64::MIN_POSITIVE);
        10.0 * (signal / noise).log10()
    }
}

/// Fit `dc + a*sin(wt) + b*cos(wt)`. Most accurate over a whole number of
/// cycles.
pub fn measure_tone(samples: &[Q15], freq_hz: f64, sample_rate: f64) -> ToneMeasurement {
    let n = samples.len().max(1) as f64;
    let w = 2.0 * PI * freq_hz / sample_rate;
    let dc = samples.iter().map(|&x| x as f64).sum::<f64>() / n;

    let (mut a, mut b) = (0.0, 0.0);
    for (k, &x) in samples.iter().enumerate() {
        let (s, c) = (w * k as f64).sin_cos();
        a += (x as f64 - dc) * s;
        b += (x as f64 - dc) * c;
    }
    a *= 2.0 / n;
    b *= 2.0 / n;

    let residual = samples
        .iter()
        .enumerate()
        .map(|(k, &x)| {
            let (s, c) = (w * k as f64).sin_cos();
            let e = x as f64 - dc - a * s - b * c;
            e * e
        })
        .sum::<f64>()
        / n;

    ToneMeasurement {
        amplitude: a.hypot(b),
        phase: b.atan2(a),
        dc,
        residual_rms: residual.sqrt(),
    }
}

pub fn rms(samples: &[Q15]) -> f64 {
    super::signal_power(samples).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::tone;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_measures_clean_tone() {
        let t = tone(1000.0, 12000.0, 24000.0, 2400);
        let m = measure_tone(&t, 1000.0, 24000.0);
        assert_abs_diff_eq!(m.amplitude, 12000.0, epsilon = 2.0);
        assert_abs_diff_eq!(m.phase, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(m.dc, 0.0, epsilon = 0.5);
        assert!(m.snr_db() > 70.0);
    }

    #[test]
    fn test_rms_of_square() {
        assert_abs_diff_eq!(rms(&[100, -100, 100, -100]), 100.0, epsilon = 1e-9);
        assert_eq!(rms(&[]), 0.0);
    }
}
