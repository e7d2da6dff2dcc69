use std::f64::consts::PI;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::fixed_point::{Q15, sat16};

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct NoiseConfig {
    pub seed: Option<u64>,
    pub additive: Option<AdditiveNoiseConfig>,
    pub frequency_offset: Option<FrequencyOffsetConfig>,
}

impl NoiseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_awgn(mut self, snr_db: f32) -> Self {
        self.additive = Some(AdditiveNoiseConfig { snr_db });
        self
    }

    pub fn with_frequency_offset(mut self, offset_hz: f32) -> Self {
        self.frequency_offset = Some(FrequencyOffsetConfig { offset_hz });
        self
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct AdditiveNoiseConfig {
    pub snr_db: f32,
}

/// Carrier error between transmitter and receiver
#[derive(Clone, Debug, serde::Deserialize)]
pub struct FrequencyOffsetConfig {
    pub offset_hz: f32,
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

/// Mean square in Q15 units.
pub fn signal_power(signal: &[Q15]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|&x| x as f64 * x as f64).sum::<f64>() / signal.len() as f64
}

fn noise_source(power: f64, snr_db: f32) -> Option<Normal<f64>> {
    if power == 0.0 {
        return None;
    }
    let noise_power = power / 10f64.powf(snr_db as f64 / 10.0);
    Normal::new(0.0, noise_power.sqrt()).ok()
}

/// Add white Gaussian noise to baseband audio.
pub fn apply_audio_noise(clean: &[Q15], config: &NoiseConfig) -> Vec<Q15> {
    let mut rng = create_rng(config.seed);
    let normal = config
        .additive
        .as_ref()
        .and_then(|a| noise_source(signal_power(clean), a.snr_db));
    clean
        .iter()
        .map(|&x| match &normal {
            Some(n) => sat16((x as f64 + n.sample(&mut rng)).round() as i64),
            None => x,
        })
        .collect()
}

/// Rotate I/Q by the configured frequency offset, then add complex white
/// Gaussian noise at the configured SNR (split evenly over both rails).
pub fn apply_iq_impairments(
    i: &[Q15],
    q: &[Q15],
    config: &NoiseConfig,
    sample_rate: f64,
) -> (Vec<Q15>, Vec<Q15>) {
    let mut rng = create_rng(config.seed);
    let count = i.len().min(q.len());
    let step = config
        .frequency_offset
        .as_ref()
        .map_or(0.0, |f| 2.0 * PI * f.offset_hz as f64 / sample_rate);

    let mut out_i = Vec::with_capacity(count);
    let mut out_q = Vec::with_capacity(count);
    for n in 0..count {
        let (s, c) = (step * n as f64).sin_cos();
        let (x, y) = (i[n] as f64, q[n] as f64);
        out_i.push(x * c - y * s);
        out_q.push(x * s + y * c);
    }

    let power = (signal_power(&i[..count]) + signal_power(&q[..count])) / 2.0;
    if let Some(normal) = config
        .additive
        .as_ref()
        .and_then(|a| noise_source(power, a.snr_db))
    {
        for v in out_i.iter_mut().chain(out_q.iter_mut()) {
            *v += normal.sample(&mut rng);
        }
    }

    let quantize = |v: Vec<f64>| v.into_iter().map(|x| sat16(x.round() as i64)).collect();
    (quantize(out_i), quantize(out_q))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::tone;

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let clean = tone(1000.0, 10000.0, 24000.0, 2400);
        let config = NoiseConfig::default().with_seed(7).with_awgn(20.0);
        let a = apply_audio_noise(&clean, &config);
        let b = apply_audio_noise(&clean, &config);
        assert_eq!(a, b);
        assert_ne!(a, clean);
    }

    #[test]
    fn test_awgn_hits_requested_snr() {
        let clean = tone(1000.0, 10000.0, 24000.0, 24000);
        let noisy = apply_audio_noise(&clean, &NoiseConfig::default().with_seed(1).with_awgn(10.0));
        let noise: Vec<Q15> = noisy.iter().zip(&clean).map(|(&n, &c)| n - c).collect();
        let snr = 10.0 * (signal_power(&clean) / signal_power(&noise)).log10();
        assert!((snr - 10.0).abs() < 0.5, "{}", snr);
    }

    #[test]
    fn test_frequency_offset_rotates_constant_carrier() {
        let i = vec![10000; 96];
        let q = vec![0; 96];
        let config = NoiseConfig::default().with_frequency_offset(1000.0);
        let (ri, rq) = apply_iq_impairments(&i, &q, &config, 96000.0);
        // Quarter turn after 24 samples at 1 kHz / 96 kHz.
        assert!(ri[24].abs() <= 1);
        assert_eq!(rq[24], 10000);
    }

    #[test]
    fn test_silence_gets_no_noise() {
        let silent = vec![0; 100];
        let out = apply_audio_noise(&silent, &NoiseConfig::default().with_awgn(0.0));
        assert_eq!(out, silent);
    }
}
