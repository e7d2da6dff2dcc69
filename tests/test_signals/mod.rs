#![allow(dead_code)]

pub mod wire;

pub use wire::WireFrontend;

use sdrmodem::fixed_point::{Q15, correlate_q15};

/// Best normalized correlation of `pattern` against `signal` over lags
/// `0..=max_lag`, with the lag it occurred at.
pub fn best_correlation(signal: &[Q15], pattern: &[Q15], max_lag: usize) -> (usize, f64) {
    let mut raw = vec![0i64; max_lag + 1];
    let lags = correlate_q15(signal, pattern, &mut raw);
    let pattern_energy = energy(pattern);

    (0..lags)
        .map(|lag| {
            let window = &signal[lag..lag + pattern.len()];
            let norm = (energy(window) * pattern_energy).sqrt();
            let score = if norm > 0.0 { raw[lag] as f64 / norm } else { 0.0 };
            (lag, score)
        })
        .fold((0, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
}

fn energy(x: &[Q15]) -> f64 {
    x.iter().map(|&v| v as f64 * v as f64).sum()
}
