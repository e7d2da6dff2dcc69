//! Prototype low-pass design for the rational resampler.

use pm_remez::{BandSetting, constant, pm_parameters, pm_remez};

use crate::constants::FM_SAMPLE_RATE;
use crate::error::{ModemError, Result};
use crate::fixed_point::{Q15, Q15_ONE, sat16};

/// Upper edge of the audio passband
pub const PASSBAND_HZ: f64 = 6_000.0;

/// Start of the stopband, chosen so nothing above it aliases below
/// `PASSBAND_HZ` when folding about the 12 kHz baseband Nyquist
pub const STOPBAND_HZ: f64 = FM_SAMPLE_RATE as f64 - PASSBAND_HZ;

const STOPBAND_ATTENUATION_DB: f64 = 60.0;
const MIN_TAPS_PER_PHASE: usize = 12;

/// Parks-McClellan gets slow and fragile well before this
const MAX_REMEZ_TAPS: usize = 1024;

/// Low-pass specification at the interpolated rate
#[derive(Debug, Clone, Copy)]
pub struct LowpassSpec {
    pub sample_rate: f64,
    pub passband_hz: f64,
    pub stopband_hz: f64,
    pub num_taps: usize,
    /// DC gain
    pub gain: f64,
}

impl LowpassSpec {
    /// Prototype for a resampler that interpolates `input_rate` by
    /// `interpolation`. The band edges are fixed by the baseband rate, so the
    /// decimation factor does not enter the design.
    ///
    /// The tap count follows the usual `A / (22 * df)` estimate and is rounded
    /// up to a whole number of taps per polyphase branch. DC gain is
    /// `interpolation` to make up for the zero-stuffing loss.
    pub fn for_resampler(input_rate: f64, interpolation: usize) -> Self {
        let sample_rate = input_rate * interpolation as f64;
        let transition = (STOPBAND_HZ - PASSBAND_HZ) / sample_rate;
        let estimate = (STOPBAND_ATTENUATION_DB / (22.0 * transition)).ceil() as usize;
        let branches = interpolation.max(1);
        let per_phase = estimate.div_ceil(branches).max(MIN_TAPS_PER_PHASE);

        Self {
            sample_rate,
            passband_hz: PASSBAND_HZ,
            stopband_hz: STOPBAND_HZ,
            num_taps: per_phase * branches,
            gain: interpolation as f64,
        }
    }
}

/// Design the prototype and quantize it to Q15.
///
/// Tries an equiripple design first and falls back to a Blackman-windowed
/// sinc when the optimiser rejects the parameters or fails to converge.
pub fn design_lowpass(spec: &LowpassSpec) -> Result<Vec<Q15>> {
    if spec.num_taps == 0 || spec.sample_rate <= 0.0 {
        return Err(ModemError::FilterDesign(format!(
            "Invalid low-pass: {} taps at {} Hz",
            spec.num_taps, spec.sample_rate
        )));
    }
    if spec.passband_hz >= spec.stopband_hz || spec.stopband_hz >= spec.sample_rate / 2.0 {
        return Err(ModemError::FilterDesign(format!(
            "Invalid band edges: pass={} stop={} fs={}",
            spec.passband_hz, spec.stopband_hz, spec.sample_rate
        )));
    }

    let taps = if spec.num_taps <= MAX_REMEZ_TAPS {
        match remez_lowpass(spec) {
            Ok(taps) => taps,
            Err(e) => {
                log::warn!("{}; using windowed-sinc prototype", e);
                windowed_sinc_lowpass(spec)
            }
        }
    } else {
        log::debug!(
            "{} taps is beyond Parks-McClellan range; using windowed-sinc prototype",
            spec.num_taps
        );
        windowed_sinc_lowpass(spec)
    };

    Ok(quantize(&normalize_gain(taps, spec.gain)))
}

fn remez_lowpass(spec: &LowpassSpec) -> Result<Vec<f64>> {
    let pass = spec.passband_hz / spec.sample_rate;
    let stop = spec.stopband_hz / spec.sample_rate;

    let bands = [
        BandSetting::new(0.0, pass, constant(1.0))
            .map_err(|e| ModemError::FilterDesign(format!("Passband: {:?}", e)))?,
        BandSetting::new(stop, 0.5, constant(0.0))
            .map_err(|e| ModemError::FilterDesign(format!("Stopband: {:?}", e)))?,
    ];

    let params = pm_parameters(spec.num_taps, &bands)
        .map_err(|e| ModemError::FilterDesign(format!("PM parameters: {:?}", e)))?;

    let design =
        pm_remez(&params).map_err(|e| ModemError::FilterDesign(format!("PM Remez: {:?}", e)))?;

    if design.impulse_response.iter().any(|h| !h.is_finite()) {
        return Err(ModemError::FilterDesign(
            "PM Remez produced non-finite taps".to_string(),
        ));
    }
    Ok(design.impulse_response)
}

fn windowed_sinc_lowpass(spec: &LowpassSpec) -> Vec<f64> {
    let n = spec.num_taps;
    let cutoff = 0.5 * (spec.passband_hz + spec.stopband_hz) / spec.sample_rate;
    let center = (n as f64 - 1.0) / 2.0;
    let span = (n.max(2) - 1) as f64;
    (0..n)
        .map(|i| {
            let t = i as f64 - center;
            let sinc = if t == 0.0 {
                2.0 * cutoff
            } else {
                (2.0 * std::f64::consts::PI * cutoff * t).sin() / (std::f64::consts::PI * t)
            };
            let phase = 2.0 * std::f64::consts::PI * i as f64 / span;
            let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
            sinc * window
        })
        .collect()
}

fn normalize_gain(taps: Vec<f64>, gain: f64) -> Vec<f64> {
    let sum: f64 = taps.iter().sum();
    if sum.abs() < f64::EPSILON {
        return taps;
    }
    taps.into_iter().map(|h| h * gain / sum).collect()
}

fn quantize(taps: &[f64]) -> Vec<Q15> {
    taps.iter()
        .map(|&h| sat16((h * Q15_ONE as f64).round() as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(taps: &[Q15], freq: f64, fs: f64) -> f64 {
        let w = 2.0 * std::f64::consts::PI * freq / fs;
        let (re, im) = taps.iter().enumerate().fold((0.0, 0.0), |(re, im), (n, &h)| {
            let h = h as f64 / Q15_ONE as f64;
            (re + h * (w * n as f64).cos(), im - h * (w * n as f64).sin())
        });
        (re * re + im * im).sqrt()
    }

    #[test]
    fn test_tap_count_is_whole_branches() {
        let spec = LowpassSpec::for_resampler(24_000.0, 125);
        assert_eq!(spec.num_taps % 125, 0);
        assert!(spec.num_taps >= 125 * MIN_TAPS_PER_PHASE);

        let spec = LowpassSpec::for_resampler(48_000.0, 1);
        assert!(spec.num_taps >= MIN_TAPS_PER_PHASE);
        assert!((spec.gain - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolator_prototype_response() {
        let spec = LowpassSpec::for_resampler(24_000.0, 4);
        let taps = design_lowpass(&spec).unwrap();
        assert_eq!(taps.len(), spec.num_taps);

        let dc = response(&taps, 0.0, spec.sample_rate);
        assert!((dc - 4.0).abs() < 0.01, "DC gain {}", dc);

        let pass = response(&taps, 3_000.0, spec.sample_rate);
        assert!((pass - 4.0).abs() < 0.2, "3 kHz gain {}", pass);

        let stop = response(&taps, 30_000.0, spec.sample_rate);
        assert!(stop < 0.05, "30 kHz leakage {}", stop);
    }

    #[test]
    fn test_windowed_sinc_fallback_is_lowpass() {
        let spec = LowpassSpec::for_resampler(24_000.0, 2);
        let taps = quantize(&normalize_gain(windowed_sinc_lowpass(&spec), spec.gain));
        let dc = response(&taps, 0.0, spec.sample_rate);
        assert!((dc - 2.0).abs() < 0.01, "DC gain {}", dc);
        assert!(response(&taps, 22_000.0, spec.sample_rate) < 0.05);
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let mut spec = LowpassSpec::for_resampler(24_000.0, 2);
        spec.num_taps = 0;
        assert!(design_lowpass(&spec).is_err());

        let mut spec = LowpassSpec::for_resampler(24_000.0, 1);
        spec.stopband_hz = 20_000.0;
        assert!(design_lowpass(&spec).is_err());
    }
}
