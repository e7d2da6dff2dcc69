//! First-order fixed-point IIR stages for the FM audio chains.
//!
//! State is held as `y * 2^15` in an `i64` so the feedback path keeps
//! 15 fractional bits below the Q15 output and can never overflow.

use crate::constants::{EMPHASIS_TAU_S, PREEMPHASIS_TAU2_S};
use crate::fixed_point::{Q15, Q15_ONE, coeff_q15, round_shift, sat16};

/// DC blocking high-pass: `y[n] = x[n] - x[n-1] + alpha * y[n-1]`
#[derive(Debug, Clone)]
pub struct DcBlocker {
    alpha: i32,
    prev_input: i64,
    state: i64,
}

impl DcBlocker {
    /// `alpha` is the Q15 pole, e.g. 31130 for 0.95.
    pub fn new(alpha: Q15) -> Self {
        Self {
            alpha: alpha as i32,
            prev_input: 0,
            state: 0,
        }
    }

    #[inline]
    pub fn process(&mut self, x: Q15) -> Q15 {
        let x = x as i64;
        self.state = ((x - self.prev_input) << 15) + ((self.alpha as i64 * self.state) >> 15);
        self.prev_input = x;
        sat16(round_shift(self.state, 15))
    }

    pub fn reset(&mut self) {
        self.prev_input = 0;
        self.state = 0;
    }
}

/// One-pole low-pass `y[n] = alpha * y[n-1] + (1 - alpha) * x[n]` with
/// `alpha = exp(-1 / (tau * fs))`.
#[derive(Debug, Clone)]
pub struct Deemphasis {
    alpha: i32,
    state: i64,
}

impl Deemphasis {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_tau(sample_rate, EMPHASIS_TAU_S)
    }

    pub fn with_tau(sample_rate: f64, tau_s: f64) -> Self {
        Self {
            alpha: coeff_q15((-1.0 / (tau_s * sample_rate)).exp()),
            state: 0,
        }
    }

    pub fn alpha(&self) -> Q15 {
        sat16(self.alpha as i64)
    }

    #[inline]
    pub fn process(&mut self, x: Q15) -> Q15 {
        self.state = ((self.alpha as i64 * self.state) >> 15) + (Q15_ONE - self.alpha) as i64 * x as i64;
        sat16(round_shift(self.state, 15))
    }

    pub fn reset(&mut self) {
        self.state = 0;
    }
}

/// High-frequency shelf, the inverse of [`Deemphasis`] up to a second corner:
///
/// `H(z) = g * (1 - a z^-1) / (1 - b z^-1)`
///
/// `a` is the de-emphasis pole, `b` the pole of the second corner, and `g`
/// makes the DC gain exactly one. Above the first corner the response rises
/// at 6 dB/octave until it flattens at the second.
#[derive(Debug, Clone)]
pub struct Preemphasis {
    b0: i32,
    b1: i32,
    a1: i32,
    prev_input: i64,
    state: i64,
}

impl Preemphasis {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_corners(sample_rate, EMPHASIS_TAU_S, PREEMPHASIS_TAU2_S)
    }

    pub fn with_corners(sample_rate: f64, tau_s: f64, tau2_s: f64) -> Self {
        let a = (-1.0 / (tau_s * sample_rate)).exp();
        let b = (-1.0 / (tau2_s * sample_rate)).exp();
        let g = (1.0 - b) / (1.0 - a);
        Self {
            b0: coeff_q15(g),
            b1: coeff_q15(-g * a),
            a1: coeff_q15(b),
            prev_input: 0,
            state: 0,
        }
    }

    /// Magnitude response at `freq_hz`, for level planning.
    pub fn gain_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * std::f64::consts::PI * freq_hz / sample_rate;
        let (b0, b1, a1) = (
            self.b0 as f64 / Q15_ONE as f64,
            self.b1 as f64 / Q15_ONE as f64,
            self.a1 as f64 / Q15_ONE as f64,
        );
        let num = ((b0 + b1 * w.cos()).powi(2) + (b1 * w.sin()).powi(2)).sqrt();
        let den = ((1.0 - a1 * w.cos()).powi(2) + (a1 * w.sin()).powi(2)).sqrt();
        num / den
    }

    #[inline]
    pub fn process(&mut self, x: Q15) -> Q15 {
        let x = x as i64;
        self.state = self.b0 as i64 * x + self.b1 as i64 * self.prev_input
            + ((self.a1 as i64 * self.state) >> 15);
        self.prev_input = x;
        sat16(round_shift(self.state, 15))
    }

    pub fn reset(&mut self) {
        self.prev_input = 0;
        self.state = 0;
    }
}
