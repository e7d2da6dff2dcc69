//! Polyphase rational resampler
//!
//! Conceptually the input is zero-stuffed by `M`, low-pass filtered with the
//! prototype `h`, and kept every `N`-th sample. Output `k` sits at position
//! `t = k*N` of the upsampled stream, so it uses branch `p = t mod M` of the
//! prototype (`h[p], h[p+M], h[p+2M], ...`) against the newest input
//! `x[t div M]` and its predecessors. Only the branch products are computed.

use crate::error::{ModemError, Result};
use crate::fixed_point::{Kernel, Q15, sat16};
use crate::signal_processing::filter_design::{LowpassSpec, design_lowpass};

/// Interpolation/decimation pair in lowest terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResampleRatio {
    pub interpolation: usize,
    pub decimation: usize,
}

impl ResampleRatio {
    /// Ratio that converts `input_rate` to `output_rate`.
    pub fn from_rates(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(ModemError::ResamplerConfig(format!(
                "sample rates must be positive: {} -> {}",
                input_rate, output_rate
            )));
        }
        let g = gcd(input_rate as u64, output_rate as u64);
        Ok(Self {
            interpolation: (output_rate as u64 / g) as usize,
            decimation: (input_rate as u64 / g) as usize,
        })
    }

    pub fn inverse(self) -> Self {
        Self {
            interpolation: self.decimation,
            decimation: self.interpolation,
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// General M/N polyphase resampler over Q15 samples.
pub struct RationalResampler {
    interpolation: usize,
    decimation: usize,
    taps: Vec<Q15>,
    /// Branch `p` lives at `banks[p * phase_len..(p + 1) * phase_len]`
    banks: Vec<Q15>,
    phase_len: usize,
    /// Input history stored twice so the newest-first window is contiguous
    history: Vec<Q15>,
    head: usize,
    phase: usize,
    /// Inputs still to be consumed before the next output is due
    pending: usize,
    kernel: Kernel,
}

impl RationalResampler {
    /// Create a resampler from explicit Q15 taps.
    ///
    /// # Errors
    /// Returns `ModemError::ResamplerConfig` when either factor is zero or
    /// `taps` is empty. Nothing is retained on failure.
    pub fn new(interpolation: usize, decimation: usize, taps: &[Q15]) -> Result<Self> {
        if interpolation == 0 || decimation == 0 {
            return Err(ModemError::ResamplerConfig(format!(
                "factors must be positive: M={} N={}",
                interpolation, decimation
            )));
        }
        if taps.is_empty() {
            return Err(ModemError::ResamplerConfig("no filter taps".to_string()));
        }

        let phase_len = taps.len().div_ceil(interpolation);
        let mut banks = vec![0; interpolation * phase_len];
        for (i, &h) in taps.iter().enumerate() {
            banks[(i % interpolation) * phase_len + i / interpolation] = h;
        }

        Ok(Self {
            interpolation,
            decimation,
            taps: taps.to_vec(),
            banks,
            phase_len,
            history: vec![0; 2 * phase_len],
            head: 0,
            phase: 0,
            pending: 1,
            kernel: Kernel::detect(),
        })
    }

    /// Create a resampler for `input_rate -> output_rate` with a designed
    /// anti-imaging/anti-aliasing prototype.
    pub fn for_rates(input_rate: u32, output_rate: u32) -> Result<Self> {
        let ratio = ResampleRatio::from_rates(input_rate, output_rate)?;
        let spec = LowpassSpec::for_resampler(input_rate as f64, ratio.interpolation);
        let taps = design_lowpass(&spec)?;
        log::debug!(
            "Resampler {} -> {} Hz: M={} N={} taps={} ({} per phase)",
            input_rate,
            output_rate,
            ratio.interpolation,
            ratio.decimation,
            taps.len(),
            taps.len().div_ceil(ratio.interpolation)
        );
        Self::new(ratio.interpolation, ratio.decimation, &taps)
    }

    pub fn interpolation(&self) -> usize {
        self.interpolation
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn taps(&self) -> &[Q15] {
        &self.taps
    }

    /// Upper bound on the outputs produced from `input_len` inputs:
    /// `ceil(input_len * M / N)`. The exact count is returned by
    /// [`resample`](Self::resample).
    pub fn output_length(&self, input_len: usize) -> usize {
        (input_len * self.interpolation).div_ceil(self.decimation)
    }

    /// Filter delay in output samples, for aligning test signals.
    pub fn delay(&self) -> f64 {
        (self.taps.len() as f64 - 1.0) / 2.0 / self.decimation as f64
    }

    /// Resample `input` into `output` and return the number of samples written.
    ///
    /// Input is consumed left to right. If `output` fills before the input is
    /// exhausted, the remaining input is not consumed; size `output` with
    /// [`output_length`](Self::output_length) to avoid that.
    pub fn resample(&mut self, input: &[Q15], output: &mut [Q15]) -> usize {
        let mut consumed = 0;
        let mut produced = 0;

        loop {
            while self.pending > 0 {
                let Some(&x) = input.get(consumed) else {
                    return produced;
                };
                self.push(x);
                consumed += 1;
                self.pending -= 1;
            }

            let Some(slot) = output.get_mut(produced) else {
                return produced;
            };

            let start = self.phase * self.phase_len;
            let branch = &self.banks[start..start + self.phase_len];
            let window = &self.history[self.head..self.head + self.phase_len];
            *slot = sat16(self.kernel.dot_q15(window, branch) >> 15);
            produced += 1;

            self.phase += self.decimation;
            self.pending += self.phase / self.interpolation;
            self.phase %= self.interpolation;
        }
    }

    /// Zero the history and phase. Taps are kept.
    pub fn reset(&mut self) {
        self.history.fill(0);
        self.head = 0;
        self.phase = 0;
        self.pending = 1;
    }

    #[inline]
    fn push(&mut self, x: Q15) {
        self.head = if self.head == 0 {
            self.phase_len - 1
        } else {
            self.head - 1
        };
        self.history[self.head] = x;
        self.history[self.head + self.phase_len] = x;
    }
}

/// Integer-factor upsampler (N = 1), the 24 kHz -> SDR direction when the
/// SDR rate is a multiple of 24 kHz.
pub struct Interpolator(RationalResampler);

impl Interpolator {
    pub fn new(factor: usize, taps: &[Q15]) -> Result<Self> {
        RationalResampler::new(factor, 1, taps).map(Self)
    }

    pub fn factor(&self) -> usize {
        self.0.interpolation()
    }

    pub fn output_length(&self, input_len: usize) -> usize {
        self.0.output_length(input_len)
    }

    pub fn process(&mut self, input: &[Q15], output: &mut [Q15]) -> usize {
        self.0.resample(input, output)
    }

    pub fn reset(&mut self) {
        self.0.reset();
    }
}

/// Integer-factor downsampler (M = 1), the SDR -> 24 kHz direction.
pub struct Decimator(RationalResampler);

impl Decimator {
    pub fn new(factor: usize, taps: &[Q15]) -> Result<Self> {
        RationalResampler::new(1, factor, taps).map(Self)
    }

    pub fn factor(&self) -> usize {
        self.0.decimation()
    }

    pub fn output_length(&self, input_len: usize) -> usize {
        self.0.output_length(input_len)
    }

    pub fn process(&mut self, input: &[Q15], output: &mut [Q15]) -> usize {
        self.0.resample(input, output)
    }

    pub fn reset(&mut self) {
        self.0.reset();
    }
}
