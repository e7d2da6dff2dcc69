use serde::Serialize;

use crate::config::FmConfig;
use crate::constants::*;
use crate::fixed_point::{Q15, q15_mul};
use crate::signal_processing::{DcBlocker, Deemphasis, Envelope, SoftLimiter};

use super::clamp_gain;

/// Receive squelch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RxState {
    /// Nothing received since construction or reset
    Idle,
    /// Squelch closed, monitoring
    Listening,
    /// Squelch open, frames are forwarded
    Audio,
}

/// Destination for completed audio frames
pub trait AudioSink {
    /// `frame` is exactly `FM_FRAME_LENGTH_SAMPLES` long. `rssi` is the mean
    /// of the RSSI values supplied with the frame's samples, if any were.
    fn write_frame(&mut self, frame: &[Q15], rssi: Option<u16>);
}

impl<F: FnMut(&[Q15], Option<u16>)> AudioSink for F {
    fn write_frame(&mut self, frame: &[Q15], rssi: Option<u16>) {
        self(frame, rssi)
    }
}

/// FM receive audio chain: squelch, DC block, de-emphasis, gain, limiter and
/// 20 ms framing.
pub struct FmRx {
    state: RxState,
    frame: [Q15; FM_FRAME_LENGTH_SAMPLES],
    frame_len: usize,
    frames: u64,

    envelope: Envelope,
    squelch_threshold: Q15,
    squelch_open: bool,
    hang_samples: u32,
    hang_remaining: u32,

    gain: Q15,
    dc_block: DcBlocker,
    deemphasis_enabled: bool,
    deemphasis: Deemphasis,
    limiter: SoftLimiter,

    rssi_accum: u64,
    rssi_count: u32,
    rssi_average: Option<u16>,
}

impl Default for FmRx {
    fn default() -> Self {
        Self::new()
    }
}

impl FmRx {
    pub fn new() -> Self {
        Self::from_config(&FmConfig::default())
    }

    pub fn from_config(config: &FmConfig) -> Self {
        Self {
            state: RxState::Idle,
            frame: [0; FM_FRAME_LENGTH_SAMPLES],
            frame_len: 0,
            frames: 0,
            envelope: Envelope::new(),
            squelch_threshold: config.squelch_threshold,
            squelch_open: false,
            hang_samples: hang_samples(config.squelch_hang_frames),
            hang_remaining: 0,
            gain: clamp_gain(config.rx_gain),
            dc_block: DcBlocker::new(DC_BLOCK_ALPHA),
            deemphasis_enabled: config.deemphasis,
            deemphasis: Deemphasis::new(FM_SAMPLE_RATE as f64),
            limiter: SoftLimiter::new(FM_AUDIO_LIMIT),
            rssi_accum: 0,
            rssi_count: 0,
            rssi_average: None,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.squelch_open
    }

    /// Mean RSSI of the last completed frame that carried RSSI values.
    pub fn rssi(&self) -> Option<u16> {
        self.rssi_average
    }

    /// Frames completed since construction or reset, forwarded or not.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn gain(&self) -> Q15 {
        self.gain
    }

    pub fn set_squelch(&mut self, threshold: Q15) {
        self.squelch_threshold = threshold;
    }

    /// Clamped to `[FM_AUDIO_GAIN_MIN, FM_AUDIO_GAIN_MAX]`.
    pub fn set_gain(&mut self, gain: Q15) {
        self.gain = clamp_gain(gain);
    }

    pub fn set_hang_frames(&mut self, frames: u32) {
        self.hang_samples = hang_samples(frames);
    }

    /// Disabling clears the filter so re-enabling starts from rest.
    pub fn set_deemphasis(&mut self, enabled: bool) {
        self.deemphasis_enabled = enabled;
        if !enabled {
            self.deemphasis.reset();
        }
    }

    pub fn reset(&mut self) {
        self.state = RxState::Idle;
        self.frame_len = 0;
        self.frames = 0;
        self.envelope.reset();
        self.squelch_open = false;
        self.hang_remaining = 0;
        self.dc_block.reset();
        self.deemphasis.reset();
        self.rssi_accum = 0;
        self.rssi_count = 0;
        self.rssi_average = None;
    }

    /// Run demodulated baseband through the chain. `rssi`, when given, runs
    /// parallel to `samples`; entries past its end are treated as absent.
    pub fn samples(&mut self, samples: &[Q15], rssi: Option<&[u16]>, sink: &mut dyn AudioSink) {
        for (n, &sample) in samples.iter().enumerate() {
            if let Some(&value) = rssi.and_then(|r| r.get(n)) {
                self.rssi_accum += value as u64;
                self.rssi_count += 1;
            }

            let level = self.envelope.update(sample);
            self.update_squelch(level);

            self.frame[self.frame_len] = self.process_sample(sample);
            self.frame_len += 1;

            if self.frame_len == FM_FRAME_LENGTH_SAMPLES {
                self.finish_frame(sink);
            }
        }
    }

    fn update_squelch(&mut self, level: Q15) {
        if level > self.squelch_threshold {
            self.squelch_open = true;
            self.hang_remaining = self.hang_samples;
            if self.state != RxState::Audio {
                log::debug!("FM RX squelch open (level {})", level);
                self.state = RxState::Audio;
            }
        } else if self.squelch_open {
            self.hang_remaining = self.hang_remaining.saturating_sub(1);
            if self.hang_remaining == 0 {
                log::debug!("FM RX squelch closed after {} frames", self.frames);
                self.squelch_open = false;
                self.state = RxState::Listening;
            }
        } else if self.state == RxState::Idle {
            self.state = RxState::Listening;
        }
    }

    #[inline]
    fn process_sample(&mut self, sample: Q15) -> Q15 {
        let mut out = self.dc_block.process(sample);
        if self.deemphasis_enabled {
            out = self.deemphasis.process(out);
        }
        out = q15_mul(out, self.gain);
        self.limiter.process(out)
    }

    fn finish_frame(&mut self, sink: &mut dyn AudioSink) {
        self.frame_len = 0;
        self.frames += 1;

        if self.rssi_count > 0 {
            self.rssi_average = Some((self.rssi_accum / self.rssi_count as u64) as u16);
            self.rssi_accum = 0;
            self.rssi_count = 0;
        }

        if self.squelch_open {
            sink.write_frame(&self.frame, self.rssi_average);
        }
    }
}

/// Hang time in samples; absurdly long hangs saturate instead of wrapping.
fn hang_samples(frames: u32) -> u32 {
    frames.saturating_mul(FM_FRAME_LENGTH_SAMPLES as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: f64, len: usize) -> Vec<Q15> {
        (0..len)
            .map(|n| (amplitude * (2.0 * std::f64::consts::PI * 1000.0 * n as f64 / 24000.0).sin()) as Q15)
            .collect()
    }

    fn discard(_: &[Q15], _: Option<u16>) {}

    /// Open the squelch, then feed zeros one at a time until the envelope
    /// has fallen to the threshold. Returns with the squelch still held.
    fn open_then_decay(rx: &mut FmRx) {
        rx.samples(&tone(20000.0, 480), None, &mut discard);
        assert_eq!(rx.state(), RxState::Audio);
        while rx.envelope.level() > rx.squelch_threshold {
            rx.samples(&[0], None, &mut discard);
        }
    }

    #[test]
    fn test_starts_idle_then_listens() {
        let mut rx = FmRx::new();
        assert_eq!(rx.state(), RxState::Idle);
        rx.samples(&[0; 10], None, &mut discard);
        assert_eq!(rx.state(), RxState::Listening);
        assert!(!rx.is_open());
    }

    #[test]
    fn test_strong_signal_opens_squelch() {
        let mut rx = FmRx::new();
        rx.samples(&tone(10000.0, 100), None, &mut discard);
        assert_eq!(rx.state(), RxState::Audio);
        assert!(rx.is_open());
    }

    #[test]
    fn test_squelch_holds_for_exactly_the_hang_interval() {
        let mut rx = FmRx::new();
        open_then_decay(&mut rx);
        // The sample that crossed the threshold used one hang sample.
        let hang = FM_SQUELCH_HANG_FRAMES as usize * FM_FRAME_LENGTH_SAMPLES - 1;

        rx.samples(&[0; 200], None, &mut discard);
        assert_eq!(rx.state(), RxState::Audio, "closed before the hang interval");

        rx.samples(&vec![0; hang - 201], None, &mut discard);
        assert_eq!(rx.state(), RxState::Audio, "closed one sample early");

        rx.samples(&[0], None, &mut discard);
        assert_eq!(rx.state(), RxState::Listening);
        assert!(!rx.is_open());
    }

    #[test]
    fn test_zero_hang_closes_immediately() {
        let mut rx = FmRx::new();
        rx.set_hang_frames(0);
        rx.samples(&tone(20000.0, 480), None, &mut discard);
        assert_eq!(rx.state(), RxState::Audio);
        let mut steps = 0;
        while rx.state() == RxState::Audio {
            rx.samples(&[0], None, &mut discard);
            steps += 1;
        }
        assert!(rx.envelope.level() <= rx.squelch_threshold);
        assert!(steps < 1000);
    }

    #[test]
    fn test_frames_only_forwarded_while_open() {
        let mut rx = FmRx::new();
        let delivered = std::cell::Cell::new(0usize);
        let mut sink = |frame: &[Q15], _: Option<u16>| {
            assert_eq!(frame.len(), FM_FRAME_LENGTH_SAMPLES);
            delivered.set(delivered.get() + 1);
        };
        rx.samples(&vec![0; 4 * 480], None, &mut sink);
        assert_eq!(rx.frames(), 4);
        assert_eq!(delivered.get(), 0);

        rx.samples(&tone(15000.0, 3 * 480), None, &mut sink);
        assert_eq!(rx.frames(), 7);
        assert_eq!(delivered.get(), 3);
    }

    #[test]
    fn test_rssi_averaged_per_frame() {
        let mut rx = FmRx::new();
        let mut seen = Vec::new();
        let mut sink = |_: &[Q15], rssi: Option<u16>| seen.push(rssi);
        let rssi: Vec<u16> = (0..480).map(|n| if n % 2 == 0 { 100 } else { 200 }).collect();
        rx.samples(&tone(15000.0, 480), Some(&rssi), &mut sink);
        assert_eq!(rx.rssi(), Some(150));
        assert_eq!(seen, vec![Some(150)]);
    }

    #[test]
    fn test_output_bounded_by_limiter() {
        let mut rx = FmRx::new();
        rx.set_gain(FM_AUDIO_GAIN_MAX);
        rx.set_deemphasis(false);
        let mut peak = 0i32;
        let mut sink = |frame: &[Q15], _: Option<u16>| {
            peak = peak.max(frame.iter().map(|&s| (s as i32).abs()).max().unwrap_or(0));
        };
        let square: Vec<Q15> = (0..4800).map(|n| if (n / 12) % 2 == 0 { 32767 } else { -32768 }).collect();
        rx.samples(&square, None, &mut sink);
        assert!(peak > 20000);
        assert!(peak <= FM_AUDIO_LIMIT as i32);
    }

    #[test]
    fn test_gain_clamped() {
        let mut rx = FmRx::new();
        rx.set_gain(100);
        assert_eq!(rx.gain(), FM_AUDIO_GAIN_MIN);
        rx.set_gain(-5);
        assert_eq!(rx.gain(), FM_AUDIO_GAIN_MIN);
        rx.set_gain(20000);
        assert_eq!(rx.gain(), 20000);
    }

    #[test]
    fn test_disabling_deemphasis_clears_state() {
        let run = |rx: &mut FmRx, input: &[Q15]| {
            let mut frames = Vec::new();
            rx.samples(input, None, &mut |frame: &[Q15], _: Option<u16>| frames.extend_from_slice(frame));
            frames
        };
        let signal = tone(10000.0, 960);
        let (first, second) = signal.split_at(480);

        let mut toggled = FmRx::new();
        let mut cleared = FmRx::new();
        let mut untouched = FmRx::new();
        for rx in [&mut toggled, &mut cleared, &mut untouched] {
            run(rx, first);
        }
        toggled.set_deemphasis(false);
        toggled.set_deemphasis(true);
        cleared.deemphasis.reset();

        let expected = run(&mut cleared, second);
        assert_eq!(expected.len(), 480);
        assert_eq!(run(&mut toggled, second), expected);
        // The carried filter state is visible, so the comparison above means something.
        assert_ne!(run(&mut untouched, second), expected);
    }

    #[test]
    fn test_huge_hang_saturates() {
        let mut rx = FmRx::new();
        rx.set_hang_frames(10_000_000);
        assert_eq!(rx.hang_samples, u32::MAX);

        let config = FmConfig { squelch_hang_frames: u32::MAX, ..FmConfig::default() };
        let rx = FmRx::from_config(&config);
        assert_eq!(rx.hang_samples, u32::MAX);
    }
}
