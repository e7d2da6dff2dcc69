use serde::Serialize;

use crate::config::FmConfig;
use crate::constants::*;
use crate::fixed_point::{Q15, q15_mul};
use crate::signal_processing::{DcBlocker, Preemphasis, SoftLimiter};
use crate::transport::RingBuffer;

use super::clamp_gain;

const DECODE_CHUNK: usize = 64;

/// Transmit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    /// Emitting silence, waiting for audio
    Idle,
    /// Draining host audio
    Audio,
    /// Forced silence after the watchdog fired
    Shutdown,
}

/// FM transmit audio chain with a bounded host-audio buffer and a key-up
/// watchdog.
pub struct FmTx {
    state: TxState,
    buffer: RingBuffer<Q15>,
    dropped: u64,

    gain: Q15,
    preemphasis_enabled: bool,
    preemphasis: Preemphasis,
    dc_block: DcBlocker,
    limiter: SoftLimiter,

    timeout_frames: u32,
    frame_counter: u32,
    /// Samples drained since the last frame-counter step
    block_fill: usize,
}

impl Default for FmTx {
    fn default() -> Self {
        Self::new()
    }
}

impl FmTx {
    pub fn new() -> Self {
        Self::from_config(&FmConfig::default())
    }

    pub fn from_config(config: &FmConfig) -> Self {
        Self {
            state: TxState::Idle,
            buffer: RingBuffer::new(FM_TX_BUFFER_SIZE),
            dropped: 0,
            gain: clamp_gain(config.tx_gain),
            preemphasis_enabled: config.preemphasis,
            preemphasis: Preemphasis::new(FM_SAMPLE_RATE as f64),
            dc_block: DcBlocker::new(DC_BLOCK_ALPHA),
            limiter: SoftLimiter::new(FM_AUDIO_LIMIT),
            timeout_frames: config.timeout_frames,
            frame_counter: 0,
            block_fill: 0,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Free slots in the host-audio buffer. Check before writing to avoid
    /// dropped samples.
    pub fn space(&self) -> usize {
        self.buffer.space()
    }

    pub fn has_data(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Samples rejected because the buffer was full or the watchdog had
    /// fired.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 160-sample blocks drained in the current key-up.
    pub fn frames(&self) -> u32 {
        self.frame_counter
    }

    pub fn gain(&self) -> Q15 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: Q15) {
        self.gain = clamp_gain(gain);
    }

    pub fn set_timeout(&mut self, frames: u32) {
        self.timeout_frames = frames;
    }

    /// Disabling clears the filter so re-enabling starts from rest.
    pub fn set_preemphasis(&mut self, enabled: bool) {
        self.preemphasis_enabled = enabled;
        if !enabled {
            self.preemphasis.reset();
        }
    }

    pub fn reset(&mut self) {
        self.state = TxState::Idle;
        self.buffer.clear();
        self.preemphasis.reset();
        self.dc_block.reset();
        self.frame_counter = 0;
        self.block_fill = 0;
    }

    /// Queue little-endian 16-bit samples from the host. A trailing odd byte
    /// is ignored. Returns the number of samples accepted.
    pub fn write_data(&mut self, data: &[u8]) -> usize {
        let mut decoded = [0 as Q15; DECODE_CHUNK];
        let mut accepted = 0;
        for chunk in data.chunks(2 * DECODE_CHUNK) {
            let n = chunk.len() / 2;
            for (slot, pair) in decoded.iter_mut().zip(chunk.chunks_exact(2)) {
                *slot = Q15::from_le_bytes([pair[0], pair[1]]);
            }
            accepted += self.write_samples(&decoded[..n]);
        }
        accepted
    }

    /// Queue samples. Whatever does not fit is dropped and counted; nothing
    /// is accepted while the watchdog shutdown is in progress.
    pub fn write_samples(&mut self, samples: &[Q15]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        if self.state == TxState::Shutdown {
            self.dropped += samples.len() as u64;
            return 0;
        }

        let written = self.buffer.write(samples);
        self.dropped += (samples.len() - written) as u64;

        if written > 0 && self.state == TxState::Idle {
            log::debug!("FM TX key-up");
            self.state = TxState::Audio;
            self.frame_counter = 0;
            self.block_fill = 0;
        }
        written
    }

    /// Fill `out` with processed audio at the baseband cadence. Always
    /// produces `out.len()` samples.
    pub fn get_samples(&mut self, out: &mut [Q15]) -> usize {
        if self.state == TxState::Audio && self.frame_counter >= self.timeout_frames {
            log::warn!(
                "FM TX timeout after {} frames, forcing shutdown",
                self.frame_counter
            );
            self.state = TxState::Shutdown;
            self.buffer.clear();
            out.fill(0);
            return out.len();
        }

        match self.state {
            TxState::Idle => out.fill(0),
            TxState::Shutdown => {
                out.fill(0);
                self.state = TxState::Idle;
            }
            TxState::Audio => {
                let drained = self.buffer.read(out);
                for s in &mut out[..drained] {
                    *s = self.process_sample(*s);
                }
                if drained < out.len() {
                    out[drained..].fill(0);
                    log::debug!("FM TX buffer drained, back to idle");
                    self.state = TxState::Idle;
                }
                self.count_frames(drained);
            }
        }
        out.len()
    }

    fn count_frames(&mut self, drained: usize) {
        self.block_fill += drained;
        self.frame_counter = self
            .frame_counter
            .saturating_add((self.block_fill / FM_AUDIO_BLOCK_SIZE) as u32);
        self.block_fill %= FM_AUDIO_BLOCK_SIZE;
    }

    #[inline]
    fn process_sample(&mut self, sample: Q15) -> Q15 {
        let mut out = q15_mul(sample, self.gain);
        if self.preemphasis_enabled {
            out = self.preemphasis.process(out);
        }
        out = self.dc_block.process(out);
        self.limiter.process(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_bytes(samples: &[Q15]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_fresh_tx_emits_silence_and_stays_idle() {
        let mut tx = FmTx::new();
        let mut out = [123i16; 10];
        assert_eq!(tx.get_samples(&mut out), 10);
        assert_eq!(out, [0; 10]);
        assert_eq!(tx.state(), TxState::Idle);
    }

    #[test]
    fn test_write_data_decodes_little_endian() {
        let mut tx = FmTx::new();
        tx.set_preemphasis(false);
        tx.set_gain(FM_AUDIO_GAIN_MAX);
        let mut bytes = le_bytes(&[1000, -1000, 258]);
        bytes.push(0xFF);
        assert_eq!(tx.write_data(&bytes), 3);
        assert_eq!(tx.state(), TxState::Audio);
        assert!(tx.has_data());

        let mut out = [0i16; 3];
        tx.get_samples(&mut out);
        // Gain just under unity, then the DC blocker's first difference.
        assert_eq!(out[0], 999);
        assert!((-1060..=-1040).contains(&out[1]), "{}", out[1]);
    }

    #[test]
    fn test_write_drops_what_does_not_fit() {
        let mut tx = FmTx::new();
        assert_eq!(tx.space(), FM_TX_BUFFER_SIZE - 1);
        let block = vec![100i16; FM_TX_BUFFER_SIZE + 50];
        assert_eq!(tx.write_samples(&block), FM_TX_BUFFER_SIZE - 1);
        assert_eq!(tx.dropped(), 51);
        assert_eq!(tx.space(), 0);
    }

    #[test]
    fn test_empty_buffer_zero_fills_and_returns_idle() {
        let mut tx = FmTx::new();
        tx.write_samples(&[5000; 100]);
        let mut out = [1i16; 160];
        assert_eq!(tx.get_samples(&mut out), 160);
        assert!(out[..100].iter().any(|&s| s != 0));
        assert!(out[100..].iter().all(|&s| s == 0));
        assert_eq!(tx.state(), TxState::Idle);
    }

    #[test]
    fn test_timeout_forces_shutdown_on_next_call() {
        let mut tx = FmTx::new();
        tx.set_timeout(3);
        let mut out = [0i16; 80];
        let mut drained = 0;

        tx.write_samples(&[2000; 800]);
        while drained < 3 * FM_AUDIO_BLOCK_SIZE {
            tx.get_samples(&mut out);
            drained += out.len();
            tx.write_samples(&[2000; 80]);
            assert_eq!(tx.state(), TxState::Audio);
        }
        assert_eq!(drained, 3 * FM_AUDIO_BLOCK_SIZE);
        assert_eq!(tx.frames(), 3);

        out.fill(1);
        tx.get_samples(&mut out);
        assert_eq!(tx.state(), TxState::Shutdown);
        assert!(out.iter().all(|&s| s == 0));
        assert!(!tx.has_data());

        assert_eq!(tx.write_samples(&[2000; 10]), 0);

        tx.get_samples(&mut out);
        assert_eq!(tx.state(), TxState::Idle);
        assert!(out.iter().all(|&s| s == 0));

        assert_eq!(tx.write_samples(&[2000; 10]), 10);
        assert_eq!(tx.state(), TxState::Audio);
        assert_eq!(tx.frames(), 0);
    }

    #[test]
    fn test_frame_counter_spans_calls() {
        let mut tx = FmTx::new();
        tx.write_samples(&[1000; 1000]);
        let mut out = [0i16; 100];
        for _ in 0..3 {
            tx.get_samples(&mut out);
        }
        // 300 samples drained: one full 160-sample block.
        assert_eq!(tx.frames(), 1);
        tx.get_samples(&mut out[..20]);
        assert_eq!(tx.frames(), 2);
    }

    #[test]
    fn test_output_is_limited() {
        let mut tx = FmTx::new();
        tx.set_gain(FM_AUDIO_GAIN_MAX);
        let square: Vec<Q15> = (0..960).map(|n| if (n / 6) % 2 == 0 { 30000 } else { -30000 }).collect();
        tx.write_samples(&square);
        let mut out = vec![0i16; 960];
        tx.get_samples(&mut out);
        let peak = out.iter().map(|&s| (s as i32).abs()).max().unwrap();
        assert!(peak <= FM_AUDIO_LIMIT as i32);
        assert!(peak > 25000);
    }

    #[test]
    fn test_disabling_preemphasis_clears_state() {
        let signal: Vec<Q15> = (0..960)
            .map(|n| (10000.0 * (2.0 * std::f64::consts::PI * 1000.0 * n as f64 / 24000.0).sin()) as Q15)
            .collect();
        let prime = |tx: &mut FmTx| {
            tx.write_samples(&signal);
            let mut out = vec![0i16; 480];
            tx.get_samples(&mut out);
        };
        let drain = |tx: &mut FmTx| {
            let mut out = vec![0i16; 480];
            tx.get_samples(&mut out);
            out
        };

        let mut toggled = FmTx::new();
        let mut cleared = FmTx::new();
        let mut untouched = FmTx::new();
        for tx in [&mut toggled, &mut cleared, &mut untouched] {
            prime(tx);
        }
        toggled.set_preemphasis(false);
        toggled.set_preemphasis(true);
        cleared.preemphasis.reset();

        let expected = drain(&mut cleared);
        assert_eq!(drain(&mut toggled), expected);
        assert_ne!(drain(&mut untouched), expected);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut tx = FmTx::new();
        tx.write_samples(&[1; 50]);
        tx.reset();
        assert_eq!(tx.state(), TxState::Idle);
        assert!(!tx.has_data());
    }
}
