//! Modem-wide constants
//!
//! Q15 values are signed 16-bit integers with unit amplitude 32767.

/// Baseband (audio) sample rate in Hz
pub const FM_SAMPLE_RATE: u32 = 24_000;

/// RX audio frame: 20 ms at 24 kHz
pub const FM_FRAME_LENGTH_SAMPLES: usize = 480;

/// TX frame-counter granularity in samples
pub const FM_AUDIO_BLOCK_SIZE: usize = 160;

/// Slots in the TX host-audio ring (one slot is kept free)
pub const FM_TX_BUFFER_SIZE: usize = 1024;

/// TX watchdog: 300 blocks of 160 samples = 6 s
pub const FM_TIMEOUT_FRAMES: u32 = 300;

/// Squelch hang in RX frames (100 ms)
pub const FM_SQUELCH_HANG_FRAMES: u32 = 5;

pub const FM_SQUELCH_THRESHOLD_LOW: i16 = 328;
pub const FM_SQUELCH_THRESHOLD_MEDIUM: i16 = 1638;
pub const FM_SQUELCH_THRESHOLD_HIGH: i16 = 3277;

pub const FM_AUDIO_GAIN_MIN: i16 = 8192;
pub const FM_AUDIO_GAIN_MAX: i16 = 32767;
pub const FM_AUDIO_GAIN_DEFAULT: i16 = 16384;

/// Soft-limit ceiling, 0.9 of full scale
pub const FM_AUDIO_LIMIT: i16 = 29491;

/// DC blocker pole, Q15(0.95)
pub const DC_BLOCK_ALPHA: i16 = 31130;

/// De-emphasis time constant in seconds
pub const EMPHASIS_TAU_S: f64 = 530e-6;

/// Second corner of the pre-emphasis shelf in seconds
pub const PREEMPHASIS_TAU2_S: f64 = 75e-6;

/// Envelope memory while the level rises (fast attack)
pub const ENVELOPE_ATTACK: i16 = 29491;

/// Envelope memory while the level falls (slow decay)
pub const ENVELOPE_DECAY: i16 = 32440;

pub const SDR_SAMPLE_RATE: u32 = 1_000_000;
pub const FM_DEVIATION_HZ: f32 = 5_000.0;

/// Baseband samples moved per worker iteration (30 ms)
pub const BASEBAND_BLOCK_SIZE: usize = 720;

/// Slots in each local I/O queue
pub const IO_QUEUE_SIZE: usize = 32_768;

/// Worker polling floor when idle
pub const IO_IDLE_SLEEP_US: u64 = 20;

/// Largest interpolation or decimation factor the resampler accepts
pub const MAX_RESAMPLE_FACTOR: usize = 1024;

/// Slots in each shared-memory ring
pub const SHM_RING_SIZE: usize = 65_536;

pub const SHM_NAME: &str = "/mmdvm_ipc";

/// Handshake poll period
pub const SHM_POLL_INTERVAL_MS: u64 = 10;

/// Alignment of independently written fields
pub const CACHE_LINE_SIZE: usize = 64;
