//! Deterministic test signals and channel impairments for exercising the
//! modem without a radio.

mod measure;
mod noise;
mod signal;

pub use measure::{ToneMeasurement, measure_tone, rms};
pub use noise::{
    AdditiveNoiseConfig, FrequencyOffsetConfig, NoiseConfig, apply_audio_noise,
    apply_iq_impairments, signal_power,
};
pub use signal::{multitone, to_le_bytes, tone};
