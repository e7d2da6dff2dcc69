//! FM modulation and demodulation between Q15 baseband and 16-bit I/Q.

mod demodulator;
mod modulator;

pub use demodulator::FmDemodulator;
pub use modulator::FmModulator;

use crate::error::{ModemError, Result};

fn validate_rates(sample_rate: f64, deviation_hz: f64) -> Result<()> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(ModemError::InvalidParameter(format!(
            "sample rate must be positive, got {}",
            sample_rate
        )));
    }
    if !(deviation_hz.is_finite() && deviation_hz > 0.0 && deviation_hz < sample_rate / 2.0) {
        return Err(ModemError::InvalidParameter(format!(
            "deviation {} Hz outside (0, {}) Hz",
            deviation_hz,
            sample_rate / 2.0
        )));
    }
    Ok(())
}
