//! FM audio chains at the 24 kHz baseband rate.

mod rx;
mod tx;

pub use rx::{AudioSink, FmRx, RxState};
pub use tx::{FmTx, TxState};

use crate::constants::{FM_AUDIO_GAIN_MAX, FM_AUDIO_GAIN_MIN};
use crate::fixed_point::Q15;

fn clamp_gain(gain: Q15) -> Q15 {
    gain.clamp(FM_AUDIO_GAIN_MIN, FM_AUDIO_GAIN_MAX)
}
