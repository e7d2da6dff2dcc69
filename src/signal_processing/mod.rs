pub mod dynamics;
pub mod filter_design;
pub mod iir;
pub mod resampler;

pub use dynamics::{Envelope, SoftLimiter};
pub use filter_design::{LowpassSpec, design_lowpass};
pub use iir::{DcBlocker, Deemphasis, Preemphasis};
pub use resampler::{Decimator, Interpolator, RationalResampler, ResampleRatio};
