//! Hardware front ends.
//!
//! A front end turns the I/Q streams of the worker loops into something
//! physical (or simulated). [`HardwareFrontend::start`] hands out the two
//! halves separately so the RX worker owns the receive side and the TX
//! worker the transmit side, each from its own thread.

mod loopback;
mod soundcard;
mod wav;

pub use loopback::LoopbackFrontend;
pub use soundcard::SoundcardFrontend;
pub use wav::WavFrontend;

use std::time::Instant;

use num_complex::Complex;

use crate::config::{FrontendKind, ModemConfig};
use crate::error::Result;
use crate::fixed_point::Q15;

/// Receive half: I/Q from the radio.
pub trait RxStream: Send {
    /// Fill up to `min(i.len(), q.len())` pairs and return how many were
    /// written. Returns 0 when nothing is ready; never blocks.
    fn read(&mut self, i: &mut [Q15], q: &mut [Q15]) -> Result<usize>;
}

/// Transmit half: I/Q to the radio.
pub trait TxStream: Send {
    /// Accept up to `min(i.len(), q.len())` pairs and return how many were
    /// taken. A short count means the device is not ready for more; the
    /// caller keeps the rest.
    fn write(&mut self, i: &[Q15], q: &[Q15]) -> Result<usize>;

    /// Push out anything buffered inside the stream.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct FrontendStreams {
    pub rx: Box<dyn RxStream>,
    pub tx: Box<dyn TxStream>,
}

/// Capability interface of a radio front end, selected at startup.
pub trait HardwareFrontend {
    fn name(&self) -> &'static str;

    /// I/Q sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Open the device and return its stream halves.
    fn start(&mut self) -> Result<FrontendStreams>;

    /// Close the device. Streams handed out by `start` go quiet.
    fn stop(&mut self);
}

/// Build the front end named in the configuration.
pub fn create_frontend(config: &ModemConfig) -> Result<Box<dyn HardwareFrontend>> {
    let rate = config.sdr.sample_rate;
    let frontend: Box<dyn HardwareFrontend> = match config.sdr.frontend {
        FrontendKind::Loopback => Box::new(LoopbackFrontend::new(rate)),
        FrontendKind::Soundcard => Box::new(SoundcardFrontend::new(rate)),
        FrontendKind::Wav => Box::new(WavFrontend::new(
            rate,
            config.sdr.rx_wav.clone(),
            config.sdr.tx_wav.clone(),
            config.sdr.wav_loop,
        )),
    };
    log::info!("Front end: {} at {} Hz", frontend.name(), rate);
    Ok(frontend)
}

/// Scatter I/Q pairs into separate rails.
fn split_iq(pairs: &[Complex<i16>], i: &mut [Q15], q: &mut [Q15]) {
    for ((s, i), q) in pairs.iter().zip(i.iter_mut()).zip(q.iter_mut()) {
        *i = s.re;
        *q = s.im;
    }
}

/// Replace `out` with the pairs of the first `count` rail samples.
fn join_iq(i: &[Q15], q: &[Q15], count: usize, out: &mut Vec<Complex<i16>>) {
    out.clear();
    out.extend(
        i[..count]
            .iter()
            .zip(&q[..count])
            .map(|(&re, &im)| Complex::new(re, im)),
    );
}

/// Wall-clock budget for simulated devices: at most `rate` samples per
/// second since creation.
#[derive(Debug)]
pub(crate) struct Pacer {
    rate: u64,
    start: Instant,
    used: u64,
}

impl Pacer {
    pub(crate) fn new(rate: u32) -> Self {
        Self {
            rate: rate as u64,
            start: Instant::now(),
            used: 0,
        }
    }

    /// Samples that may be moved now.
    pub(crate) fn allowance(&self) -> usize {
        let due = self.start.elapsed().as_micros() as u64 * self.rate / 1_000_000;
        due.saturating_sub(self.used) as usize
    }

    pub(crate) fn consume(&mut self, count: usize) {
        self.used += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_pacer_grants_samples_over_time() {
        let mut pacer = Pacer::new(100_000);
        assert!(pacer.allowance() < 500);
        std::thread::sleep(Duration::from_millis(20));
        let granted = pacer.allowance();
        assert!(granted >= 2000, "{}", granted);
        pacer.consume(granted);
        assert!(pacer.allowance() < granted);
    }

    #[test]
    fn test_create_frontend_follows_config() {
        let config = ModemConfig::default();
        let frontend = create_frontend(&config).unwrap();
        assert_eq!(frontend.name(), "loopback");
        assert_eq!(frontend.sample_rate(), config.sdr.sample_rate);
    }
}
