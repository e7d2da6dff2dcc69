//! Unpaced in-memory front end: whatever TX writes, RX reads back, so a
//! test can step the workers deterministically.

use sdrmodem::Result;
use sdrmodem::fixed_point::Q15;
use sdrmodem::frontend::{FrontendStreams, HardwareFrontend, RxStream, TxStream};
use sdrmodem::transport::{Consumer, Producer, spsc};

pub struct WireFrontend {
    sample_rate: u32,
    size: usize,
}

impl WireFrontend {
    pub fn new(sample_rate: u32, size: usize) -> Self {
        Self { sample_rate, size }
    }
}

struct WireRx(Consumer<(Q15, Q15)>);
struct WireTx(Producer<(Q15, Q15)>);

impl RxStream for WireRx {
    fn read(&mut self, i: &mut [Q15], q: &mut [Q15]) -> Result<usize> {
        let mut pairs = vec![(0, 0); i.len().min(q.len())];
        let got = self.0.read(&mut pairs);
        for (k, &(a, b)) in pairs[..got].iter().enumerate() {
            i[k] = a;
            q[k] = b;
        }
        Ok(got)
    }
}

impl TxStream for WireTx {
    fn write(&mut self, i: &[Q15], q: &[Q15]) -> Result<usize> {
        let pairs: Vec<(Q15, Q15)> = i.iter().copied().zip(q.iter().copied()).collect();
        Ok(self.0.write(&pairs))
    }
}

impl HardwareFrontend for WireFrontend {
    fn name(&self) -> &'static str {
        "wire"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> Result<FrontendStreams> {
        let (producer, consumer) = spsc(self.size);
        Ok(FrontendStreams {
            rx: Box::new(WireRx(consumer)),
            tx: Box::new(WireTx(producer)),
        })
    }

    fn stop(&mut self) {}
}
