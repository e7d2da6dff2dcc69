use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use num_complex::Complex;

use super::{FrontendStreams, HardwareFrontend, Pacer, RxStream, TxStream, join_iq, split_iq};
use crate::error::Result;
use crate::fixed_point::Q15;
use crate::transport::{Consumer, Producer, spsc};

const MIN_RING_SIZE: usize = 1024;

/// Feeds transmitted I/Q straight back to the receiver.
///
/// The transmit side is paced at the sample rate so the loop runs in real
/// time like a device would. About a quarter second of I/Q is buffered in
/// between; anything beyond that is dropped and counted by the ring.
pub struct LoopbackFrontend {
    sample_rate: u32,
    running: Arc<AtomicBool>,
}

impl LoopbackFrontend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ring_size(&self) -> usize {
        ((self.sample_rate / 4) as usize)
            .next_power_of_two()
            .max(MIN_RING_SIZE)
    }
}

impl HardwareFrontend for LoopbackFrontend {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> Result<FrontendStreams> {
        let (producer, consumer) = spsc(self.ring_size());
        self.running.store(true, Ordering::Release);
        Ok(FrontendStreams {
            rx: Box::new(LoopbackRx {
                consumer,
                running: Arc::clone(&self.running),
                scratch: Vec::new(),
            }),
            tx: Box::new(LoopbackTx {
                producer,
                pacer: Pacer::new(self.sample_rate),
                running: Arc::clone(&self.running),
                scratch: Vec::new(),
            }),
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

struct LoopbackRx {
    consumer: Consumer<Complex<i16>>,
    running: Arc<AtomicBool>,
    scratch: Vec<Complex<i16>>,
}

impl RxStream for LoopbackRx {
    fn read(&mut self, i: &mut [Q15], q: &mut [Q15]) -> Result<usize> {
        if !self.running.load(Ordering::Acquire) {
            return Ok(0);
        }
        let want = i.len().min(q.len());
        if self.scratch.len() < want {
            self.scratch.resize(want, Complex::default());
        }
        let got = self.consumer.read(&mut self.scratch[..want]);
        split_iq(&self.scratch[..got], i, q);
        Ok(got)
    }
}

struct LoopbackTx {
    producer: Producer<Complex<i16>>,
    pacer: Pacer,
    running: Arc<AtomicBool>,
    scratch: Vec<Complex<i16>>,
}

impl TxStream for LoopbackTx {
    fn write(&mut self, i: &[Q15], q: &[Q15]) -> Result<usize> {
        if !self.running.load(Ordering::Acquire) {
            return Ok(0);
        }
        let count = i.len().min(q.len()).min(self.pacer.allowance());
        if count == 0 {
            return Ok(0);
        }
        join_iq(i, q, count, &mut self.scratch);
        // The sample clock moves on whether or not the receiver kept up.
        self.producer.write(&self.scratch);
        self.pacer.consume(count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_loopback_returns_transmitted_iq() {
        let mut frontend = LoopbackFrontend::new(1_000_000);
        let mut streams = frontend.start().unwrap();

        std::thread::sleep(Duration::from_millis(5));
        let tx_i: Vec<Q15> = (0..1000).collect();
        let tx_q: Vec<Q15> = (0..1000).map(|v| -v).collect();
        let sent = streams.tx.write(&tx_i, &tx_q).unwrap();
        assert!(sent > 0);

        let mut rx_i = vec![0; 1000];
        let mut rx_q = vec![0; 1000];
        let got = streams.rx.read(&mut rx_i, &mut rx_q).unwrap();
        assert_eq!(got, sent);
        assert_eq!(&rx_i[..got], &tx_i[..got]);
        assert_eq!(&rx_q[..got], &tx_q[..got]);
    }

    #[test]
    fn test_stopped_loopback_is_quiet() {
        let mut frontend = LoopbackFrontend::new(48_000);
        let mut streams = frontend.start().unwrap();
        frontend.stop();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(streams.tx.write(&[1, 2], &[3, 4]).unwrap(), 0);
        let mut i = [0; 2];
        let mut q = [0; 2];
        assert_eq!(streams.rx.read(&mut i, &mut q).unwrap(), 0);
    }
}
