//! Mutex-guarded local sample queues between the modem loop and the I/O
//! workers.
//!
//! Each queue pairs a Q15 sample ring with a side-channel ring (TX control
//! markers or RX RSSI) kept in lockstep: element `k` of one belongs to
//! element `k` of the other.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::ring::{RingBuffer, RingStats};
use crate::fixed_point::Q15;

const SIDE_FILL_CHUNK: usize = 64;

pub struct QueueState<S: Copy> {
    samples: RingBuffer<Q15>,
    side: RingBuffer<S>,
}

impl<S: Copy + Default> QueueState<S> {
    pub fn available(&self) -> usize {
        self.samples.available()
    }

    pub fn space(&self) -> usize {
        self.samples.space()
    }

    /// Append samples with matching side values, or the default side value
    /// when `side` is `None`. Stops at the first sample that does not fit.
    pub fn write(&mut self, samples: &[Q15], side: Option<&[S]>) -> usize {
        let count = match side {
            Some(side) => samples.len().min(side.len()),
            None => samples.len(),
        };
        let fits = count.min(self.samples.space());

        // The sample ring records the overrun; the side ring is only ever
        // written with what fits.
        let written = self.samples.write(&samples[..count]);
        debug_assert_eq!(written, fits);

        match side {
            Some(side) => {
                self.side.write(&side[..written]);
            }
            None => {
                let fill = [S::default(); SIDE_FILL_CHUNK];
                let mut left = written;
                while left > 0 {
                    let n = left.min(SIDE_FILL_CHUNK);
                    self.side.write(&fill[..n]);
                    left -= n;
                }
            }
        }
        written
    }

    /// Take up to `samples.len()` entries. Side values land in `side` when it
    /// is long enough and are discarded otherwise.
    pub fn read(&mut self, samples: &mut [Q15], side: Option<&mut [S]>) -> usize {
        let count = self.samples.read(samples);
        match side {
            Some(side) if side.len() >= count => {
                self.side.read(&mut side[..count]);
            }
            _ => {
                let mut scratch = [S::default(); SIDE_FILL_CHUNK];
                let mut left = count;
                while left > 0 {
                    let n = left.min(SIDE_FILL_CHUNK);
                    self.side.read(&mut scratch[..n]);
                    left -= n;
                }
            }
        }
        count
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.side.clear();
    }

    pub fn stats(&self) -> RingStats {
        self.samples.stats()
    }
}

/// Sample queue shared between exactly one producer thread and one consumer
/// thread.
pub struct SampleQueue<S: Copy> {
    state: Mutex<QueueState<S>>,
}

impl<S: Copy + Default> SampleQueue<S> {
    pub fn new(size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                samples: RingBuffer::new(size),
                side: RingBuffer::new(size),
            }),
        }
    }

    /// Hold the queue for a multi-step transfer.
    ///
    /// A poisoned lock is recovered: the rings are consistent after every
    /// individual call, so a panic elsewhere cannot leave them torn.
    pub fn lock(&self) -> MutexGuard<'_, QueueState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self, samples: &[Q15], side: Option<&[S]>) -> usize {
        self.lock().write(samples, side)
    }

    pub fn read(&self, samples: &mut [Q15], side: Option<&mut [S]>) -> usize {
        self.lock().read(samples, side)
    }

    pub fn available(&self) -> usize {
        self.lock().available()
    }

    pub fn space(&self) -> usize {
        self.lock().space()
    }

    pub fn capacity(&self) -> usize {
        self.lock().samples.capacity()
    }

    pub fn stats(&self) -> RingStats {
        self.lock().stats()
    }
}
