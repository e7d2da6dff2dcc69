//! I/O orchestration: the explicitly owned [`IoContext`] and the two worker
//! loops that connect it to a hardware front end.
//!
//! ```text
//!  ModemLoop ──► tx_queue ──► TxWorker: interpolate ─► modulate ─► TxStream
//!  ModemLoop ◄── rx_queue ◄── RxWorker: decimate ◄─ demodulate ◄─ RxStream
//! ```
//!
//! Each queue has exactly one producer thread and one consumer thread. The
//! queue mutex is held only for the transfer itself; resampling and
//! (de)modulation run outside it.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use audio_thread_priority::RtPriorityHandle;
use rolling_stats::Stats;
use serde::Serialize;

use crate::config::ModemConfig;
use crate::constants::FM_SAMPLE_RATE;
use crate::error::Result;
use crate::fixed_point::Q15;
use crate::frontend::{RxStream, TxStream};
use crate::modem::{FmDemodulator, FmModulator};
use crate::signal_processing::RationalResampler;
use crate::transport::{RingStats, SampleQueue};

/// Busy iterations between loop-timing publications
const TIMING_WINDOW: usize = 1000;

/// Summary of worker iteration times in microseconds
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimingSummary {
    pub count: usize,
    pub mean_us: f32,
    pub std_dev_us: f32,
    pub min_us: f32,
    pub max_us: f32,
}

impl TimingSummary {
    fn from_stats(stats: &Stats<f32>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            count: stats.count,
            mean_us: stats.mean,
            std_dev_us: stats.std_dev,
            min_us: stats.min,
            max_us: stats.max,
        })
    }
}

/// Counters shared by the workers and the modem loop
#[derive(Default)]
pub struct IoStats {
    tx_baseband: AtomicU64,
    tx_iq: AtomicU64,
    rx_iq: AtomicU64,
    rx_baseband: AtomicU64,
    rx_dropped: AtomicU64,
    tx_timing: Mutex<Option<TimingSummary>>,
    rx_timing: Mutex<Option<TimingSummary>>,
}

/// Point-in-time view of the I/O side
#[derive(Debug, Clone, Serialize)]
pub struct IoSnapshot {
    /// Baseband samples taken from the TX queue
    pub tx_baseband: u64,
    /// I/Q pairs accepted by the front end
    pub tx_iq: u64,
    /// I/Q pairs read from the front end
    pub rx_iq: u64,
    /// Baseband samples produced by the receiver
    pub rx_baseband: u64,
    /// Received baseband samples that did not fit the RX queue
    pub rx_dropped: u64,
    pub tx_queue: RingStats,
    pub rx_queue: RingStats,
    pub tx_queued: usize,
    pub rx_queued: usize,
    pub tx_timing: Option<TimingSummary>,
    pub rx_timing: Option<TimingSummary>,
}

/// State shared between the modem loop and the I/O workers.
///
/// Created once at startup and handed to each component as an
/// `Arc<IoContext>`.
pub struct IoContext {
    config: ModemConfig,
    /// Baseband audio to transmit, with a control byte per sample
    tx_queue: SampleQueue<u8>,
    /// Received baseband audio, with RSSI per sample
    rx_queue: SampleQueue<u16>,
    stats: IoStats,
    running: AtomicBool,
}

impl IoContext {
    pub fn new(config: ModemConfig) -> Result<Self> {
        config.validate()?;
        let size = config.io.queue_size;
        Ok(Self {
            tx_queue: SampleQueue::new(size),
            rx_queue: SampleQueue::new(size),
            stats: IoStats::default(),
            running: AtomicBool::new(true),
            config,
        })
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn tx_queue(&self) -> &SampleQueue<u8> {
        &self.tx_queue
    }

    pub fn rx_queue(&self) -> &SampleQueue<u16> {
        &self.rx_queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask every loop using this context to return.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn snapshot(&self) -> IoSnapshot {
        let s = &self.stats;
        let timing =
            |m: &Mutex<Option<TimingSummary>>| *m.lock().unwrap_or_else(PoisonError::into_inner);
        IoSnapshot {
            tx_baseband: s.tx_baseband.load(Ordering::Relaxed),
            tx_iq: s.tx_iq.load(Ordering::Relaxed),
            rx_iq: s.rx_iq.load(Ordering::Relaxed),
            rx_baseband: s.rx_baseband.load(Ordering::Relaxed),
            rx_dropped: s.rx_dropped.load(Ordering::Relaxed),
            tx_queue: self.tx_queue.stats(),
            rx_queue: self.rx_queue.stats(),
            tx_queued: self.tx_queue.available(),
            rx_queued: self.rx_queue.available(),
            tx_timing: timing(&s.tx_timing),
            rx_timing: timing(&s.rx_timing),
        }
    }

    fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.config.io.idle_sleep_us)
    }

    fn promote(&self) -> Option<RtPriorityHandle> {
        if !self.config.io.realtime {
            return None;
        }
        match audio_thread_priority::promote_current_thread_to_real_time(
            self.config.io.block_size as u32,
            FM_SAMPLE_RATE,
        ) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!("Could not set real-time priority: {}", e);
                None
            }
        }
    }
}

/// Rolling iteration timer published to [`IoStats`] every
/// `TIMING_WINDOW` busy iterations.
struct LoopTimer {
    stats: Stats<f32>,
}

impl LoopTimer {
    fn new() -> Self {
        Self {
            stats: Stats::new(),
        }
    }

    fn record(&mut self, started: Instant, slot: &Mutex<Option<TimingSummary>>) {
        self.stats.update(started.elapsed().as_secs_f32() * 1e6);
        if self.stats.count >= TIMING_WINDOW {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) =
                TimingSummary::from_stats(&self.stats);
            self.stats = Stats::new();
        }
    }
}

fn spawn_named<F>(name: &str, body: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_string()).spawn(body)?)
}

/// TX loop: baseband audio from the TX queue to I/Q on the front end.
pub struct TxWorker {
    io: Arc<IoContext>,
    stream: Box<dyn TxStream>,
    interpolator: RationalResampler,
    modulator: FmModulator,
    baseband: Vec<Q15>,
    upsampled: Vec<Q15>,
    i: Vec<Q15>,
    q: Vec<Q15>,
    /// I/Q produced but not yet accepted by the front end
    pending: Range<usize>,
    timer: LoopTimer,
}

impl TxWorker {
    pub fn new(io: Arc<IoContext>, stream: Box<dyn TxStream>) -> Result<Self> {
        let sdr = &io.config().sdr;
        let interpolator = RationalResampler::for_rates(FM_SAMPLE_RATE, sdr.sample_rate)?;
        let modulator = FmModulator::new(sdr.sample_rate as f64, sdr.deviation_hz as f64)?;
        let block = io.config().io.block_size;
        let iq_len = interpolator.output_length(block);
        Ok(Self {
            io,
            stream,
            interpolator,
            modulator,
            baseband: vec![0; block],
            upsampled: vec![0; iq_len],
            i: vec![0; iq_len],
            q: vec![0; iq_len],
            pending: 0..0,
            timer: LoopTimer::new(),
        })
    }

    /// One iteration. Returns the number of I/Q pairs handed to the front
    /// end; 0 means there was nothing to do.
    pub fn run_once(&mut self) -> Result<usize> {
        if self.pending.is_empty() {
            let taken = self.io.tx_queue().lock().read(&mut self.baseband, None);
            if taken == 0 {
                return Ok(0);
            }
            let n = self
                .interpolator
                .resample(&self.baseband[..taken], &mut self.upsampled);
            self.modulator
                .modulate(&self.upsampled[..n], &mut self.i[..n], &mut self.q[..n]);
            self.pending = 0..n;
            self.io.stats.tx_baseband.fetch_add(taken as u64, Ordering::Relaxed);
        }

        let range = self.pending.clone();
        let sent = self.stream.write(&self.i[range.clone()], &self.q[range])?;
        self.pending.start += sent;
        self.io.stats.tx_iq.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(sent)
    }

    /// Loop until the context shuts down or the front end fails.
    pub fn run(mut self) -> Result<()> {
        let _rt_handle = self.io.promote();
        let idle = self.io.idle_sleep();
        log::info!("TX worker started");
        while self.io.is_running() {
            let started = Instant::now();
            if self.run_once()? == 0 {
                thread::sleep(idle);
            } else {
                self.timer.record(started, &self.io.stats.tx_timing);
            }
        }
        self.stream.flush()?;
        log::info!("TX worker stopped");
        Ok(())
    }

    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        spawn_named("tx-worker", move || self.run())
    }
}

/// RX loop: I/Q from the front end to baseband audio in the RX queue.
pub struct RxWorker {
    io: Arc<IoContext>,
    stream: Box<dyn RxStream>,
    demodulator: FmDemodulator,
    decimator: RationalResampler,
    i: Vec<Q15>,
    q: Vec<Q15>,
    demodulated: Vec<Q15>,
    baseband: Vec<Q15>,
    rssi: Vec<u16>,
    timer: LoopTimer,
}

impl RxWorker {
    pub fn new(io: Arc<IoContext>, stream: Box<dyn RxStream>) -> Result<Self> {
        let sdr = &io.config().sdr;
        let demodulator = FmDemodulator::new(sdr.sample_rate as f64, sdr.deviation_hz as f64)?;
        let decimator = RationalResampler::for_rates(sdr.sample_rate, FM_SAMPLE_RATE)?;
        let ratio = io.config().resample_ratio()?;
        let iq_len = (io.config().io.block_size * ratio.interpolation).div_ceil(ratio.decimation);
        let out_len = decimator.output_length(iq_len);
        Ok(Self {
            io,
            stream,
            demodulator,
            decimator,
            i: vec![0; iq_len],
            q: vec![0; iq_len],
            demodulated: vec![0; iq_len],
            baseband: vec![0; out_len],
            rssi: vec![0; out_len],
            timer: LoopTimer::new(),
        })
    }

    /// One iteration. Returns the number of I/Q pairs consumed.
    pub fn run_once(&mut self) -> Result<usize> {
        let got = self.stream.read(&mut self.i, &mut self.q)?;
        if got == 0 {
            return Ok(0);
        }
        let (i, q) = (&self.i[..got], &self.q[..got]);
        self.demodulator
            .demodulate(i, q, &mut self.demodulated[..got]);
        let n = self
            .decimator
            .resample(&self.demodulated[..got], &mut self.baseband);

        self.rssi[..n].fill(rssi_level(i, q));
        let written = self
            .io
            .rx_queue()
            .lock()
            .write(&self.baseband[..n], Some(&self.rssi[..n]));

        let stats = &self.io.stats;
        stats.rx_iq.fetch_add(got as u64, Ordering::Relaxed);
        stats.rx_baseband.fetch_add(n as u64, Ordering::Relaxed);
        stats.rx_dropped.fetch_add((n - written) as u64, Ordering::Relaxed);
        Ok(got)
    }

    /// Loop until the context shuts down or the front end fails.
    pub fn run(mut self) -> Result<()> {
        let _rt_handle = self.io.promote();
        let idle = self.io.idle_sleep();
        log::info!("RX worker started");
        while self.io.is_running() {
            let started = Instant::now();
            if self.run_once()? == 0 {
                thread::sleep(idle);
            } else {
                self.timer.record(started, &self.io.stats.rx_timing);
            }
        }
        log::info!("RX worker stopped");
        Ok(())
    }

    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        spawn_named("rx-worker", move || self.run())
    }
}

/// RMS magnitude of an I/Q block.
pub fn rssi_level(i: &[Q15], q: &[Q15]) -> u16 {
    let count = i.len().min(q.len());
    if count == 0 {
        return 0;
    }
    let power: i64 = i
        .iter()
        .zip(q)
        .map(|(&i, &q)| i as i64 * i as i64 + q as i64 * q as i64)
        .sum();
    ((power as f64 / count as f64).sqrt().round() as u32).min(u16::MAX as u32) as u16
}
