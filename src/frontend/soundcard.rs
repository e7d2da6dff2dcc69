use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use num_complex::Complex;

use super::{FrontendStreams, HardwareFrontend, RxStream, TxStream, join_iq, split_iq};
use crate::error::{ModemError, Result};
use crate::fixed_point::{Q15, q15_from_f32, q15_to_f32};
use crate::transport::{Consumer, Producer, spsc};

const CALLBACK_CHUNK: usize = 256;
const ERROR_QUEUE: usize = 16;

/// Stereo sound device used as an I/Q radio: left is I, right is Q.
///
/// Both device callbacks talk to the workers through SPSC rings holding
/// about a quarter second of I/Q. Stream errors arrive on a channel and are
/// logged by whichever worker polls next.
pub struct SoundcardFrontend {
    sample_rate: u32,
    input: Option<cpal::Stream>,
    output: Option<cpal::Stream>,
}

impl SoundcardFrontend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            input: None,
            output: None,
        }
    }

    fn ring_size(&self) -> usize {
        ((self.sample_rate / 4) as usize).next_power_of_two().max(1024)
    }

    fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: 2,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        }
    }
}

fn stream_error(e: impl std::fmt::Display) -> ModemError {
    ModemError::Frontend(format!("{}", e))
}

fn error_callback(errors: Sender<String>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        // A full queue means the workers already have plenty to report.
        let _ = errors.try_send(err.to_string());
    }
}

impl HardwareFrontend for SoundcardFrontend {
    fn name(&self) -> &'static str {
        "soundcard"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> Result<FrontendStreams> {
        let host = cpal::default_host();
        let input_device = host
            .default_input_device()
            .ok_or_else(|| ModemError::Frontend("No input device found".into()))?;
        let output_device = host
            .default_output_device()
            .ok_or_else(|| ModemError::Frontend("No output device found".into()))?;

        match input_device.description() {
            Ok(desc) => log::info!("Input device: {:?}", desc),
            Err(_) => log::info!("Input device: Unknown"),
        }
        match output_device.description() {
            Ok(desc) => log::info!("Output device: {:?}", desc),
            Err(_) => log::info!("Output device: Unknown"),
        }

        let config = self.stream_config();
        let (err_tx, err_rx) = crossbeam_channel::bounded(ERROR_QUEUE);
        let (mut rx_producer, rx_consumer) = spsc::<Complex<i16>>(self.ring_size());
        let (tx_producer, mut tx_consumer) = spsc::<Complex<i16>>(self.ring_size());

        let input = input_device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mut chunk = [Complex::<i16>::default(); CALLBACK_CHUNK];
                    for frames in data.chunks(2 * CALLBACK_CHUNK) {
                        let mut n = 0;
                        for pair in frames.chunks_exact(2) {
                            chunk[n] = Complex::new(q15_from_f32(pair[0]), q15_from_f32(pair[1]));
                            n += 1;
                        }
                        rx_producer.write(&chunk[..n]);
                    }
                },
                error_callback(err_tx.clone()),
                None,
            )
            .map_err(stream_error)?;

        let output = output_device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut chunk = [Complex::<i16>::default(); CALLBACK_CHUNK];
                    for frames in data.chunks_mut(2 * CALLBACK_CHUNK) {
                        let want = frames.len() / 2;
                        let got = tx_consumer.read(&mut chunk[..want]);
                        chunk[got..want].fill(Complex::default());
                        for (pair, s) in frames.chunks_exact_mut(2).zip(&chunk[..want]) {
                            pair[0] = q15_to_f32(s.re);
                            pair[1] = q15_to_f32(s.im);
                        }
                    }
                },
                error_callback(err_tx),
                None,
            )
            .map_err(stream_error)?;

        input.play().map_err(stream_error)?;
        output.play().map_err(stream_error)?;
        self.input = Some(input);
        self.output = Some(output);

        Ok(FrontendStreams {
            rx: Box::new(SoundcardRx {
                consumer: rx_consumer,
                errors: err_rx.clone(),
                scratch: Vec::new(),
            }),
            tx: Box::new(SoundcardTx {
                producer: tx_producer,
                errors: err_rx,
                scratch: Vec::new(),
            }),
        })
    }

    fn stop(&mut self) {
        for stream in [self.input.take(), self.output.take()].into_iter().flatten() {
            let _ = stream.pause();
        }
    }
}

impl Drop for SoundcardFrontend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn log_stream_errors(errors: &Receiver<String>) {
    for err in errors.try_iter() {
        log::warn!("Audio stream error: {}", err);
    }
}

struct SoundcardRx {
    consumer: Consumer<Complex<i16>>,
    errors: Receiver<String>,
    scratch: Vec<Complex<i16>>,
}

impl RxStream for SoundcardRx {
    fn read(&mut self, i: &mut [Q15], q: &mut [Q15]) -> Result<usize> {
        log_stream_errors(&self.errors);
        let want = i.len().min(q.len());
        if self.scratch.len() < want {
            self.scratch.resize(want, Complex::default());
        }
        let got = self.consumer.read(&mut self.scratch[..want]);
        split_iq(&self.scratch[..got], i, q);
        Ok(got)
    }
}

struct SoundcardTx {
    producer: Producer<Complex<i16>>,
    errors: Receiver<String>,
    scratch: Vec<Complex<i16>>,
}

impl TxStream for SoundcardTx {
    fn write(&mut self, i: &[Q15], q: &[Q15]) -> Result<usize> {
        log_stream_errors(&self.errors);
        let count = i.len().min(q.len()).min(self.producer.space());
        join_iq(i, q, count, &mut self.scratch);
        Ok(self.producer.write(&self.scratch))
    }
}
