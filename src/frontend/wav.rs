use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::{FrontendStreams, HardwareFrontend, Pacer, RxStream, TxStream};
use crate::error::{ModemError, Result};
use crate::fixed_point::Q15;

/// Stereo 16-bit WAV files as the radio: RX plays a recording, TX records.
///
/// Left is I, right is Q. Both sides run in real time at the SDR rate. With
/// no RX file the receiver hears nothing; with no TX file transmitted I/Q
/// goes nowhere.
pub struct WavFrontend {
    sample_rate: u32,
    rx_path: Option<PathBuf>,
    tx_path: Option<PathBuf>,
    looping: bool,
}

impl WavFrontend {
    pub fn new(
        sample_rate: u32,
        rx_path: Option<PathBuf>,
        tx_path: Option<PathBuf>,
        looping: bool,
    ) -> Self {
        Self {
            sample_rate,
            rx_path,
            tx_path,
            looping,
        }
    }

    fn spec(&self) -> WavSpec {
        WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn open_reader(&self, path: &PathBuf) -> Result<WavReader<BufReader<File>>> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels != 2
            || spec.bits_per_sample != 16
            || spec.sample_format != SampleFormat::Int
        {
            return Err(ModemError::Frontend(format!(
                "{}: expected stereo 16-bit PCM, got {} channels of {} bits",
                path.display(),
                spec.channels,
                spec.bits_per_sample
            )));
        }
        if spec.sample_rate != self.sample_rate {
            return Err(ModemError::Frontend(format!(
                "{}: recorded at {} Hz, SDR runs at {} Hz",
                path.display(),
                spec.sample_rate,
                self.sample_rate
            )));
        }
        log::info!(
            "RX from {} ({} s)",
            path.display(),
            reader.duration() as f32 / self.sample_rate as f32
        );
        Ok(reader)
    }
}

impl HardwareFrontend for WavFrontend {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn start(&mut self) -> Result<FrontendStreams> {
        let reader = match &self.rx_path {
            Some(path) => Some(self.open_reader(path)?),
            None => None,
        };
        let writer = match &self.tx_path {
            Some(path) => {
                log::info!("TX to {}", path.display());
                Some(WavWriter::create(path, self.spec())?)
            }
            None => None,
        };

        Ok(FrontendStreams {
            rx: Box::new(WavRx {
                reader,
                looping: self.looping,
                pacer: Pacer::new(self.sample_rate),
            }),
            tx: Box::new(WavTx {
                writer,
                pacer: Pacer::new(self.sample_rate),
            }),
        })
    }

    fn stop(&mut self) {}
}

struct WavRx {
    reader: Option<WavReader<BufReader<File>>>,
    looping: bool,
    pacer: Pacer,
}

impl RxStream for WavRx {
    fn read(&mut self, i: &mut [Q15], q: &mut [Q15]) -> Result<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(0);
        };
        let want = i.len().min(q.len()).min(self.pacer.allowance());
        let mut got = 0;
        while got < want {
            let pair = {
                let mut samples = reader.samples::<i16>();
                (samples.next(), samples.next())
            };
            match pair {
                (Some(re), Some(im)) => {
                    i[got] = re?;
                    q[got] = im?;
                    got += 1;
                }
                _ if self.looping => {
                    reader.seek(0)?;
                }
                _ => {
                    log::info!("RX recording finished");
                    self.reader = None;
                    break;
                }
            }
        }
        self.pacer.consume(got);
        Ok(got)
    }
}

struct WavTx {
    writer: Option<WavWriter<BufWriter<File>>>,
    pacer: Pacer,
}

impl TxStream for WavTx {
    fn write(&mut self, i: &[Q15], q: &[Q15]) -> Result<usize> {
        let count = i.len().min(q.len()).min(self.pacer.allowance());
        if let Some(writer) = self.writer.as_mut() {
            for (&re, &im) in i[..count].iter().zip(&q[..count]) {
                writer.write_sample(re)?;
                writer.write_sample(im)?;
            }
        }
        self.pacer.consume(count);
        Ok(count)
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
