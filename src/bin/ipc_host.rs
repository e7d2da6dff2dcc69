use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use sdrmodem::constants::{FM_FRAME_LENGTH_SAMPLES, FM_SAMPLE_RATE, SHM_NAME};
use sdrmodem::transport::{Role, SharedMemoryIpc};

/// Pacing period for host traffic
const TICK: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "ipc_host")]
#[command(about = "Stand-in host: feeds TX audio to a running sdrmodem and records its RX audio")]
struct Args {
    /// Shared-memory object name
    #[arg(long, default_value = SHM_NAME)]
    shm_name: String,

    /// Test tone frequency in Hz
    #[arg(short, long, default_value_t = 1000.0)]
    tone: f64,

    /// Test tone amplitude, 0..1 of full scale
    #[arg(short, long, default_value_t = 0.5)]
    amplitude: f64,

    /// Transmit this 24 kHz mono 16-bit WAV instead of the tone
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Record received audio to this WAV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seconds to run
    #[arg(short, long, default_value_t = 5.0)]
    duration: f32,

    /// Handshake timeout in milliseconds, 0 waits forever
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u32,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Endless supply of TX audio.
enum Program {
    Tone { step: f64, phase: f64, amplitude: f64 },
    Recording { samples: Vec<i16>, position: usize },
}

impl Program {
    fn from_args(args: &Args) -> Result<Self> {
        let Some(path) = &args.input else {
            return Ok(Program::Tone {
                step: 2.0 * std::f64::consts::PI * args.tone / FM_SAMPLE_RATE as f64,
                phase: 0.0,
                amplitude: args.amplitude.clamp(0.0, 1.0) * i16::MAX as f64,
            });
        };
        let mut reader = WavReader::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let spec = reader.spec();
        if spec.channels != 1
            || spec.sample_rate != FM_SAMPLE_RATE
            || spec.bits_per_sample != 16
            || spec.sample_format != SampleFormat::Int
        {
            bail!(
                "{}: expected 24 kHz mono 16-bit PCM, got {} Hz, {} channels, {} bits",
                path.display(),
                spec.sample_rate,
                spec.channels,
                spec.bits_per_sample
            );
        }
        let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
        if samples.is_empty() {
            bail!("{} holds no samples", path.display());
        }
        Ok(Program::Recording {
            samples,
            position: 0,
        })
    }

    fn fill(&mut self, out: &mut [i16]) {
        match self {
            Program::Tone {
                step,
                phase,
                amplitude,
            } => {
                for s in out.iter_mut() {
                    *s = (*amplitude * phase.sin()).round() as i16;
                    *phase = (*phase + *step) % (2.0 * std::f64::consts::PI);
                }
            }
            Program::Recording { samples, position } => {
                for s in out.iter_mut() {
                    *s = samples[*position];
                    *position = (*position + 1) % samples.len();
                }
            }
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut program = Program::from_args(&args)?;
    let mut recorder = match &args.output {
        Some(path) => Some(
            WavWriter::create(
                path,
                WavSpec {
                    channels: 1,
                    sample_rate: FM_SAMPLE_RATE,
                    bits_per_sample: 16,
                    sample_format: SampleFormat::Int,
                },
            )
            .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => None,
    };

    let mut ipc = SharedMemoryIpc::attach(&args.shm_name, Role::Host)
        .context("Failed to open shared memory, is sdrmodem running?")?;
    ipc.set_ready();
    if !ipc.wait_for_other_side(args.timeout_ms) {
        bail!("Modem not ready within {} ms", args.timeout_ms);
    }
    log::info!("Connected to modem on {}", args.shm_name);

    let block = FM_FRAME_LENGTH_SAMPLES;
    let mut tx = vec![0i16; block];
    let mut rx = vec![0i16; 4 * block];
    let mut received = 0usize;

    let start = Instant::now();
    let run_for = Duration::from_secs_f32(args.duration.max(0.0));
    let mut next_tick = start;
    while start.elapsed() < run_for {
        if ipc.tx_space() >= block {
            program.fill(&mut tx);
            ipc.write_tx(&tx);
        }

        let ready = ipc.rx_available().min(rx.len());
        let got = ipc.read_rx(&mut rx[..ready]);
        received += got;
        if let Some(writer) = recorder.as_mut() {
            for &s in &rx[..got] {
                writer.write_sample(s)?;
            }
        }

        next_tick += TICK;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    ipc.clear_ready();
    if let Some(writer) = recorder {
        writer.finalize()?;
    }

    let stats = ipc.stats();
    log::info!(
        "Received {} samples ({:.2} s of audio)",
        received,
        received as f32 / FM_SAMPLE_RATE as f32
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
