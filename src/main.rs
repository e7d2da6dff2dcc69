use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;

use sdrmodem::config::{Frequency, FrontendKind, ModemConfig, SquelchLevel, StatsFormat};
use sdrmodem::frontend::create_frontend;
use sdrmodem::output::{StatsSnapshot, create_formatter};
use sdrmodem::transport::{Role, SharedMemoryIpc};
use sdrmodem::{IoContext, ModemLoop, RxWorker, TxWorker};

#[derive(Parser, Debug)]
#[command(name = "sdrmodem")]
#[command(about = "FM software modem between a shared-memory host link and an SDR front end")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SDR sample rate (e.g. 1M, 960k, 48000)
    #[arg(short = 'r', long)]
    sample_rate: Option<Frequency>,

    /// Peak FM deviation (e.g. 5k, 2500hz)
    #[arg(short, long)]
    deviation: Option<Frequency>,

    /// Front end: loopback, soundcard, wav
    #[arg(short, long, value_enum)]
    frontend: Option<FrontendKind>,

    /// Stereo I/Q recording to receive from (wav front end)
    #[arg(long)]
    rx_wav: Option<PathBuf>,

    /// Stereo I/Q file to transmit into (wav front end)
    #[arg(long)]
    tx_wav: Option<PathBuf>,

    /// Squelch level: low, medium, high
    #[arg(short, long, value_enum)]
    squelch: Option<SquelchLevel>,

    /// Shared-memory object name
    #[arg(long)]
    shm_name: Option<String>,

    /// Statistics format: text, json, csv
    #[arg(long, value_enum)]
    stats_format: Option<StatsFormat>,

    /// Seconds between statistics reports, 0 disables them
    #[arg(long)]
    stats_interval: Option<f32>,

    /// Do not request real-time scheduling for the workers
    #[arg(long)]
    no_realtime: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply(&self, config: &mut ModemConfig) {
        if let Some(rate) = self.sample_rate {
            config.sdr.sample_rate = rate.as_hz_u32();
        }
        if let Some(deviation) = self.deviation {
            config.sdr.deviation_hz = deviation.as_hz() as f32;
        }
        if let Some(frontend) = self.frontend {
            config.sdr.frontend = frontend;
        }
        if self.rx_wav.is_some() {
            config.sdr.rx_wav = self.rx_wav.clone();
        }
        if self.tx_wav.is_some() {
            config.sdr.tx_wav = self.tx_wav.clone();
        }
        if let Some(level) = self.squelch {
            config.fm.squelch_threshold = level.threshold();
        }
        if let Some(name) = &self.shm_name {
            config.ipc.name = name.clone();
        }
        if let Some(format) = self.stats_format {
            config.stats.format = format;
        }
        if let Some(interval) = self.stats_interval {
            config.stats.interval_secs = interval;
        }
        if self.no_realtime {
            config.io.realtime = false;
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

    let mut config = match &args.config {
        Some(path) => ModemConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ModemConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if args.dump_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let ratio = config.resample_ratio()?;
    log::info!(
        "SDR {} Hz, deviation {} Hz, resampling 24 kHz by {}/{}",
        config.sdr.sample_rate,
        config.sdr.deviation_hz,
        ratio.interpolation,
        ratio.decimation
    );

    let io = Arc::new(IoContext::new(config.clone())?);
    let ipc = SharedMemoryIpc::attach(&config.ipc.name, Role::Modem)
        .context("Failed to create shared memory")?;

    let mut frontend = create_frontend(&config)?;
    let streams = frontend.start().context("Failed to start front end")?;
    let tx_worker = TxWorker::new(Arc::clone(&io), streams.tx)?.spawn()?;
    let rx_worker = RxWorker::new(Arc::clone(&io), streams.rx)?.spawn()?;

    ipc.set_ready();
    log::info!("Waiting for host on {}", config.ipc.name);
    if !ipc.wait_for_other_side(config.ipc.handshake_timeout_ms) {
        io.shutdown();
        bail!(
            "Host did not attach within {} ms",
            config.ipc.handshake_timeout_ms
        );
    }
    log::info!("Host attached");

    let mut modem = ModemLoop::new(Arc::clone(&io), ipc)?;
    let formatter = create_formatter(config.stats.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let idle = Duration::from_micros(config.io.idle_sleep_us);
    let report_every = Duration::from_secs_f32(config.stats.interval_secs.max(0.0));
    let mut last_report = Instant::now();
    let mut host_present = true;

    while !tx_worker.is_finished() && !rx_worker.is_finished() {
        if modem.run_once() == 0 {
            thread::sleep(idle);
        }

        let peer = modem.ipc().is_other_side_ready();
        if peer != host_present {
            host_present = peer;
            if peer {
                log::info!("Host attached again");
            } else {
                log::warn!("Host detached, keeping the carrier up");
            }
        }

        if !report_every.is_zero() && last_report.elapsed() >= report_every {
            let snapshot = StatsSnapshot {
                ipc: modem.ipc().stats(),
                io: io.snapshot(),
                chain: modem.status(),
            };
            println!("{}", formatter.format(&snapshot));
            last_report = Instant::now();
        }
    }

    io.shutdown();
    frontend.stop();
    for (name, worker) in [("TX", tx_worker), ("RX", rx_worker)] {
        match worker.join() {
            Ok(result) => result.with_context(|| format!("{} worker failed", name))?,
            Err(_) => bail!("{} worker panicked", name),
        }
    }
    Ok(())
}
