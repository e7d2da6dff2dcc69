//! Configuration for the SDR modem.
//!
//! Every section has a `Default` matching the constants in
//! [`crate::constants`], so a TOML file only needs to name what it changes:
//!
//! ```toml
//! [sdr]
//! sample_rate = 960000
//! frontend = "loopback"
//!
//! [fm]
//! squelch_threshold = 3277
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ModemError, Result};
use crate::signal_processing::ResampleRatio;

/// Frequency or sample rate given on the command line.
///
/// # Parsing formats
/// - `1000000` - plain Hz
/// - `5000hz` or `5000Hz` - Hz (explicit)
/// - `48k`, `48kHz` - kilohertz
/// - `1M`, `1MHz`, `1msps` - megahertz
///
/// # Example
/// ```
/// use sdrmodem::config::Frequency;
///
/// let rate: Frequency = "1.2MHz".parse().unwrap();
/// assert_eq!(rate.as_hz_u32(), 1_200_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frequency(f64);

impl Frequency {
    pub fn from_hz(hz: f64) -> Self {
        Self(hz)
    }

    pub fn as_hz(&self) -> f64 {
        self.0
    }

    pub fn as_hz_u32(&self) -> u32 {
        self.0.round() as u32
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1e6 {
            write!(f, "{}MHz", self.0 / 1e6)
        } else if self.0 >= 1e3 {
            write!(f, "{}kHz", self.0 / 1e3)
        } else {
            write!(f, "{}Hz", self.0)
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();

        let (num, scale) = if let Some(num) = lower
            .strip_suffix("msps")
            .or_else(|| lower.strip_suffix("mhz"))
            .or_else(|| lower.strip_suffix('m'))
        {
            (num, 1e6)
        } else if let Some(num) = lower
            .strip_suffix("ksps")
            .or_else(|| lower.strip_suffix("khz"))
            .or_else(|| lower.strip_suffix('k'))
        {
            (num, 1e3)
        } else {
            (lower.strip_suffix("hz").unwrap_or(&lower), 1.0)
        };

        let value: f64 = num
            .trim()
            .parse()
            .map_err(|_| format!("invalid frequency: {}", s))?;
        if value <= 0.0 {
            return Err("frequency must be positive".to_string());
        }
        Ok(Self(value * scale))
    }
}

/// Hardware front end selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FrontendKind {
    /// TX I/Q fed straight back into RX
    Loopback,
    /// Stereo sound device carrying I (left) and Q (right)
    Soundcard,
    /// Stereo 16-bit WAV files
    Wav,
}

/// Preset squelch levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SquelchLevel {
    Low,
    Medium,
    High,
}

impl SquelchLevel {
    pub fn threshold(self) -> i16 {
        match self {
            SquelchLevel::Low => FM_SQUELCH_THRESHOLD_LOW,
            SquelchLevel::Medium => FM_SQUELCH_THRESHOLD_MEDIUM,
            SquelchLevel::High => FM_SQUELCH_THRESHOLD_HIGH,
        }
    }
}

/// Statistics output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatsFormat {
    Text,
    Json,
    Csv,
}

/// Complete modem configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// RF side: sample rate, deviation, front end
    pub sdr: SdrConfig,
    /// FM audio chains
    pub fm: FmConfig,
    /// Worker loops and local queues
    pub io: IoConfig,
    /// Shared-memory link to the host
    pub ipc: IpcConfig,
    /// Periodic statistics report
    pub stats: StatsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdrConfig {
    /// SDR sample rate in Hz, must reduce to a small ratio against 24 kHz
    pub sample_rate: u32,
    /// Peak FM deviation in Hz
    pub deviation_hz: f32,
    pub frontend: FrontendKind,
    /// Input file for the WAV front end (RX)
    pub rx_wav: Option<PathBuf>,
    /// Output file for the WAV front end (TX)
    pub tx_wav: Option<PathBuf>,
    /// Loop the RX WAV file instead of going quiet at its end
    pub wav_loop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FmConfig {
    /// Envelope level (Q15) that opens the squelch
    pub squelch_threshold: i16,
    /// Hang time in 20 ms frames
    pub squelch_hang_frames: u32,
    /// RX audio gain (Q15)
    pub rx_gain: i16,
    /// TX audio gain (Q15)
    pub tx_gain: i16,
    pub deemphasis: bool,
    pub preemphasis: bool,
    /// TX watchdog in 160-sample blocks
    pub timeout_frames: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Baseband samples moved per worker iteration
    pub block_size: usize,
    /// Sleep when a worker finds nothing to do
    pub idle_sleep_us: u64,
    /// Slots per local queue (power of two)
    pub queue_size: usize,
    /// Ask the OS for real-time scheduling on worker threads
    pub realtime: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    /// POSIX shared-memory object name
    pub name: String,
    /// Handshake timeout in milliseconds, 0 waits forever
    pub handshake_timeout_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Seconds between reports, 0 disables reporting
    pub interval_secs: f32,
    pub format: StatsFormat,
}

impl Default for SdrConfig {
    fn default() -> Self {
        Self {
            sample_rate: SDR_SAMPLE_RATE,
            deviation_hz: FM_DEVIATION_HZ,
            frontend: FrontendKind::Loopback,
            rx_wav: None,
            tx_wav: None,
            wav_loop: false,
        }
    }
}

impl Default for FmConfig {
    fn default() -> Self {
        Self {
            squelch_threshold: FM_SQUELCH_THRESHOLD_MEDIUM,
            squelch_hang_frames: FM_SQUELCH_HANG_FRAMES,
            rx_gain: FM_AUDIO_GAIN_DEFAULT,
            tx_gain: FM_AUDIO_GAIN_DEFAULT,
            deemphasis: true,
            preemphasis: true,
            timeout_frames: FM_TIMEOUT_FRAMES,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            block_size: BASEBAND_BLOCK_SIZE,
            idle_sleep_us: IO_IDLE_SLEEP_US,
            queue_size: IO_QUEUE_SIZE,
            realtime: true,
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            name: SHM_NAME.to_string(),
            handshake_timeout_ms: 0,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5.0,
            format: StatsFormat::Text,
        }
    }
}

impl ModemConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ModemError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ModemError::Config(e.to_string()))
    }

    /// Interpolation/decimation pair between the baseband and SDR rates.
    pub fn resample_ratio(&self) -> Result<ResampleRatio> {
        ResampleRatio::from_rates(FM_SAMPLE_RATE, self.sdr.sample_rate)
    }

    pub fn validate(&self) -> Result<()> {
        let ratio = self.resample_ratio()?;
        if ratio.interpolation > MAX_RESAMPLE_FACTOR || ratio.decimation > MAX_RESAMPLE_FACTOR {
            return Err(ModemError::Config(format!(
                "SDR rate {} Hz reduces to {}/{} against {} Hz, factors above {} are not supported",
                self.sdr.sample_rate,
                ratio.interpolation,
                ratio.decimation,
                FM_SAMPLE_RATE,
                MAX_RESAMPLE_FACTOR
            )));
        }

        let nyquist = self.sdr.sample_rate as f32 / 2.0;
        if !(self.sdr.deviation_hz > 0.0 && self.sdr.deviation_hz < nyquist) {
            return Err(ModemError::Config(format!(
                "deviation {} Hz outside (0, {}) Hz",
                self.sdr.deviation_hz, nyquist
            )));
        }

        if self.io.block_size == 0 {
            return Err(ModemError::Config("block_size must be positive".to_string()));
        }
        if !self.io.queue_size.is_power_of_two() || self.io.queue_size <= self.io.block_size {
            return Err(ModemError::Config(format!(
                "queue_size {} must be a power of two larger than block_size {}",
                self.io.queue_size, self.io.block_size
            )));
        }

        if self.sdr.frontend == FrontendKind::Wav
            && self.sdr.rx_wav.is_none()
            && self.sdr.tx_wav.is_none()
        {
            return Err(ModemError::Config(
                "wav front end needs rx_wav and/or tx_wav".to_string(),
            ));
        }

        if self.fm.squelch_threshold < 0 {
            return Err(ModemError::Config(
                "squelch_threshold must not be negative".to_string(),
            ));
        }

        if !self.ipc.name.starts_with('/') {
            return Err(ModemError::Config(format!(
                "shared memory name {:?} must start with '/'",
                self.ipc.name
            )));
        }

        Ok(())
    }
}
