//! Periodic statistics report.

mod csv;
mod json;
mod text;

use chrono::Utc;
use serde::Serialize;

pub use self::csv::CsvFormatter;
pub use self::json::JsonFormatter;
pub use self::text::TextFormatter;

use crate::bridge::ChainStatus;
use crate::config::StatsFormat;
use crate::io::IoSnapshot;
use crate::transport::IpcStats;

/// Everything the modem reports at one instant
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub ipc: IpcStats,
    pub io: IoSnapshot,
    pub chain: ChainStatus,
}

pub trait Formatter: Send {
    fn format(&self, snapshot: &StatsSnapshot) -> String;

    fn header(&self) -> Option<&'static str> {
        None
    }
}

pub fn create_formatter(format: StatsFormat, verbose: bool) -> Box<dyn Formatter> {
    match format {
        StatsFormat::Text => Box::new(TextFormatter::new(verbose)),
        StatsFormat::Json => Box::new(JsonFormatter),
        StatsFormat::Csv => Box::new(CsvFormatter),
    }
}

pub fn iso8601_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[cfg(test)]
pub(crate) fn sample_snapshot() -> StatsSnapshot {
    use crate::fm::{RxState, TxState};
    use crate::io::TimingSummary;
    use crate::transport::RingStats;

    StatsSnapshot {
        ipc: IpcStats {
            rx_overruns: 1,
            rx_underruns: 2,
            tx_overruns: 0,
            tx_underruns: 3,
            rx_samples: 48_000,
            tx_samples: 24_000,
            rx_available: 480,
            tx_available: 0,
        },
        io: IoSnapshot {
            tx_baseband: 24_000,
            tx_iq: 1_000_000,
            rx_iq: 2_000_000,
            rx_baseband: 48_000,
            rx_dropped: 0,
            tx_queue: RingStats::default(),
            rx_queue: RingStats {
                overruns: 0,
                underruns: 4,
                written: 48_000,
                read: 47_520,
            },
            tx_queued: 1440,
            rx_queued: 480,
            tx_timing: Some(TimingSummary {
                count: 1000,
                mean_us: 120.5,
                std_dev_us: 10.0,
                min_us: 90.0,
                max_us: 400.0,
            }),
            rx_timing: None,
        },
        chain: ChainStatus {
            rx_state: RxState::Audio,
            tx_state: TxState::Idle,
            rssi: Some(700),
            rx_frames: 100,
            tx_dropped: 5,
        },
    }
}
