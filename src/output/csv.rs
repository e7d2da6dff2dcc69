use super::{Formatter, StatsSnapshot, iso8601_timestamp};

pub struct CsvFormatter;

impl Formatter for CsvFormatter {
    fn format(&self, s: &StatsSnapshot) -> String {
        let rssi = s.chain.rssi.map_or(String::new(), |r| r.to_string());
        let tx_loop = s
            .io
            .tx_timing
            .map_or(String::new(), |t| format!("{:.1}", t.mean_us));
        let rx_loop = s
            .io
            .rx_timing
            .map_or(String::new(), |t| format!("{:.1}", t.mean_us));
        format!(
            "{},{:?},{:?},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            iso8601_timestamp(),
            s.chain.rx_state,
            s.chain.tx_state,
            rssi,
            s.ipc.rx_samples,
            s.ipc.rx_overruns,
            s.ipc.rx_underruns,
            s.ipc.tx_samples,
            s.ipc.tx_overruns,
            s.ipc.tx_underruns,
            s.io.tx_iq,
            s.io.rx_iq,
            s.io.rx_dropped,
            s.chain.tx_dropped,
            s.io.tx_queued,
            tx_loop,
            rx_loop
        )
    }

    fn header(&self) -> Option<&'static str> {
        Some(
            "ts,rx_state,tx_state,rssi,rx_samples,rx_overruns,rx_underruns,tx_samples,tx_overruns,tx_underruns,tx_iq,rx_iq,rx_dropped,tx_dropped,tx_queued,tx_loop_us,rx_loop_us",
        )
    }
}
