use super::{Formatter, StatsSnapshot};

pub struct TextFormatter {
    verbose: bool,
}

impl TextFormatter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Formatter for TextFormatter {
    fn format(&self, s: &StatsSnapshot) -> String {
        let rssi = s.chain.rssi.map_or("-".to_string(), |r| r.to_string());
        let line = format!(
            "RX: {:?} rssi {} | TX: {:?} | host rx {} (ovr {}) tx {} (und {})",
            s.chain.rx_state,
            rssi,
            s.chain.tx_state,
            s.ipc.rx_samples,
            s.ipc.rx_overruns,
            s.ipc.tx_samples,
            s.ipc.tx_underruns,
        );
        if !self.verbose {
            return line;
        }

        let timing = |t: &Option<crate::io::TimingSummary>| {
            t.map_or("-".to_string(), |t| {
                format!("{:.1}/{:.1}us", t.mean_us, t.max_us)
            })
        };
        format!(
            "{} [iq tx {} rx {}, queues tx {} rx {}, rx ovr {} und {}, dropped rx {} tx {}, loop tx {} rx {}]",
            line,
            s.io.tx_iq,
            s.io.rx_iq,
            s.io.tx_queued,
            s.io.rx_queued,
            s.io.rx_queue.overruns,
            s.io.rx_queue.underruns,
            s.io.rx_dropped,
            s.chain.tx_dropped,
            timing(&s.io.tx_timing),
            timing(&s.io.rx_timing),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::sample_snapshot;

    #[test]
    fn test_text_summary() {
        let line = TextFormatter::new(false).format(&sample_snapshot());
        assert_eq!(
            line,
            "RX: Audio rssi 700 | TX: Idle | host rx 48000 (ovr 1) tx 24000 (und 3)"
        );
    }

    #[test]
    fn test_text_verbose_adds_io() {
        let line = TextFormatter::new(true).format(&sample_snapshot());
        assert!(line.contains("iq tx 1000000 rx 2000000"));
        assert!(line.contains("loop tx 120.5/400.0us rx -"));
    }
}
