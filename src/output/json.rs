use serde::Serialize;

use super::{Formatter, StatsSnapshot, iso8601_timestamp};

pub struct JsonFormatter;

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    #[serde(flatten)]
    snapshot: &'a StatsSnapshot,
}

impl Formatter for JsonFormatter {
    fn format(&self, snapshot: &StatsSnapshot) -> String {
        let record = Record {
            ts: iso8601_timestamp(),
            snapshot,
        };
        serde_json::to_string(&record).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }
}
