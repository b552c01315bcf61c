//! Layouts for the lines written to the log sink.

use crate::core::LogEntry;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// The shape of the lines written to the log sink.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    PlainText,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("Json"),
            OutputFormat::PlainText => f.write_str("PlainText"),
        }
    }
}

impl OutputFormat {
    pub fn formatter(&self) -> Box<dyn LogFormatter> {
        match self {
            OutputFormat::Json => Box::new(JsonFormatter),
            OutputFormat::PlainText => Box::new(CloudWatchFormatter),
        }
    }
}

/// A trait for turning one log entry into one sink line.
pub trait LogFormatter: Send + Sync {
    fn format(&self, entry: &LogEntry, timestamp: DateTime<Utc>) -> String;
}

/// Native CloudWatch layout:
/// `<timestamp>[\t<requestId>]\t<LEVEL>\t<placeholder> \t<json message>`.
pub struct CloudWatchFormatter;

impl LogFormatter for CloudWatchFormatter {
    fn format(&self, entry: &LogEntry, timestamp: DateTime<Utc>) -> String {
        let time = timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let request_id = entry
            .display_id()
            .map(|id| format!("\t{}", id))
            .unwrap_or_default();
        format!(
            "{}{}\t{}\t{} \t{}",
            time,
            request_id,
            entry.level.as_str(),
            entry.placeholder,
            entry.msg
        )
    }
}

/// One JSON object per line: the structured entry plus a timestamp.
pub struct JsonFormatter;

impl LogFormatter for JsonFormatter {
    fn format(&self, entry: &LogEntry, timestamp: DateTime<Utc>) -> String {
        let mut value = serde_json::to_value(entry).unwrap_or_else(|e| {
            json!({ "level": entry.level.ordinal(), "serializationError": e.to_string() })
        });
        if let Value::Object(fields) = &mut value {
            fields.insert(
                "timestamp".to_string(),
                Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        value.to_string()
    }
}
