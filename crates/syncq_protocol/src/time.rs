//! Wall-clock helpers.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses a remote timestamp field into epoch milliseconds.
///
/// Accepts integer epoch milliseconds or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
