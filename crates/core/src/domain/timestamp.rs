// Epoch-millisecond helpers

use chrono::{SecondsFormat, TimeZone, Utc};

/// Format epoch milliseconds as an RFC 3339 UTC string (`2024-05-01T10:00:00.000Z`)
pub fn to_rfc3339(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
