//! Timestamp encoding for SQLite text columns
//!
//! Fixed-width RFC 3339 with microseconds and a `Z` suffix, so lexical
//! comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

/// Parse a stored timestamp, falling back to now for malformed rows
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
