//! Timestamp utilities
//!
//! Timestamps are persisted as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that text comparison in the store matches
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Timestamp `days` days before now
pub fn days_ago(days: u32) -> DateTime<Utc> {
    now() - chrono::Duration::days(i64::from(days))
}

/// Render a timestamp in the persisted text form
pub fn to_storage(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a persisted timestamp
pub fn from_storage(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp {:?}: {}", text, e)))
}
