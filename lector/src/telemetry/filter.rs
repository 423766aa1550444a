use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::error::{LectorError, Result};

/// Shared filter for every telemetry read. Empty fields match everything.
///
/// The date range is inclusive on both ends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub endpoint: Option<String>,
    pub success: Option<bool>,
}

impl TelemetryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.start_date.is_none()
            && self.end_date.is_none()
            && self.endpoint.is_none()
            && self.success.is_none()
    }
}

/// Storage form of a timestamp: fixed-width RFC 3339 UTC, so lexical order
/// is chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts full RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_filter_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| LectorError::InvalidArgument(format!("Invalid date: '{raw}'")))
}
