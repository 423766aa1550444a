use serde::{Deserialize, Serialize};

use crate::error::{LectorError, Result};
use crate::telemetry::{
    parse_filter_date, EndpointStats, HourlyBucket, OverallStats, StoredTelemetryEvent,
    TelemetryFilter,
};

/// Filter parameters shared by the stats endpoints.
///
/// Kept as raw strings so a bad value becomes a v1 `invalid_request`
/// instead of an extractor rejection.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    /// Inclusive lower bound. RFC 3339 timestamp or `YYYY-MM-DD`.
    pub start_date: Option<String>,
    /// Inclusive upper bound. RFC 3339 timestamp or `YYYY-MM-DD`.
    pub end_date: Option<String>,
    /// Exact endpoint path, e.g. `/api/v1/ocr:process`.
    pub endpoint: Option<String>,
    /// `true` or `false`.
    pub success: Option<String>,
}

impl StatsQuery {
    pub fn to_filter(&self) -> Result<TelemetryFilter> {
        fn non_empty(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        let mut filter = TelemetryFilter::new();
        if let Some(raw) = non_empty(&self.start_date) {
            filter = filter.since(parse_filter_date(raw)?);
        }
        if let Some(raw) = non_empty(&self.end_date) {
            filter = filter.until(parse_filter_date(raw)?);
        }
        if let Some(endpoint) = non_empty(&self.endpoint) {
            filter = filter.endpoint(endpoint);
        }
        if let Some(raw) = non_empty(&self.success) {
            let success = match raw.to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(LectorError::InvalidArgument(
                        "success must be true or false".to_string(),
                    ))
                }
            };
            filter = filter.success(success);
        }

        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(LectorError::InvalidArgument(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        Ok(filter)
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentQuery {
    /// Maximum events to return (default 100, max 1000).
    pub limit: Option<String>,
}

impl RecentQuery {
    /// Unparsable values fall back to the default.
    pub fn limit(&self) -> Option<usize> {
        self.limit.as_deref().and_then(|l| l.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct CleanupQuery {
    /// Days of telemetry to keep (default 90, minimum 1).
    pub days_to_keep: Option<String>,
}

impl CleanupQuery {
    pub fn days_to_keep(&self, default: i64) -> Result<i64> {
        match self.days_to_keep.as_deref().map(str::trim) {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse().map_err(|_| {
                LectorError::InvalidArgument("daysToKeep must be an integer".to_string())
            }),
        }
    }
}

/// Response body for `GET /api/v1/stats`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub overall: OverallStats,
    pub by_endpoint: Vec<EndpointStats>,
    pub hourly: Vec<HourlyBucket>,
}

/// Response body for `GET /api/v1/stats/recent`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct RecentEventsResponse {
    pub count: usize,
    pub requests: Vec<StoredTelemetryEvent>,
}

/// Response body for `POST /api/v1/stats:cleanup`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub deleted_count: u64,
    pub days_kept: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(start: Option<&str>, end: Option<&str>, success: Option<&str>) -> StatsQuery {
        StatsQuery {
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            endpoint: None,
            success: success.map(String::from),
        }
    }

    #[test]
    fn test_empty_query_is_empty_filter() {
        assert!(StatsQuery::default().to_filter().unwrap().is_empty());
        assert!(query(Some(""), Some("  "), Some("")).to_filter().unwrap().is_empty());
    }

    #[test]
    fn test_success_flag() {
        assert_eq!(
            query(None, None, Some("true")).to_filter().unwrap().success,
            Some(true)
        );
        assert_eq!(
            query(None, None, Some("0")).to_filter().unwrap().success,
            Some(false)
        );
        assert!(query(None, None, Some("maybe")).to_filter().is_err());
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(query(Some("2024-02-01"), Some("2024-01-01"), None)
            .to_filter()
            .is_err());
        assert!(query(Some("2024-01-01"), Some("2024-02-01"), None)
            .to_filter()
            .is_ok());
    }

    #[test]
    fn test_recent_limit_parse() {
        let q = RecentQuery {
            limit: Some("25".to_string()),
        };
        assert_eq!(q.limit(), Some(25));
        let q = RecentQuery {
            limit: Some("lots".to_string()),
        };
        assert_eq!(q.limit(), None);
    }

    #[test]
    fn test_cleanup_days() {
        assert_eq!(CleanupQuery::default().days_to_keep(90).unwrap(), 90);
        let q = CleanupQuery {
            days_to_keep: Some("30".to_string()),
        };
        assert_eq!(q.days_to_keep(90).unwrap(), 30);
        let q = CleanupQuery {
            days_to_keep: Some("0".to_string()),
        };
        assert_eq!(q.days_to_keep(90).unwrap(), 0);
        let q = CleanupQuery {
            days_to_keep: Some("ninety".to_string()),
        };
        assert!(q.days_to_keep(90).is_err());
    }
}
