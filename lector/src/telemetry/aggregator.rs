use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::db::TelemetryStore;
use crate::error::{LectorError, Result};

use super::event::StoredTelemetryEvent;
use super::filter::{format_timestamp, TelemetryFilter};

pub const DEFAULT_RECENT_LIMIT: usize = 100;
pub const MAX_RECENT_LIMIT: usize = 1000;
pub const HOURLY_BUCKET_LIMIT: usize = 24;

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Percentage, two decimals. 0 when there are no requests.
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: u64,
    pub max_response_time_ms: u64,
    /// Mean over events that carry a confidence.
    pub avg_confidence: f64,
    pub total_data_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub endpoint: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HourlyBucket {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Read-side queries over recorded telemetry. Nothing is cached.
#[derive(Clone)]
pub struct TelemetryAggregator {
    store: Arc<dyn TelemetryStore>,
}

impl TelemetryAggregator {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }

    pub async fn overall_stats(&self, filter: &TelemetryFilter) -> Result<OverallStats> {
        let mut stats = self.store.overall_stats(filter).await?;

        stats.success_rate = if stats.total_requests > 0 {
            round2(stats.successful_requests as f64 / stats.total_requests as f64 * 100.0)
        } else {
            0.0
        };
        stats.avg_response_time_ms = round2(stats.avg_response_time_ms);
        stats.avg_confidence = round2(stats.avg_confidence);

        Ok(stats)
    }

    /// Per-endpoint counters, busiest endpoint first.
    pub async fn endpoint_stats(&self, filter: &TelemetryFilter) -> Result<Vec<EndpointStats>> {
        let mut stats = self.store.endpoint_stats(filter).await?;
        for entry in &mut stats {
            entry.avg_response_time_ms = round2(entry.avg_response_time_ms);
        }
        Ok(stats)
    }

    /// Up to 24 hourly buckets, most recent hour first.
    pub async fn hourly_stats(&self, filter: &TelemetryFilter) -> Result<Vec<HourlyBucket>> {
        self.store.hourly_stats(filter, HOURLY_BUCKET_LIMIT).await
    }

    /// Newest events first. `limit` defaults to 100 and is clamped to 1..=1000.
    pub async fn recent_events(
        &self,
        limit: Option<usize>,
        filter: &TelemetryFilter,
    ) -> Result<Vec<StoredTelemetryEvent>> {
        let limit = limit
            .unwrap_or(DEFAULT_RECENT_LIMIT)
            .clamp(1, MAX_RECENT_LIMIT);
        self.store.recent_events(filter, limit).await
    }

    /// Delete events older than `days_to_keep` days. Returns the number removed.
    pub async fn prune_older_than(&self, days_to_keep: i64) -> Result<u64> {
        if days_to_keep < 1 {
            return Err(LectorError::InvalidArgument(
                "daysToKeep must be at least 1".to_string(),
            ));
        }

        // Ages past chrono's range keep everything.
        let cutoff = Duration::try_days(days_to_keep)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = self.store.delete_events_before(cutoff).await?;

        info!(
            deleted_count = deleted,
            cutoff = %format_timestamp(&cutoff),
            "Old stats deleted"
        );

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns canned numbers and counts storage calls.
    #[derive(Default)]
    struct CannedStore {
        calls: AtomicUsize,
        last_limit: AtomicUsize,
        last_cutoff: std::sync::Mutex<Option<DateTime<Utc>>>,
    }

    #[async_trait]
    impl TelemetryStore for CannedStore {
        async fn insert_event(&self, _event: &StoredTelemetryEvent) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn overall_stats(&self, _filter: &TelemetryFilter) -> Result<OverallStats> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OverallStats {
                total_requests: 3,
                successful_requests: 2,
                failed_requests: 1,
                avg_response_time_ms: 10.0 / 3.0,
                avg_confidence: 88.888,
                ..Default::default()
            })
        }

        async fn endpoint_stats(&self, _filter: &TelemetryFilter) -> Result<Vec<EndpointStats>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn hourly_stats(
            &self,
            _filter: &TelemetryFilter,
            limit: usize,
        ) -> Result<Vec<HourlyBucket>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_limit.store(limit, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn recent_events(
            &self,
            _filter: &TelemetryFilter,
            limit: usize,
        ) -> Result<Vec<StoredTelemetryEvent>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_limit.store(limit, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_cutoff.lock().unwrap() = Some(cutoff);
            Ok(0)
        }
    }

    fn aggregator() -> (TelemetryAggregator, Arc<CannedStore>) {
        let store = Arc::new(CannedStore::default());
        (TelemetryAggregator::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_overall_stats_rounds() {
        let (aggregator, _) = aggregator();
        let stats = aggregator.overall_stats(&TelemetryFilter::new()).await.unwrap();
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.avg_response_time_ms, 3.33);
        assert_eq!(stats.avg_confidence, 88.89);
    }

    #[tokio::test]
    async fn test_recent_limit_is_clamped() {
        let (aggregator, store) = aggregator();
        let filter = TelemetryFilter::new();

        aggregator.recent_events(None, &filter).await.unwrap();
        assert_eq!(store.last_limit.load(Ordering::SeqCst), DEFAULT_RECENT_LIMIT);

        aggregator.recent_events(Some(0), &filter).await.unwrap();
        assert_eq!(store.last_limit.load(Ordering::SeqCst), 1);

        aggregator.recent_events(Some(50_000), &filter).await.unwrap();
        assert_eq!(store.last_limit.load(Ordering::SeqCst), MAX_RECENT_LIMIT);
    }

    #[tokio::test]
    async fn test_hourly_is_capped_at_24() {
        let (aggregator, store) = aggregator();
        aggregator.hourly_stats(&TelemetryFilter::new()).await.unwrap();
        assert_eq!(store.last_limit.load(Ordering::SeqCst), 24);
    }

    #[tokio::test]
    async fn test_prune_rejects_before_storage() {
        let (aggregator, store) = aggregator();
        for days in [0, -5] {
            assert!(matches!(
                aggregator.prune_older_than(days).await,
                Err(LectorError::InvalidArgument(_))
            ));
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        assert_eq!(aggregator.prune_older_than(1).await.unwrap(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prune_with_huge_age_keeps_everything() {
        let (aggregator, store) = aggregator();
        for days in [100_000_000, i64::MAX] {
            assert_eq!(aggregator.prune_older_than(days).await.unwrap(), 0);
            assert_eq!(
                *store.last_cutoff.lock().unwrap(),
                Some(DateTime::<Utc>::MIN_UTC)
            );
        }

        aggregator.prune_older_than(90).await.unwrap();
        let cutoff = store.last_cutoff.lock().unwrap().unwrap();
        assert_eq!((Utc::now() - cutoff).num_days(), 90);
    }
}
