use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::telemetry::{
    EndpointStats, HourlyBucket, OverallStats, StoredTelemetryEvent, TelemetryFilter,
};

/// Append, query and prune operations over the telemetry event collection.
///
/// Aggregates come back raw; rounding and derived ratios are the
/// aggregator's job.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn insert_event(&self, event: &StoredTelemetryEvent) -> Result<()>;

    async fn overall_stats(&self, filter: &TelemetryFilter) -> Result<OverallStats>;

    /// Grouped by endpoint, highest request count first.
    async fn endpoint_stats(&self, filter: &TelemetryFilter) -> Result<Vec<EndpointStats>>;

    /// Grouped by UTC hour, most recent first, at most `limit` buckets.
    async fn hourly_stats(&self, filter: &TelemetryFilter, limit: usize)
        -> Result<Vec<HourlyBucket>>;

    /// Newest first.
    async fn recent_events(
        &self,
        filter: &TelemetryFilter,
        limit: usize,
    ) -> Result<Vec<StoredTelemetryEvent>>;

    /// Delete every event created strictly before `cutoff`.
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// A complete database backend: the telemetry store plus lifecycle hooks.
#[async_trait]
pub trait DatabaseBackend: TelemetryStore {
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;
}
