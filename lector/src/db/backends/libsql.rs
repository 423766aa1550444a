use crate::db::connection::Database;
use crate::db::repository::TelemetryRepository;
use crate::db::traits::{DatabaseBackend, TelemetryStore};
use crate::error::Result;
use crate::telemetry::{
    EndpointStats, HourlyBucket, OverallStats, StoredTelemetryEvent, TelemetryFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TelemetryStore for LibSqlBackend {
    async fn insert_event(&self, event: &StoredTelemetryEvent) -> Result<()> {
        let conn = self.db.connect()?;
        TelemetryRepository::create(&conn, event).await
    }
    async fn overall_stats(&self, filter: &TelemetryFilter) -> Result<OverallStats> {
        let conn = self.db.connect()?;
        TelemetryRepository::overall(&conn, filter).await
    }
    async fn endpoint_stats(&self, filter: &TelemetryFilter) -> Result<Vec<EndpointStats>> {
        let conn = self.db.connect()?;
        TelemetryRepository::by_endpoint(&conn, filter).await
    }
    async fn hourly_stats(
        &self,
        filter: &TelemetryFilter,
        limit: usize,
    ) -> Result<Vec<HourlyBucket>> {
        let conn = self.db.connect()?;
        TelemetryRepository::hourly(&conn, filter, limit).await
    }
    async fn recent_events(
        &self,
        filter: &TelemetryFilter,
        limit: usize,
    ) -> Result<Vec<StoredTelemetryEvent>> {
        let conn = self.db.connect()?;
        TelemetryRepository::recent(&conn, filter, limit).await
    }
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.db.connect()?;
        TelemetryRepository::delete_before(&conn, cutoff).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }
}
