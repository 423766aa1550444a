use chrono::{DateTime, Utc};
use libsql::{params, Connection, Value};

use crate::error::Result;
use crate::telemetry::{
    format_timestamp, EndpointStats, HourlyBucket, OverallStats, StoredTelemetryEvent,
    TelemetryEvent, TelemetryFilter,
};

const EVENT_COLUMNS: &str = "id, endpoint, method, status_code, response_time_ms, \
     file_size_bytes, file_name, language, confidence, text_length, client_ip, user_agent, \
     error_message, success, created_at";

pub struct TelemetryRepository;

impl TelemetryRepository {
    pub async fn create(conn: &Connection, stored: &StoredTelemetryEvent) -> Result<()> {
        let event = &stored.event;
        conn.execute(
            &format!(
                "INSERT INTO telemetry_events ({EVENT_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
            ),
            params![
                stored.id.clone(),
                event.endpoint.clone(),
                event.method.clone(),
                event.status_code as i64,
                event.response_time_ms as i64,
                event.file_size_bytes,
                event.file_name.clone(),
                event.language.clone(),
                event.confidence,
                event.text_length,
                event.client_ip.clone(),
                event.user_agent.clone(),
                event.error_message.clone(),
                event.success as i32,
                format_timestamp(&stored.created_at),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn overall(conn: &Connection, filter: &TelemetryFilter) -> Result<OverallStats> {
        let (where_clause, values) = Self::filter_clause(filter);
        let sql = format!(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0),
                AVG(response_time_ms),
                MIN(response_time_ms),
                MAX(response_time_ms),
                AVG(confidence),
                COALESCE(SUM(file_size_bytes), 0)
            FROM telemetry_events {where_clause}
            "#
        );

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let Some(row) = rows.next().await? else {
            return Ok(OverallStats::default());
        };

        Ok(OverallStats {
            total_requests: row.get::<i64>(0)?.max(0) as u64,
            successful_requests: row.get::<i64>(1)?.max(0) as u64,
            failed_requests: row.get::<i64>(2)?.max(0) as u64,
            success_rate: 0.0,
            avg_response_time_ms: row.get::<Option<f64>>(3)?.unwrap_or(0.0),
            min_response_time_ms: row.get::<Option<i64>>(4)?.unwrap_or(0).max(0) as u64,
            max_response_time_ms: row.get::<Option<i64>>(5)?.unwrap_or(0).max(0) as u64,
            avg_confidence: row.get::<Option<f64>>(6)?.unwrap_or(0.0),
            total_data_processed: row.get::<i64>(7)?.max(0) as u64,
        })
    }

    pub async fn by_endpoint(
        conn: &Connection,
        filter: &TelemetryFilter,
    ) -> Result<Vec<EndpointStats>> {
        let (where_clause, values) = Self::filter_clause(filter);
        let sql = format!(
            r#"
            SELECT
                endpoint,
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0),
                AVG(response_time_ms)
            FROM telemetry_events {where_clause}
            GROUP BY endpoint
            ORDER BY total DESC, endpoint ASC
            "#
        );

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut stats = Vec::new();
        while let Some(row) = rows.next().await? {
            stats.push(EndpointStats {
                endpoint: row.get(0)?,
                total_requests: row.get::<i64>(1)?.max(0) as u64,
                successful_requests: row.get::<i64>(2)?.max(0) as u64,
                failed_requests: row.get::<i64>(3)?.max(0) as u64,
                avg_response_time_ms: row.get::<Option<f64>>(4)?.unwrap_or(0.0),
            });
        }

        Ok(stats)
    }

    /// Buckets on the `YYYY-MM-DDTHH` prefix of the stored UTC timestamp.
    pub async fn hourly(
        conn: &Connection,
        filter: &TelemetryFilter,
        limit: usize,
    ) -> Result<Vec<HourlyBucket>> {
        let (where_clause, mut values) = Self::filter_clause(filter);
        let limit_idx = values.len() + 1;
        let sql = format!(
            r#"
            SELECT
                substr(created_at, 1, 13) AS hour_key,
                COUNT(*),
                COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END), 0)
            FROM telemetry_events {where_clause}
            GROUP BY hour_key
            ORDER BY hour_key DESC
            LIMIT ?{limit_idx}
            "#
        );
        values.push(Value::from(limit as i64));

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut buckets = Vec::new();
        while let Some(row) = rows.next().await? {
            let key: String = row.get(0)?;
            let Some((year, month, day, hour)) = parse_hour_key(&key) else {
                tracing::warn!(key = %key, "Skipping malformed hour bucket");
                continue;
            };
            buckets.push(HourlyBucket {
                year,
                month,
                day,
                hour,
                total_requests: row.get::<i64>(1)?.max(0) as u64,
                successful_requests: row.get::<i64>(2)?.max(0) as u64,
                failed_requests: row.get::<i64>(3)?.max(0) as u64,
            });
        }

        Ok(buckets)
    }

    pub async fn recent(
        conn: &Connection,
        filter: &TelemetryFilter,
        limit: usize,
    ) -> Result<Vec<StoredTelemetryEvent>> {
        let (where_clause, mut values) = Self::filter_clause(filter);
        let limit_idx = values.len() + 1;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM telemetry_events {where_clause} \
             ORDER BY created_at DESC, seq DESC LIMIT ?{limit_idx}"
        );
        values.push(Value::from(limit as i64));

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(Self::row_to_event(&row)?);
        }

        Ok(events)
    }

    pub async fn delete_before(conn: &Connection, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = conn
            .execute(
                "DELETE FROM telemetry_events WHERE created_at < ?1",
                params![format_timestamp(&cutoff)],
            )
            .await?;

        Ok(deleted)
    }

    /// WHERE clause and positional values for a filter, `?1`-based.
    fn filter_clause(filter: &TelemetryFilter) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(start) = filter.start_date {
            values.push(Value::from(format_timestamp(&start)));
            clauses.push(format!("created_at >= ?{}", values.len()));
        }
        if let Some(end) = filter.end_date {
            values.push(Value::from(format_timestamp(&end)));
            clauses.push(format!("created_at <= ?{}", values.len()));
        }
        if let Some(ref endpoint) = filter.endpoint {
            values.push(Value::from(endpoint.clone()));
            clauses.push(format!("endpoint = ?{}", values.len()));
        }
        if let Some(success) = filter.success {
            values.push(Value::from(success as i64));
            clauses.push(format!("success = ?{}", values.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        (where_clause, values)
    }

    fn row_to_event(row: &libsql::Row) -> Result<StoredTelemetryEvent> {
        Ok(StoredTelemetryEvent {
            id: row.get(0)?,
            event: TelemetryEvent {
                endpoint: row.get(1)?,
                method: row.get(2)?,
                status_code: row.get::<i64>(3)?.clamp(0, u16::MAX as i64) as u16,
                response_time_ms: row.get::<i64>(4)?.max(0) as u64,
                file_size_bytes: row.get(5)?,
                file_name: row.get(6)?,
                language: row.get(7)?,
                confidence: row.get(8)?,
                text_length: row.get(9)?,
                client_ip: row.get(10)?,
                user_agent: row.get(11)?,
                error_message: row.get(12)?,
                success: row.get::<i64>(13)? != 0,
            },
            created_at: DateTime::parse_from_rfc3339(&row.get::<String>(14)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

fn parse_hour_key(key: &str) -> Option<(i32, u32, u32, u32)> {
    // YYYY-MM-DDTHH
    if key.len() != 13 {
        return None;
    }
    Some((
        key.get(0..4)?.parse().ok()?,
        key.get(5..7)?.parse().ok()?,
        key.get(8..10)?.parse().ok()?,
        key.get(11..13)?.parse().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    async fn setup_test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let db = libsql::Builder::new_local(dir.path().join("telemetry.db"))
            .build()
            .await
            .unwrap();
        let conn = db.connect().unwrap();
        init_schema(&conn).await.unwrap();
        (dir, conn)
    }

    fn stored(
        id: &str,
        endpoint: &str,
        status: u16,
        created_at: DateTime<Utc>,
    ) -> StoredTelemetryEvent {
        let mut event = TelemetryEvent::completed(endpoint, "POST", status, 100);
        if status >= 400 {
            event = event.with_error("failed");
        }
        StoredTelemetryEvent {
            id: id.to_string(),
            event,
            created_at,
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let (_dir, conn) = setup_test_db().await;
        let mut event = stored("a", "/api/v1/ocr:process", 200, base());
        event.event = event
            .event
            .with_file(Some("scan.png".to_string()), 4096)
            .with_language("eng")
            .with_recognition(93.25, 17)
            .with_client(Some("10.0.0.1".to_string()), Some("curl/8".to_string()));

        TelemetryRepository::create(&conn, &event).await.unwrap();
        let events = TelemetryRepository::recent(&conn, &TelemetryFilter::new(), 10)
            .await
            .unwrap();

        assert_eq!(events, vec![event]);
    }

    #[tokio::test]
    async fn test_overall_empty_is_zero() {
        let (_dir, conn) = setup_test_db().await;
        let stats = TelemetryRepository::overall(&conn, &TelemetryFilter::new())
            .await
            .unwrap();
        assert_eq!(stats, OverallStats::default());
    }

    #[tokio::test]
    async fn test_overall_aggregates() {
        let (_dir, conn) = setup_test_db().await;

        let mut ok = stored("a", "/ocr", 200, base());
        ok.event.response_time_ms = 50;
        ok.event = ok.event.with_file(None, 1000).with_recognition(80.0, 3);
        let mut ok2 = stored("b", "/ocr", 200, base());
        ok2.event.response_time_ms = 150;
        ok2.event = ok2.event.with_file(None, 500);
        let mut failed = stored("c", "/health", 500, base());
        failed.event.response_time_ms = 10;

        for e in [&ok, &ok2, &failed] {
            TelemetryRepository::create(&conn, e).await.unwrap();
        }

        let stats = TelemetryRepository::overall(&conn, &TelemetryFilter::new())
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert_eq!(stats.min_response_time_ms, 10);
        assert_eq!(stats.max_response_time_ms, 150);
        assert_eq!(stats.avg_response_time_ms, 70.0);
        assert_eq!(stats.avg_confidence, 80.0);
        assert_eq!(stats.total_data_processed, 1500);
    }

    #[tokio::test]
    async fn test_filters_combine() {
        let (_dir, conn) = setup_test_db().await;
        for i in 0..6 {
            let endpoint = if i % 2 == 0 { "/ocr" } else { "/health" };
            let status = if i < 4 { 200 } else { 500 };
            let e = stored(&format!("e{i}"), endpoint, status, base() + Duration::hours(i));
            TelemetryRepository::create(&conn, &e).await.unwrap();
        }

        let filter = TelemetryFilter::new()
            .endpoint("/ocr")
            .success(true)
            .since(base() + Duration::hours(1))
            .until(base() + Duration::hours(4));
        let events = TelemetryRepository::recent(&conn, &filter, 100).await.unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2"]);

        let by_endpoint = TelemetryRepository::by_endpoint(&conn, &filter).await.unwrap();
        assert_eq!(by_endpoint.len(), 1);
        assert_eq!(by_endpoint[0].total_requests, 1);
    }

    #[tokio::test]
    async fn test_endpoint_stats_sorted_by_count() {
        let (_dir, conn) = setup_test_db().await;
        let mut n = 0;
        for (endpoint, count) in [("/health", 1), ("/ocr", 3), ("/stats", 2)] {
            for _ in 0..count {
                n += 1;
                let e = stored(&format!("e{n}"), endpoint, 200, base());
                TelemetryRepository::create(&conn, &e).await.unwrap();
            }
        }

        let stats = TelemetryRepository::by_endpoint(&conn, &TelemetryFilter::new())
            .await
            .unwrap();
        let order: Vec<(&str, u64)> = stats
            .iter()
            .map(|s| (s.endpoint.as_str(), s.total_requests))
            .collect();
        assert_eq!(order, vec![("/ocr", 3), ("/stats", 2), ("/health", 1)]);
    }

    #[tokio::test]
    async fn test_hourly_buckets() {
        let (_dir, conn) = setup_test_db().await;
        let t = base();
        for (i, at) in [t, t + Duration::minutes(59), t + Duration::hours(1)]
            .into_iter()
            .enumerate()
        {
            let e = stored(&format!("e{i}"), "/ocr", 200, at);
            TelemetryRepository::create(&conn, &e).await.unwrap();
        }

        let buckets = TelemetryRepository::hourly(&conn, &TelemetryFilter::new(), 24)
            .await
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!((buckets[0].day, buckets[0].hour), (1, 9));
        assert_eq!(buckets[0].total_requests, 1);
        assert_eq!((buckets[1].year, buckets[1].month, buckets[1].hour), (2024, 5, 8));
        assert_eq!(buckets[1].total_requests, 2);
    }

    #[tokio::test]
    async fn test_delete_before_cutoff() {
        let (_dir, conn) = setup_test_db().await;
        let t = base();
        TelemetryRepository::create(&conn, &stored("old", "/ocr", 200, t - Duration::days(10)))
            .await
            .unwrap();
        TelemetryRepository::create(&conn, &stored("new", "/ocr", 200, t))
            .await
            .unwrap();

        assert_eq!(TelemetryRepository::delete_before(&conn, t).await.unwrap(), 1);
        assert_eq!(TelemetryRepository::delete_before(&conn, t).await.unwrap(), 0);
    }

    #[test]
    fn test_parse_hour_key() {
        assert_eq!(parse_hour_key("2024-05-01T08"), Some((2024, 5, 1, 8)));
        assert_eq!(parse_hour_key("2024-05-01"), None);
        assert_eq!(parse_hour_key("yyyy-05-01T08"), None);
    }
}
