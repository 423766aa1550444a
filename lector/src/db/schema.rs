use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per completed request. `seq` breaks created_at ties.
        CREATE TABLE IF NOT EXISTS telemetry_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            status_code INTEGER NOT NULL,
            response_time_ms INTEGER NOT NULL,
            file_size_bytes INTEGER,
            file_name TEXT,
            language TEXT,
            confidence REAL,
            text_length INTEGER,
            client_ip TEXT,
            user_agent TEXT,
            error_message TEXT,
            success INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_telemetry_created_at ON telemetry_events(created_at);
        CREATE INDEX IF NOT EXISTS idx_telemetry_status_code ON telemetry_events(status_code);
        CREATE INDEX IF NOT EXISTS idx_telemetry_endpoint_created
            ON telemetry_events(endpoint, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_telemetry_success_created
            ON telemetry_events(success, created_at DESC);
        "#,
    )
    .await?;

    Ok(())
}
