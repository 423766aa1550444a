use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

/// Shared libsql handle. Cheap to clone; each caller opens its own connection.
#[derive(Clone)]
pub struct Database {
    db: Arc<libsql::Database>,
    remote: bool,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let remote = config.url.starts_with("libsql://") || config.url.starts_with("https://");

        let db = if remote {
            let token = config.auth_token.clone().unwrap_or_default();
            match config.local_path {
                Some(ref local_path) => {
                    Builder::new_remote_replica(local_path, config.url.clone(), token)
                        .build()
                        .await?
                }
                None => Builder::new_remote(config.url.clone(), token).build().await?,
            }
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let database = Self {
            db: Arc::new(db),
            remote,
        };
        if !remote {
            database.configure_local().await;
        }
        database.init_schema().await?;

        tracing::debug!(url = %config.url, remote, "Database ready");
        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    /// Concurrent readers alongside the single telemetry writer.
    async fn configure_local(&self) {
        let busy_timeout_ms: u64 = std::env::var("DATABASE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        let conn = match self.connect() {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Could not open connection for pragmas");
                return;
            }
        };

        for pragma in [
            format!("PRAGMA busy_timeout = {busy_timeout_ms}"),
            "PRAGMA journal_mode = WAL".to_string(),
            "PRAGMA synchronous = NORMAL".to_string(),
        ] {
            if let Err(error) = conn.execute_batch(&pragma).await {
                tracing::warn!(pragma = %pragma, error = %error, "Failed to apply SQLite pragma");
            }
        }
    }

    async fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        schema::init_schema(&conn).await
    }

    /// Pull from the primary when running as an embedded replica.
    pub async fn sync(&self) -> Result<()> {
        if !self.remote {
            return Ok(());
        }
        match self.db.sync().await {
            Ok(sync) => tracing::info!("Database synced: {:?}", sync),
            Err(e) => tracing::debug!(error = %e, "Database sync skipped"),
        }
        Ok(())
    }
}
