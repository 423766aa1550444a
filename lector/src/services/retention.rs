use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;
use crate::telemetry::TelemetryAggregator;

/// Periodically prunes telemetry older than the retention window.
#[derive(Clone)]
pub struct RetentionManager {
    aggregator: TelemetryAggregator,
    days_to_keep: i64,
    interval_secs: u64,
}

impl RetentionManager {
    pub fn new(aggregator: TelemetryAggregator, days_to_keep: i64, interval_secs: u64) -> Self {
        Self {
            aggregator,
            days_to_keep,
            interval_secs,
        }
    }

    /// One pruning pass. Returns the number of events deleted.
    pub async fn run_once(&self) -> Result<u64> {
        info!(days_to_keep = self.days_to_keep, "Starting telemetry retention pass");
        let deleted = self.aggregator.prune_older_than(self.days_to_keep).await?;
        info!(deleted, "Telemetry retention pass complete");
        Ok(deleted)
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Run until `token` is cancelled. An interval of 0 returns immediately.
    pub async fn run(self, token: CancellationToken) {
        if self.interval_secs == 0 {
            info!("Telemetry retention disabled");
            return;
        }

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Retention manager shutting down...");
                    break;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.interval_secs)) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "Retention manager error");
                    }
                }
            }
        }
    }
}
