use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::db::{DatabaseBackend, TelemetryStore};
use crate::ocr::RecognitionPool;
use crate::telemetry::{TelemetryAggregator, TelemetryRecorder};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseBackend>,
    pub pool: Arc<RecognitionPool>,
    pub recorder: Arc<TelemetryRecorder>,
    pub aggregator: TelemetryAggregator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        store: Arc<dyn TelemetryStore>,
        pool: Arc<RecognitionPool>,
        recorder: Arc<TelemetryRecorder>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            pool,
            recorder,
            aggregator: TelemetryAggregator::new(store),
            started_at: Instant::now(),
        }
    }
}
