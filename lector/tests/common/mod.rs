// Shared helpers for integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use tempfile::TempDir;

use lector::config::DatabaseConfig;
use lector::db::{Database, LibSqlBackend, TelemetryStore};
use lector::error::Result;
use lector::ocr::{EngineFactory, RawRecognition, RecognitionEngine};

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A libsql-backed telemetry store in a fresh temp directory.
pub async fn temp_store() -> (Arc<dyn TelemetryStore>, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let config = DatabaseConfig {
        url: format!("file:{}", dir.path().join("telemetry.db").display()),
        auth_token: None,
        local_path: None,
    };
    let db = Database::new(&config)
        .await
        .expect("failed to open database");
    (Arc::new(LibSqlBackend::new(db)), dir)
}

/// Engine factory that counts creations and can be told to load slowly.
#[derive(Default)]
pub struct CountingFactory {
    pub created: AtomicUsize,
    /// Languages that take `init_delay` to load.
    pub slow_languages: Vec<String>,
    pub init_delay: Duration,
    /// Time each recognition call spends "working".
    pub work_delay: Duration,
    /// Recognitions currently inside an engine, across all engines.
    pub in_flight: Arc<AtomicUsize>,
    /// Highest `in_flight` observed.
    pub peak_in_flight: Arc<AtomicUsize>,
}

impl CountingFactory {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl EngineFactory for CountingFactory {
    fn create(&self, language: &str) -> Result<Box<dyn RecognitionEngine>> {
        if self.slow_languages.iter().any(|l| l == language) {
            std::thread::sleep(self.init_delay);
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingEngine {
            language: language.to_string(),
            work_delay: self.work_delay,
            in_flight: Arc::clone(&self.in_flight),
            peak_in_flight: Arc::clone(&self.peak_in_flight),
        }))
    }
}

struct CountingEngine {
    language: String,
    work_delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl RecognitionEngine for CountingEngine {
    fn recognize(&mut self, image: &[u8]) -> Result<RawRecognition> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.work_delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(RawRecognition {
            text: format!("{} ({} bytes)", self.language, image.len()),
            confidence: 87.5,
        })
    }
}
