use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::config::OcrConfig;
use crate::error::{LectorError, Result};

use super::engine::EngineFactory;
use super::handle::{EngineHandle, HandleState};

const MAX_LANGUAGE_LEN: usize = 64;

fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z]{3}(_[a-z]+)*(\+[a-z]{3}(_[a-z]+)*)*$").expect("static regex")
    })
}

/// Resolve a caller-supplied language hint to a Tesseract language code.
///
/// Empty or malformed hints fall back to `default`.
pub fn normalize_language(raw: Option<&str>, default: &str) -> String {
    let candidate = raw.map(|s| s.trim().to_lowercase()).unwrap_or_default();

    if candidate.is_empty() {
        return default.to_string();
    }

    if candidate.len() > MAX_LANGUAGE_LEN || !language_pattern().is_match(&candidate) {
        debug!(requested = %candidate, fallback = %default, "Unrecognized language code");
        return default.to_string();
    }

    candidate
}

/// Result of one recognition call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recognition {
    pub text: String,
    /// Mean word confidence in `[0, 100]`, two decimals.
    pub confidence: f64,
    pub processing_time_ms: u64,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LanguageStatus {
    pub language: String,
    pub handles: Vec<HandleState>,
}

/// The handles loaded for one language.
struct LanguageSet {
    handles: Vec<Arc<EngineHandle>>,
    next: AtomicUsize,
}

impl LanguageSet {
    fn new(handles: Vec<Arc<EngineHandle>>) -> Self {
        Self {
            handles,
            next: AtomicUsize::new(0),
        }
    }

    /// Prefer an idle handle, otherwise queue round-robin.
    fn pick(&self) -> Arc<EngineHandle> {
        if let Some(idle) = self
            .handles
            .iter()
            .find(|h| h.state() == HandleState::Ready)
        {
            return Arc::clone(idle);
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        Arc::clone(&self.handles[i])
    }

    async fn terminate(&self) -> usize {
        let results = futures::future::join_all(self.handles.iter().map(|h| h.terminate())).await;
        results.into_iter().filter(|live| *live).count()
    }
}

type Slot = Arc<OnceCell<LanguageSet>>;

/// Keyed pool of recognition engines, one handle set per language.
///
/// Engines are created lazily on first use. The map lock is held only to
/// look up or insert a slot; initialization runs under the slot's own
/// `OnceCell`, so a slow load for one language never blocks another.
pub struct RecognitionPool {
    factory: Arc<dyn EngineFactory>,
    default_language: String,
    handles_per_language: usize,
    timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
    closed: AtomicBool,
    initializations: AtomicU64,
}

impl RecognitionPool {
    pub fn new(factory: Arc<dyn EngineFactory>, config: &OcrConfig) -> Self {
        Self {
            factory,
            default_language: config.default_language.clone(),
            handles_per_language: config.handles_per_language.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            initializations: AtomicU64::new(0),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of completed language initializations since startup.
    pub fn initializations(&self) -> u64 {
        self.initializations.load(Ordering::Relaxed)
    }

    fn slot(&self, language: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(language.to_string()).or_default())
    }

    /// Drop an empty slot after a failed load so unknown languages don't
    /// accumulate. Kept while another caller still holds it.
    fn forget_failed(&self, language: &str, slot: &Slot) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let unused = slots.get(language).is_some_and(|stored| {
            Arc::ptr_eq(stored, slot) && !stored.initialized() && Arc::strong_count(stored) == 2
        });
        if unused {
            slots.remove(language);
        }
    }

    /// Get a handle for `language_code`, loading the engine on first use.
    ///
    /// Concurrent first callers for the same language share a single
    /// initialization. A failed initialization leaves the language
    /// uninitialized so a later call can retry.
    pub async fn acquire(&self, language_code: Option<&str>) -> Result<Arc<EngineHandle>> {
        if self.is_closed() {
            return Err(LectorError::PoolClosed);
        }

        let language = normalize_language(language_code, &self.default_language);
        let slot = self.slot(&language);
        let set = match slot
            .get_or_try_init(|| self.initialize(language.clone()))
            .await
        {
            Ok(set) => set,
            Err(e) => {
                self.forget_failed(&language, &slot);
                return Err(e);
            }
        };

        if self.is_closed() {
            // Shutdown drained the map while we were loading; nobody else
            // will release these engines.
            set.terminate().await;
            return Err(LectorError::PoolClosed);
        }

        Ok(set.pick())
    }

    async fn initialize(&self, language: String) -> Result<LanguageSet> {
        debug!(language = %language, handles = self.handles_per_language, "Creating recognition engines");
        let started = Instant::now();

        let mut handles = Vec::with_capacity(self.handles_per_language);
        for index in 0..self.handles_per_language {
            let factory = Arc::clone(&self.factory);
            let lang = language.clone();
            let engine = tokio::task::spawn_blocking(move || factory.create(&lang))
                .await
                .map_err(|e| LectorError::EngineInit {
                    language: language.clone(),
                    message: format!("initialization task panicked: {e}"),
                })
                .and_then(|created| created)
                .map_err(|e| {
                    warn!(language = %language, error = %e, "Recognition engine failed to load");
                    e
                })?;
            handles.push(Arc::new(EngineHandle::new(language.clone(), index, engine)));
        }

        self.initializations.fetch_add(1, Ordering::Relaxed);
        info!(
            language = %language,
            handles = handles.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Recognition engine ready"
        );

        Ok(LanguageSet::new(handles))
    }

    /// Run recognition on a handle obtained from [`RecognitionPool::acquire`].
    ///
    /// Calls on the same handle are serialized; the wait for the handle counts
    /// toward the configured timeout.
    pub async fn recognize(
        &self,
        handle: &Arc<EngineHandle>,
        image: &[u8],
        language_hint: Option<&str>,
    ) -> Result<Recognition> {
        let started = Instant::now();
        let language = handle.language().to_string();

        if let Some(hint) = language_hint {
            let requested = normalize_language(Some(hint), &self.default_language);
            if requested != language {
                warn!(requested = %requested, handle = %language, "Language hint does not match handle");
            }
        }

        info!(language = %language, buffer_size = image.len(), "Starting OCR processing");

        let outcome = tokio::time::timeout(self.timeout, self.run_engine(handle, image)).await;
        let raw = match outcome {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                error!(language = %language, error = %e, "OCR processing failed");
                return Err(e);
            }
            Err(_) => {
                let e = LectorError::engine_fault(format!(
                    "OCR operation timed out after {} seconds",
                    self.timeout.as_secs()
                ));
                error!(language = %language, error = %e, "OCR processing failed");
                return Err(e);
            }
        };

        let recognition = Recognition {
            text: raw.text.trim().to_string(),
            confidence: normalize_confidence(raw.confidence),
            processing_time_ms: started.elapsed().as_millis() as u64,
            language,
        };

        info!(
            confidence = recognition.confidence,
            processing_time_ms = recognition.processing_time_ms,
            text_length = recognition.text.chars().count(),
            "OCR processing completed"
        );

        Ok(recognition)
    }

    async fn run_engine(
        &self,
        handle: &Arc<EngineHandle>,
        image: &[u8],
    ) -> Result<super::engine::RawRecognition> {
        let mut checkout = handle.checkout().await?;
        let bytes = image.to_vec();

        tokio::task::spawn_blocking(move || checkout.engine()?.recognize(&bytes))
            .await
            .map_err(|e| LectorError::engine_fault(format!("OCR task panicked: {e}")))?
    }

    /// Terminate every engine and close the pool.
    ///
    /// In-flight recognitions finish before their handle is released. Safe to
    /// call more than once; later calls return 0.
    pub async fn shutdown_all(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Recognition pool already shut down");
            return 0;
        }

        info!("Terminating all OCR workers");
        let slots: Vec<(String, Slot)> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.drain().collect()
        };

        let mut terminated = 0;
        for (language, slot) in slots {
            if let Some(set) = slot.get() {
                let count = set.terminate().await;
                debug!(language = %language, handles = count, "Worker terminated for language");
                terminated += count;
            }
        }

        info!(terminated, "OCR workers terminated");
        terminated
    }

    /// Snapshot of loaded languages, sorted by code.
    pub fn status(&self) -> Vec<LanguageStatus> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let mut status: Vec<LanguageStatus> = slots
            .iter()
            .map(|(language, slot)| LanguageStatus {
                language: language.clone(),
                handles: match slot.get() {
                    Some(set) => set.handles.iter().map(|h| h.state()).collect(),
                    None => vec![HandleState::Uninitialized],
                },
            })
            .collect();
        status.sort_by(|a, b| a.language.cmp(&b.language));
        status
    }
}

fn normalize_confidence(raw: f32) -> f64 {
    let clamped = if raw.is_finite() {
        (raw as f64).clamp(0.0, 100.0)
    } else {
        0.0
    };
    (clamped * 100.0).round() / 100.0
}
