use leptess::LepTess;

use crate::error::{LectorError, Result};

/// Unnormalised output of a single engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecognition {
    pub text: String,
    pub confidence: f32,
}

/// One loaded, language-bound recognition engine.
///
/// Implementations are blocking and not safe for concurrent use; the pool
/// guarantees at most one call in flight per instance.
pub trait RecognitionEngine: Send {
    fn recognize(&mut self, image: &[u8]) -> Result<RawRecognition>;
}

/// Creates engines for a language code. Creation is expensive and blocking.
pub trait EngineFactory: Send + Sync {
    fn create(&self, language: &str) -> Result<Box<dyn RecognitionEngine>>;
}

pub struct TesseractEngine {
    inner: LepTess,
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(&mut self, image: &[u8]) -> Result<RawRecognition> {
        self.inner
            .set_image_from_mem(image)
            .map_err(|e| LectorError::bad_input(format!("Failed to set image: {e}")))?;

        let text = self
            .inner
            .get_utf8_text()
            .map_err(|e| LectorError::engine_fault(format!("Failed to extract text: {e}")))?;

        Ok(RawRecognition {
            text,
            confidence: self.inner.mean_text_conf() as f32,
        })
    }
}

/// Loads Tesseract models through leptess.
#[derive(Debug, Clone, Default)]
pub struct TesseractFactory {
    tessdata_path: Option<String>,
}

impl TesseractFactory {
    pub fn new(tessdata_path: Option<String>) -> Self {
        Self { tessdata_path }
    }
}

impl EngineFactory for TesseractFactory {
    fn create(&self, language: &str) -> Result<Box<dyn RecognitionEngine>> {
        let inner = LepTess::new(self.tessdata_path.as_deref(), language).map_err(|e| {
            LectorError::EngineInit {
                language: language.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Box::new(TesseractEngine { inner }))
    }
}
