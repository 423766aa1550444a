//! Image text recognition.
//!
//! Engines are loaded lazily per language and kept in a [`RecognitionPool`].
//! Each loaded language owns a small set of [`EngineHandle`]s; a handle runs
//! one recognition at a time on the blocking thread pool.
//!
//! ```rust,ignore
//! let pool = RecognitionPool::new(Arc::new(TesseractFactory::new(None)), &config.ocr);
//! let handle = pool.acquire(Some("deu")).await?;
//! let result = pool.recognize(&handle, &png_bytes, Some("deu")).await?;
//! ```

mod engine;
mod handle;
mod pool;
mod preprocessing;

pub use engine::{EngineFactory, RawRecognition, RecognitionEngine, TesseractFactory};
pub use handle::{EngineHandle, HandleState};
pub use pool::{normalize_language, LanguageStatus, Recognition, RecognitionPool};
pub use preprocessing::preprocess_image;
