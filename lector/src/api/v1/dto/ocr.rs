use serde::Serialize;

use crate::ocr::Recognition;

/// Response body for `POST /api/v1/ocr:process`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OcrResponse {
    /// Extracted text, trimmed.
    pub text: String,
    /// Mean confidence in `[0, 100]`.
    pub confidence: f64,
    /// Language the engine actually used.
    pub language: String,
    pub processing_time_ms: u64,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file_name: Option<String>,
    pub file_size: usize,
    pub mime_type: String,
}

impl OcrResponse {
    pub fn new(recognition: Recognition, metadata: UploadMetadata) -> Self {
        Self {
            text: recognition.text,
            confidence: recognition.confidence,
            language: recognition.language,
            processing_time_ms: recognition.processing_time_ms,
            metadata,
        }
    }
}
