use std::time::Instant;

use axum::extract::{Multipart, State};

use crate::api::extractors::ClientInfo;
use crate::api::state::AppState;
use crate::api::v1::dto::{OcrResponse, UploadMetadata};
use crate::api::v1::response::{ApiResponse, ErrorCode};
use crate::error::{LectorError, Result};
use crate::ocr::{normalize_language, preprocess_image};
use crate::telemetry::TelemetryEvent;

pub const OCR_ENDPOINT: &str = "/api/v1/ocr:process";

/// What we learned about the upload before anything failed.
#[derive(Debug, Default)]
struct UploadTrace {
    file_name: Option<String>,
    file_size: Option<usize>,
    language: Option<String>,
}

struct Upload {
    bytes: Vec<u8>,
    file_name: Option<String>,
    mime_type: String,
    language: Option<String>,
}

/// `POST /api/v1/ocr:process`
///
/// Multipart upload: `image` (file, required) and `language` (optional,
/// Tesseract code such as `eng` or `deu+eng`).
#[utoipa::path(
    post,
    path = "/api/v1/ocr:process",
    tag = "ocr",
    operation_id = "ocr.process",
    request_body(
        content_type = "multipart/form-data",
        content = String,
        description = "Fields: `image` (file, required), `language` (text, optional)"
    ),
    responses(
        (status = 200, description = "Text extracted", body = OcrResponse),
        (status = 400, description = "Missing, oversized, unsupported or undecodable image"),
        (status = 500, description = "Engine failure or timeout"),
        (status = 503, description = "Service shutting down"),
    )
)]
pub async fn process_image(
    State(state): State<AppState>,
    client: ClientInfo,
    multipart: Multipart,
) -> ApiResponse<OcrResponse> {
    let started = Instant::now();
    let mut trace = UploadTrace::default();

    let outcome = recognize_upload(&state, multipart, &mut trace).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(response) => {
            let event = TelemetryEvent::completed(OCR_ENDPOINT, "POST", 200, elapsed_ms)
                .with_client(client.ip, client.user_agent)
                .with_file(
                    response.metadata.original_file_name.clone(),
                    response.metadata.file_size,
                )
                .with_language(response.language.clone())
                .with_recognition(response.confidence, response.text.chars().count());
            state.recorder.record(event);
            ApiResponse::success(response)
        }
        Err(err) => {
            let status = ErrorCode::from(&err).status().as_u16();
            tracing::warn!(status, error = %err, "OCR request failed");

            let mut event = TelemetryEvent::completed(OCR_ENDPOINT, "POST", status, elapsed_ms)
                .with_client(client.ip, client.user_agent)
                .with_error(err.to_string());
            if let Some(size) = trace.file_size {
                event = event.with_file(trace.file_name.take(), size);
            }
            if let Some(language) = trace.language.take() {
                event = event.with_language(language);
            }
            state.recorder.record(event);

            ApiResponse::from(err)
        }
    }
}

async fn recognize_upload(
    state: &AppState,
    multipart: Multipart,
    trace: &mut UploadTrace,
) -> Result<OcrResponse> {
    let upload = read_upload(multipart, state.config.upload.max_file_size, trace).await?;

    if !state
        .config
        .upload
        .allowed_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&upload.mime_type))
    {
        return Err(LectorError::InvalidArgument(format!(
            "Invalid file type. Allowed types: {}",
            state.config.upload.allowed_types.join(", ")
        )));
    }

    let language = normalize_language(upload.language.as_deref(), state.pool.default_language());
    trace.language = Some(language.clone());

    tracing::info!(
        file_name = ?upload.file_name,
        file_size = upload.bytes.len(),
        mime_type = %upload.mime_type,
        language = %language,
        "Processing OCR request"
    );

    let metadata = UploadMetadata {
        original_file_name: upload.file_name,
        file_size: upload.bytes.len(),
        mime_type: upload.mime_type,
    };

    let image = if state.config.ocr.preprocess {
        let config = state.config.ocr.clone();
        let bytes = upload.bytes;
        tokio::task::spawn_blocking(move || preprocess_image(&bytes, &config))
            .await
            .map_err(|e| LectorError::Internal(format!("preprocessing task failed: {e}")))??
    } else {
        upload.bytes
    };

    let handle = state.pool.acquire(Some(&language)).await?;
    let recognition = state
        .pool
        .recognize(&handle, &image, Some(&language))
        .await?;

    Ok(OcrResponse::new(recognition, metadata))
}

async fn read_upload(
    mut multipart: Multipart,
    max_file_size: usize,
    trace: &mut UploadTrace,
) -> Result<Upload> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut language: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(LectorError::InvalidArgument(format!(
                    "Malformed multipart body: {e}"
                )))
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                file_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                trace.file_name = file_name.clone();

                let data = field.bytes().await.map_err(|e| {
                    LectorError::InvalidArgument(format!("Failed to read image: {e}"))
                })?;
                trace.file_size = Some(data.len());

                if data.len() > max_file_size {
                    return Err(LectorError::InvalidArgument(format!(
                        "File too large: {} bytes (max {} bytes)",
                        data.len(),
                        max_file_size
                    )));
                }
                bytes = Some(data.to_vec());
            }
            "language" => {
                let text = field.text().await.map_err(|e| {
                    LectorError::InvalidArgument(format!("Invalid language field: {e}"))
                })?;
                language = Some(text).filter(|l| !l.trim().is_empty());
            }
            _ => {}
        }
    }

    let Some(bytes) = bytes.filter(|b| !b.is_empty()) else {
        return Err(LectorError::InvalidArgument(
            "No image file provided".to_string(),
        ));
    };

    let mime_type = detect_mime(&bytes, content_type.as_deref());

    Ok(Upload {
        bytes,
        file_name,
        mime_type,
        language,
    })
}

/// Declared content type, or sniffed from magic bytes when the client sent
/// none or a generic one.
fn detect_mime(bytes: &[u8], declared: Option<&str>) -> String {
    match declared.map(|ct| ct.trim().to_ascii_lowercase()) {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct,
        _ => infer::get(bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}
