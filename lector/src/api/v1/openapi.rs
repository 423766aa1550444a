use axum::Json;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::dto;
use super::handlers;
use super::middleware::STATS_TOKEN_HEADER;
use super::response;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lector API",
        version = "1.0.0",
        description = "Self-hostable image-to-text recognition with request telemetry.",
    ),
    paths(
        handlers::health::health_check,
        handlers::ocr::process_image,
        handlers::stats::get_stats,
        handlers::stats::get_recent_requests,
        handlers::stats::cleanup_stats,
    ),
    components(schemas(
        // Response envelope
        response::ErrorCode,
        response::ApiError,
        response::ResponseMeta,
        // OCR
        dto::ocr::OcrResponse,
        dto::ocr::UploadMetadata,
        crate::ocr::LanguageStatus,
        crate::ocr::HandleState,
        // Stats
        dto::stats::StatsResponse,
        dto::stats::RecentEventsResponse,
        dto::stats::CleanupResponse,
        crate::telemetry::OverallStats,
        crate::telemetry::EndpointStats,
        crate::telemetry::HourlyBucket,
        crate::telemetry::TelemetryEvent,
        crate::telemetry::StoredTelemetryEvent,
        // Health (handler-local types)
        handlers::health::HealthData,
        handlers::health::DatabaseStatus,
        handlers::health::RecognitionStatus,
    )),
    tags(
        (name = "health", description = "Health check"),
        (name = "ocr", description = "Text recognition from uploaded images"),
        (name = "stats", description = "Request telemetry (stats token required)"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "stats_token",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new(STATS_TOKEN_HEADER),
                ),
            ),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/docs", ApiDoc::openapi()).into()
}
