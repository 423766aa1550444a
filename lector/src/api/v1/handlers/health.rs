use std::time::Instant;

use axum::extract::State;
use serde::Serialize;

use crate::api::extractors::ClientInfo;
use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;
use crate::ocr::LanguageStatus;
use crate::telemetry::TelemetryEvent;

pub const HEALTH_ENDPOINT: &str = "/api/v1/health";

/// Health data returned inside the v1 envelope.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub database: DatabaseStatus,
    pub recognition: RecognitionStatus,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct DatabaseStatus {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionStatus {
    pub status: String,
    pub default_language: String,
    /// Languages initialized so far, with per-handle state.
    pub languages: Vec<LanguageStatus>,
}

/// `GET /api/v1/health`
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health status", body = HealthData),
    )
)]
pub async fn health_check(
    State(state): State<AppState>,
    client: ClientInfo,
) -> ApiResponse<HealthData> {
    let started = Instant::now();

    let db_status = match state.db.sync().await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Database sync failed during health check");
            "error"
        }
    };

    let recognition_status = if state.pool.is_closed() {
        "closed"
    } else {
        "ok"
    };

    let data = HealthData {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        database: DatabaseStatus {
            status: db_status.to_string(),
        },
        recognition: RecognitionStatus {
            status: recognition_status.to_string(),
            default_language: state.pool.default_language().to_string(),
            languages: state.pool.status(),
        },
    };

    state.recorder.record(
        TelemetryEvent::completed(
            HEALTH_ENDPOINT,
            "GET",
            200,
            started.elapsed().as_millis() as u64,
        )
        .with_client(client.ip, client.user_agent),
    );

    ApiResponse::success(data)
}
