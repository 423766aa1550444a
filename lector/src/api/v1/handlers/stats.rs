use axum::extract::State;
use axum_extra::extract::Query;

use crate::api::state::AppState;
use crate::api::v1::dto::{
    CleanupQuery, CleanupResponse, RecentEventsResponse, RecentQuery, StatsQuery, StatsResponse,
};
use crate::api::v1::response::{ApiError, ApiResponse, ResponseMeta};

/// `GET /api/v1/stats`
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    tag = "stats",
    operation_id = "stats.get",
    params(StatsQuery),
    security(("stats_token" = [])),
    responses(
        (status = 200, description = "Aggregated request statistics", body = StatsResponse),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 401, description = "Missing stats token", body = ApiError),
        (status = 403, description = "Invalid stats token", body = ApiError),
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResponse<StatsResponse> {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(e) => return e.into(),
    };

    let aggregator = &state.aggregator;
    let result = tokio::try_join!(
        aggregator.overall_stats(&filter),
        aggregator.endpoint_stats(&filter),
        aggregator.hourly_stats(&filter),
    );

    match result {
        Ok((overall, by_endpoint, hourly)) => ApiResponse::success(StatsResponse {
            overall,
            by_endpoint,
            hourly,
        }),
        Err(e) => e.into(),
    }
}

/// `GET /api/v1/stats/recent`
#[utoipa::path(
    get,
    path = "/api/v1/stats/recent",
    tag = "stats",
    operation_id = "stats.recent",
    params(RecentQuery, StatsQuery),
    security(("stats_token" = [])),
    responses(
        (status = 200, description = "Most recent requests, newest first", body = RecentEventsResponse),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 401, description = "Missing stats token", body = ApiError),
        (status = 403, description = "Invalid stats token", body = ApiError),
    )
)]
pub async fn get_recent_requests(
    State(state): State<AppState>,
    Query(recent): Query<RecentQuery>,
    Query(query): Query<StatsQuery>,
) -> ApiResponse<RecentEventsResponse> {
    let filter = match query.to_filter() {
        Ok(f) => f,
        Err(e) => return e.into(),
    };

    match state
        .aggregator
        .recent_events(recent.limit(), &filter)
        .await
    {
        Ok(requests) => {
            let count = requests.len();
            ApiResponse::success_with_meta(
                RecentEventsResponse { count, requests },
                ResponseMeta {
                    total: Some(count as u64),
                },
            )
        }
        Err(e) => e.into(),
    }
}

/// `POST /api/v1/stats:cleanup`
#[utoipa::path(
    post,
    path = "/api/v1/stats:cleanup",
    tag = "stats",
    operation_id = "stats.cleanup",
    params(CleanupQuery),
    security(("stats_token" = [])),
    responses(
        (status = 200, description = "Old telemetry deleted", body = CleanupResponse),
        (status = 400, description = "Invalid daysToKeep", body = ApiError),
        (status = 401, description = "Missing stats token", body = ApiError),
        (status = 403, description = "Invalid stats token", body = ApiError),
    )
)]
pub async fn cleanup_stats(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> ApiResponse<CleanupResponse> {
    let days_to_keep = match query.days_to_keep(state.config.telemetry.retention_days) {
        Ok(days) => days,
        Err(e) => return e.into(),
    };

    match state.aggregator.prune_older_than(days_to_keep).await {
        Ok(deleted_count) => {
            tracing::info!(deleted_count, days_to_keep, "Telemetry cleanup requested");
            ApiResponse::success(CleanupResponse {
                deleted_count,
                days_kept: days_to_keep,
            })
        }
        Err(e) => e.into(),
    }
}
