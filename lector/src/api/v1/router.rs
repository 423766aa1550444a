use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::state::AppState;

use super::handlers;
use super::middleware::stats_token_middleware;

/// Room for multipart boundaries and the `language` field on top of the image.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn v1_router(state: AppState) -> Router<AppState> {
    let upload_limit = state.config.upload.max_file_size + MULTIPART_OVERHEAD;

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(super::openapi::openapi_json))
        .merge(super::openapi::redoc_router());

    let ocr_routes = Router::new()
        .route("/ocr:process", post(handlers::ocr::process_image))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit));

    let stats_routes = Router::new()
        .route("/stats", get(handlers::stats::get_stats))
        .route("/stats/recent", get(handlers::stats::get_recent_requests))
        .route("/stats:cleanup", post(handlers::stats::cleanup_stats))
        .route_layer(middleware::from_fn_with_state(state, stats_token_middleware));

    Router::new()
        .merge(public_routes)
        .merge(ocr_routes)
        .merge(stats_routes)
}
