//! # Stats Token Middleware
//!
//! Guards the `/stats` routes with a shared secret, read from the
//! `X-Stats-Token` header or the `token` query parameter. Errors use the v1
//! `ApiResponse` envelope.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::api::extractors::ClientInfo;
use crate::api::state::AppState;

use super::response::{ApiResponse, ErrorCode};

pub const STATS_TOKEN_HEADER: &str = "x-stats-token";

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn token_from_query(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(q)| q.token)
}

/// - No token configured on the server → 401; the routes stay locked.
/// - No token on the request → 401.
/// - Wrong token → 403.
pub async fn stats_token_middleware(
    State(state): State<AppState>,
    client: ClientInfo,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config.server.stats_token.as_deref() else {
        return ApiResponse::<()>::error(
            ErrorCode::Unauthorized,
            "Stats token not configured. Set STATS_TOKEN to enable access.",
        )
        .into_response();
    };

    let provided = request
        .headers()
        .get(STATS_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| token_from_query(request.uri()))
        .filter(|t| !t.is_empty());

    match provided {
        None => {
            tracing::warn!(ip = ?client.ip, user_agent = ?client.user_agent, "Stats access attempted without token");
            ApiResponse::<()>::error(ErrorCode::Unauthorized, "Stats token is required")
                .into_response()
        }
        Some(token) if token == expected => {
            tracing::debug!("Stats token verified successfully");
            next.run(request).await
        }
        Some(_) => {
            tracing::warn!(ip = ?client.ip, user_agent = ?client.user_agent, "Stats access attempted with invalid token");
            ApiResponse::<()>::error(ErrorCode::Forbidden, "Invalid stats token").into_response()
        }
    }
}
