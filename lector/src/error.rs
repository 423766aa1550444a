use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Transport-agnostic classification of a failure.
///
/// Handlers map this onto an HTTP status; library code only decides which
/// side of the boundary is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The caller sent something we cannot process (corrupt image, bad argument).
    ClientFault,
    /// Something broke on our side.
    ServerFault,
    /// The service is shutting down or a dependency is gone.
    Unavailable,
}

impl Fault {
    pub fn status(self) -> StatusCode {
        match self {
            Fault::ClientFault => StatusCode::BAD_REQUEST,
            Fault::ServerFault => StatusCode::INTERNAL_SERVER_ERROR,
            Fault::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Error, Debug)]
pub enum LectorError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Recognition pool is closed")]
    PoolClosed,

    #[error("Failed to initialize recognition engine for '{language}': {message}")]
    EngineInit { language: String, message: String },

    #[error("OCR processing failed: {message}")]
    Recognition { fault: Fault, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Telemetry write failed: {0}")]
    TelemetryWrite(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl LectorError {
    /// Engine rejected the input (corrupt or unsupported image).
    pub fn bad_input(message: impl Into<String>) -> Self {
        LectorError::Recognition {
            fault: Fault::ClientFault,
            message: message.into(),
        }
    }

    /// Engine failed for reasons the caller cannot fix.
    pub fn engine_fault(message: impl Into<String>) -> Self {
        LectorError::Recognition {
            fault: Fault::ServerFault,
            message: message.into(),
        }
    }

    pub fn fault(&self) -> Fault {
        match self {
            LectorError::NotFound(_)
            | LectorError::Validation(_)
            | LectorError::Unauthorized(_)
            | LectorError::Forbidden(_)
            | LectorError::InvalidArgument(_)
            | LectorError::Json(_) => Fault::ClientFault,
            LectorError::PoolClosed => Fault::Unavailable,
            LectorError::Recognition { fault, .. } => *fault,
            LectorError::Database(_)
            | LectorError::EngineInit { .. }
            | LectorError::TelemetryWrite(_)
            | LectorError::Io(_)
            | LectorError::Internal(_) => Fault::ServerFault,
        }
    }
}

impl IntoResponse for LectorError {
    fn into_response(self) -> Response {
        let status = match &self {
            LectorError::NotFound(_) => StatusCode::NOT_FOUND,
            LectorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LectorError::Forbidden(_) => StatusCode::FORBIDDEN,
            other => other.fault().status(),
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, LectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_closed_is_unavailable() {
        assert_eq!(LectorError::PoolClosed.fault(), Fault::Unavailable);
        assert_eq!(
            LectorError::PoolClosed.fault().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn recognition_fault_follows_cause() {
        assert_eq!(
            LectorError::bad_input("corrupt image").fault(),
            Fault::ClientFault
        );
        assert_eq!(
            LectorError::engine_fault("timed out").fault(),
            Fault::ServerFault
        );
    }

    #[test]
    fn engine_init_is_server_fault() {
        let err = LectorError::EngineInit {
            language: "deu".to_string(),
            message: "missing traineddata".to_string(),
        };
        assert_eq!(err.fault(), Fault::ServerFault);
        assert!(err.to_string().contains("deu"));
    }

    #[test]
    fn invalid_argument_is_client_fault() {
        let err = LectorError::InvalidArgument("daysToKeep must be at least 1".to_string());
        assert_eq!(err.fault().status(), StatusCode::BAD_REQUEST);
    }
}
