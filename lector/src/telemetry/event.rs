use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];
pub const MAX_FILE_NAME_CHARS: usize = 1024;

/// One completed request, as handed to the recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_outcome"))]
pub struct TelemetryEvent {
    #[validate(length(min = 1, max = 512))]
    pub endpoint: String,

    #[validate(custom(function = "validate_method"))]
    pub method: String,

    #[validate(range(min = 100, max = 599))]
    pub status_code: u16,

    pub response_time_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1024))]
    pub file_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0, max = 100.0))]
    pub confidence: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub success: bool,
}

fn validate_method(method: &str) -> Result<(), ValidationError> {
    if ALLOWED_METHODS.contains(&method) {
        Ok(())
    } else {
        Err(ValidationError::new("method"))
    }
}

fn validate_outcome(event: &TelemetryEvent) -> Result<(), ValidationError> {
    if event.success && event.error_message.is_some() {
        return Err(ValidationError::new("error_message_on_success"));
    }
    Ok(())
}

impl TelemetryEvent {
    /// A finished request. `success` follows the status code (< 400).
    pub fn completed(
        endpoint: impl Into<String>,
        method: impl Into<String>,
        status_code: u16,
        response_time_ms: u64,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into().to_uppercase(),
            status_code,
            response_time_ms,
            file_size_bytes: None,
            file_name: None,
            language: None,
            confidence: None,
            text_length: None,
            client_ip: None,
            user_agent: None,
            error_message: None,
            success: status_code < 400,
        }
    }

    pub fn with_client(mut self, client_ip: Option<String>, user_agent: Option<String>) -> Self {
        self.client_ip = client_ip;
        self.user_agent = user_agent;
        self
    }

    /// Long file names are cut to `MAX_FILE_NAME_CHARS`.
    pub fn with_file(mut self, file_name: Option<String>, file_size_bytes: usize) -> Self {
        self.file_name = file_name.map(|name| match name.char_indices().nth(MAX_FILE_NAME_CHARS) {
            Some((end, _)) => name[..end].to_string(),
            None => name,
        });
        self.file_size_bytes = Some(file_size_bytes as i64);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_recognition(mut self, confidence: f64, text_length: usize) -> Self {
        self.confidence = Some(confidence);
        self.text_length = Some(text_length as i64);
        self
    }

    /// Marks the event failed.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoredTelemetryEvent {
    pub id: String,
    #[serde(flatten)]
    pub event: TelemetryEvent,
    pub created_at: DateTime<Utc>,
}
