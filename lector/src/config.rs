use serde::Deserialize;
use std::env;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a comma-separated env var into trimmed, non-empty entries.
fn parse_env_list(var: &str, default: &[&str]) -> Vec<String> {
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => val
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg", "image/webp"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ocr: OcrConfig,
    pub upload: UploadConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret for the stats routes. `None` locks them.
    pub stats_token: Option<String>,
    /// Upper bound on graceful shutdown before the process exits anyway.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
    pub local_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    pub default_language: String,
    /// Directory holding `*.traineddata`. `None` lets Tesseract use its default.
    pub tessdata_path: Option<String>,
    pub timeout_secs: u64,
    pub handles_per_language: usize,
    pub preprocess: bool,
    pub max_image_dimension: u32,
    pub min_image_dimension: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub allowed_types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    pub queue_capacity: usize,
    pub retention_days: i64,
    /// Seconds between retention passes; 0 disables the background loop.
    pub retention_interval_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            default_language: "eng".to_string(),
            tessdata_path: None,
            timeout_secs: 60,
            handles_per_language: 1,
            preprocess: true,
            max_image_dimension: 4096,
            min_image_dimension: 10,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retention_days: 90,
            retention_interval_secs: 86400,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("LECTOR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_env_or("LECTOR_PORT", 3000),
                stats_token: env::var("STATS_TOKEN").ok().filter(|t| !t.is_empty()),
                shutdown_grace_secs: parse_env_or("SHUTDOWN_GRACE_SECS", 10),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:lector.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
                local_path: env::var("DATABASE_LOCAL_PATH").ok(),
            },
            ocr: OcrConfig {
                default_language: env::var("OCR_DEFAULT_LANGUAGE")
                    .unwrap_or_else(|_| "eng".to_string()),
                tessdata_path: env::var("OCR_TESSDATA_PATH").ok(),
                timeout_secs: parse_env_or("OCR_TIMEOUT", 60),
                handles_per_language: parse_env_or("OCR_HANDLES_PER_LANGUAGE", 1usize).max(1),
                preprocess: parse_env_or("OCR_PREPROCESS", true),
                max_image_dimension: parse_env_or("OCR_MAX_DIMENSION", 4096),
                min_image_dimension: parse_env_or("OCR_MIN_DIMENSION", 10),
            },
            upload: UploadConfig {
                max_file_size: parse_env_or("UPLOAD_MAX_FILE_SIZE", 10 * 1024 * 1024),
                allowed_types: parse_env_list("UPLOAD_ALLOWED_TYPES", DEFAULT_ALLOWED_TYPES),
            },
            telemetry: TelemetryConfig {
                queue_capacity: parse_env_or("TELEMETRY_QUEUE_CAPACITY", 1024usize).max(1),
                retention_days: parse_env_or("TELEMETRY_RETENTION_DAYS", 90),
                retention_interval_secs: parse_env_or("TELEMETRY_RETENTION_INTERVAL", 86400),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}

/// `LOG_FORMAT=json` selects JSON log lines. Read before [`Config::from_env`]
/// so configuration warnings reach the chosen subscriber.
pub fn json_logs_requested() -> bool {
    env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
