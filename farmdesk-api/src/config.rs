//! Application Configuration Module
//!
//! One `AppConfig` is built at startup from environment variables (a `.env`
//! file is honored) and shared read-only by every component. Values that
//! the service can start without, such as warehouse or storage coordinates,
//! stay optional; their absence is reported as a configuration error when a
//! request needs them.

use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use farmdesk_core::TableName;
use secrecy::SecretString;

use crate::error::{ApiError, ApiResult};

/// Default OAuth token endpoint for the warehouse's account console.
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://accounts.azuredatabricks.net/oauth2/token";

// ============================================================================
// SECTIONS
// ============================================================================

/// OAuth client-credentials settings for the warehouse.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Pre-issued token; when set no exchange happens.
    pub static_token: Option<SecretString>,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub token_endpoint: String,
}

/// SQL warehouse coordinates.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub host: Option<String>,
    pub http_path: Option<String>,
    pub farms_table: TableName,
}

/// Data lake destination.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub connection_string: Option<SecretString>,
    pub container: Option<String>,
}

/// How uploaded files are named in the data lake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadNaming {
    /// `{timestamp}.xls`
    Timestamp,
    /// `{timestamp}_{sanitized original name}{ext}`
    Original,
}

/// Upload handling settings.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory multipart files are staged in before forwarding.
    pub dir: PathBuf,
    pub naming: UploadNaming,
    /// Local time offset used for timestamped names.
    pub utc_offset: FixedOffset,
    pub max_bytes: usize,
}

// ============================================================================
// APP CONFIGURATION
// ============================================================================

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub port: u16,

    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    pub oauth: OAuthConfig,
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,

    /// URL embedded by the `/dashboard` page.
    pub dashboard_url: Option<String>,

    /// Timeout for outbound HTTP calls.
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Create AppConfig from process environment variables.
    ///
    /// Environment variables:
    /// - `FARMDESK_BIND` / `PORT`: listen address (default 0.0.0.0:3000)
    /// - `CORS_ORIGINS`: comma-separated allowed origins (empty or `*` = allow
    ///   all, without credentials for `*`)
    /// - `CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: true)
    /// - `DATABRICKS_SERVER_HOST`, `DATABRICKS_HTTP_PATH`: warehouse coordinates
    /// - `DATABRICKS_TOKEN`: static token, or `DATABRICKS_CLIENT_ID` +
    ///   `DATABRICKS_CLIENT_SECRET` (+ `DATABRICKS_TOKEN_ENDPOINT`)
    /// - `DATABRICKS_DASHBOARD_URL`: URL for the dashboard page
    /// - `FARMS_TABLE`: warehouse table (default: farms)
    /// - `AZURE_STORAGE_CONNECTION_STRING`, `AZURE_STORAGE_CONTAINER`
    /// - `UPLOAD_DIR` (uploads), `UPLOAD_NAMING` (timestamp|original),
    ///   `UPLOAD_UTC_OFFSET_MINUTES` (540), `UPLOAD_MAX_BYTES` (50 MiB)
    /// - `HTTP_TIMEOUT_SECS`: outbound timeout (default: 60)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> ApiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secret = |key: &str| var(key).map(|v| SecretString::new(v.into()));

        let port = match var("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", raw)))?,
            None => 3000,
        };

        let mut cors_origins: Vec<String> = var("CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let mut cors_allow_credentials = var("CORS_ALLOW_CREDENTIALS")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        // A wildcard entry means allow all; browsers reject `*` with credentials.
        if cors_origins.iter().any(|o| o == "*") {
            if cors_origins.len() > 1 {
                tracing::warn!(
                    origins = ?cors_origins,
                    "CORS_ORIGINS contains '*'; ignoring the other entries"
                );
            }
            cors_origins.clear();
            cors_allow_credentials = false;
        }

        let farms_table = TableName::parse(&var("FARMS_TABLE").unwrap_or_else(|| "farms".into()))?;

        let naming = match var("UPLOAD_NAMING").as_deref() {
            None | Some("timestamp") => UploadNaming::Timestamp,
            Some("original") => UploadNaming::Original,
            Some(other) => {
                return Err(ApiError::invalid_input(format!(
                    "Invalid UPLOAD_NAMING '{}': expected 'timestamp' or 'original'",
                    other
                )))
            }
        };

        let offset_minutes = parse_or(&var, "UPLOAD_UTC_OFFSET_MINUTES", 540i32)?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ApiError::invalid_input(format!(
                "UPLOAD_UTC_OFFSET_MINUTES out of range: {}",
                offset_minutes
            ))
        })?;

        Ok(Self {
            bind_host: var("FARMDESK_BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: parse_or(&var, "CORS_MAX_AGE_SECS", 86400u64)?,
            oauth: OAuthConfig {
                static_token: secret("DATABRICKS_TOKEN"),
                client_id: var("DATABRICKS_CLIENT_ID"),
                client_secret: secret("DATABRICKS_CLIENT_SECRET"),
                token_endpoint: var("DATABRICKS_TOKEN_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string()),
            },
            warehouse: WarehouseConfig {
                host: var("DATABRICKS_SERVER_HOST"),
                http_path: var("DATABRICKS_HTTP_PATH"),
                farms_table,
            },
            storage: StorageConfig {
                connection_string: secret("AZURE_STORAGE_CONNECTION_STRING"),
                container: var("AZURE_STORAGE_CONTAINER"),
            },
            upload: UploadConfig {
                dir: PathBuf::from(var("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string())),
                naming,
                utc_offset,
                max_bytes: parse_or(&var, "UPLOAD_MAX_BYTES", 50 * 1024 * 1024usize)?,
            },
            dashboard_url: var("DATABRICKS_DASHBOARD_URL"),
            http_timeout: Duration::from_secs(parse_or(&var, "HTTP_TIMEOUT_SECS", 60u64)?),
        })
    }

    /// True when only the listed CORS origins are allowed.
    pub fn has_origin_allowlist(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> ApiResult<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ApiError::invalid_input(format!("Invalid {} value: {}", key, raw))),
        None => Ok(default),
    }
}
