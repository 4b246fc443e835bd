//! Error Types for the Farmdesk API
//!
//! This module defines error handling for the HTTP layer:
//! - `ErrorCode` categorizes failures and maps them to HTTP status codes
//! - `ErrorBody` selects the JSON envelope an endpoint promises its clients
//! - `ApiError` implements `IntoResponse` and logs at the handler boundary
//!
//! Configuration and input-validation failures are client errors (400);
//! token exchange, warehouse and storage failures are server errors (500).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use farmdesk_core::CoreError;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::storage::StorageError;
use crate::token::TokenError;
use crate::warehouse::WarehouseError;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Client Errors (400)
    // ========================================================================
    /// A required configuration value is absent
    ConfigurationMissing,

    /// Request contains invalid input data
    InvalidInput,

    /// Path identifier is not an integer
    InvalidId,

    /// Required field is missing from request
    MissingField,

    /// Target file-system container does not exist
    FileSystemNotFound,

    /// Request body exceeds the configured limit (413)
    PayloadTooLarge,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// OAuth token exchange failed
    AuthenticationFailed,

    /// Warehouse statement failed
    WarehouseError,

    /// Data lake operation failed
    StorageError,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ConfigurationMissing
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidId
            | ErrorCode::MissingField
            | ErrorCode::FileSystemNotFound => StatusCode::BAD_REQUEST,

            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ErrorCode::AuthenticationFailed
            | ErrorCode::WarehouseError
            | ErrorCode::StorageError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// RESPONSE ENVELOPES
// ============================================================================

/// JSON envelope used when rendering an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorBody {
    /// `{"error": ...}`
    #[default]
    Error,
    /// `{"success": false, "error": ...}`
    SuccessFlag,
    /// `{"message": ...}`
    Message,
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by every handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Upstream payload, when the failing service returned one
    pub details: Option<Value>,

    /// Envelope the message is rendered in
    pub body: ErrorBody,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            body: ErrorBody::default(),
        }
    }

    /// Add an upstream payload to the error.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Render the error inside a different envelope.
    pub fn with_body(mut self, body: ErrorBody) -> Self {
        self.body = body;
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn configuration_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationMissing, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// The fixed error for non-integer path identifiers.
    pub fn invalid_id() -> Self {
        Self::new(ErrorCode::InvalidId, "Invalid id")
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn file_system_not_found() -> Self {
        Self::new(ErrorCode::FileSystemNotFound, "File system does not exist.")
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PayloadTooLarge, message)
    }

    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, message)
    }

    pub fn warehouse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::WarehouseError, message)
    }

    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageError, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// JSON body for this error in its envelope.
    pub fn to_json(&self) -> Value {
        let mut body = match self.body {
            ErrorBody::Error => json!({ "error": self.message }),
            ErrorBody::SuccessFlag => json!({ "success": false, "error": self.message }),
            ErrorBody::Message => json!({ "message": self.message }),
        };
        if let (Some(details), Some(map)) = (&self.details, body.as_object_mut()) {
            map.insert("details".to_string(), details.clone());
        }
        body
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Every failure passes through here, so this is where it gets logged.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, details = ?self.details, "{}", self.message);
        } else {
            tracing::warn!(code = %self.code, "{}", self.message);
        }
        (status, Json(self.to_json())).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM COMPONENT ERRORS
// ============================================================================

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTableName { .. } => ApiError::configuration_missing(err.to_string()),
            CoreError::InvalidBody { .. } => ApiError::invalid_input(err.to_string()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingCredentials(_) => ApiError::configuration_missing(err.to_string()),
            TokenError::Rejected { ref payload, .. } => {
                let details = payload.clone();
                ApiError::authentication_failed(err.to_string()).with_details(details)
            }
            _ => ApiError::authentication_failed(err.to_string()),
        }
    }
}

impl From<WarehouseError> for ApiError {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::MissingConfiguration(_) => {
                ApiError::configuration_missing(err.to_string())
            }
            _ => ApiError::warehouse_error(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidConnectionString(_) => {
                ApiError::configuration_missing(err.to_string())
            }
            _ => ApiError::storage_error(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::internal_error(format!("Outbound request failed: {}", err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::internal_error(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
