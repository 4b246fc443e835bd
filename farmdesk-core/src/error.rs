//! Error types for Farmdesk core operations

use thiserror::Error;

/// Errors raised while shaping farm data or statements.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid table name '{name}': expected [catalog.][schema.]table")]
    InvalidTableName { name: String },

    #[error("Invalid farm body: {reason}")]
    InvalidBody { reason: String },
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
