//! Hierarchical file store access.
//!
//! `FileStore` is the seam the upload handler writes through. The production
//! implementation is `DataLakeClient`, which speaks the ADLS Gen2 DFS REST
//! API directly.

pub mod connection_string;
pub mod datalake;

use async_trait::async_trait;
use thiserror::Error;

pub use connection_string::ConnectionString;
pub use datalake::DataLakeClient;

/// Errors raised by file store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),

    #[error("{operation} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to sign storage request: {0}")]
    Signing(String),
}

/// Minimal file-system operations needed to land one file.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Whether the file-system container exists.
    async fn file_system_exists(&self, file_system: &str) -> Result<bool, StorageError>;

    /// Create (or truncate) an empty file.
    async fn create_file(&self, file_system: &str, path: &str) -> Result<(), StorageError>;

    /// Stage `data` at byte offset `position`.
    async fn append(
        &self,
        file_system: &str,
        path: &str,
        position: u64,
        data: Vec<u8>,
    ) -> Result<(), StorageError>;

    /// Commit everything staged up to `position`.
    async fn flush(&self, file_system: &str, path: &str, position: u64) -> Result<(), StorageError>;
}
