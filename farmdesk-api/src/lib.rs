//! Farmdesk API - HTTP layer
//!
//! Axum service exposing farm CRUD over a Databricks SQL warehouse, a
//! warehouse connectivity_check, a dashboard embed, and an Excel upload that lands files
//! in Azure Data Lake Storage Gen2.
//!
//! Statements are built by `farmdesk-core`; this crate owns configuration,
//! credentials, the warehouse and storage clients, and the routes.

pub mod config;
pub mod error;
pub mod extractors;
pub mod macros;
pub mod routes;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod token;
pub mod warehouse;

// Re-export commonly used types
pub use config::{
    AppConfig, OAuthConfig, StorageConfig, UploadConfig, UploadNaming, WarehouseConfig,
};
pub use error::{ApiError, ApiResult, ErrorBody, ErrorCode};
pub use routes::create_app_router;
pub use state::AppState;
pub use storage::{DataLakeClient, FileStore, StorageError};
pub use token::{OAuthTokenProvider, TokenError, TokenSource};
pub use warehouse::{
    execute_statement, ConnectionParams, DatabricksDriver, WarehouseClient, WarehouseConnection,
    WarehouseDriver, WarehouseError, WarehouseOperation, WarehouseSession, WarehouseTarget,
};
