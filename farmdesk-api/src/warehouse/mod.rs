//! SQL Warehouse Execution
//!
//! Every statement runs inside a scoped acquisition:
//! connect, open session, execute, fetch all rows, then release the
//! operation, the session and the connection in that order. Releases happen
//! on every exit path. A release failure is only surfaced when everything
//! before it succeeded; otherwise it is logged and the primary error wins.
//!
//! The driver traits are the seam between the handlers and the remote
//! engine. `databricks` holds the production driver.

pub mod databricks;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use farmdesk_core::{RawResult, Statement};
use secrecy::SecretString;
use thiserror::Error;

use crate::error::ApiResult;
use crate::telemetry::METRICS;
use crate::token::TokenSource;

pub use databricks::DatabricksDriver;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised by warehouse drivers.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Missing Databricks configuration: {0}")]
    MissingConfiguration(String),

    #[error("Failed to connect to warehouse: {0}")]
    Connect(String),

    #[error("Warehouse returned status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Statement {state}: {message}")]
    Statement { state: String, message: String },

    #[error("Warehouse request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected warehouse response: {0}")]
    Protocol(String),
}

// ============================================================================
// DRIVER SEAM
// ============================================================================

/// Validated coordinates for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub token: SecretString,
    pub host: String,
    pub http_path: String,
}

/// Entry point of a warehouse driver.
#[async_trait]
pub trait WarehouseDriver: Send + Sync {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn WarehouseConnection>, WarehouseError>;
}

#[async_trait]
pub trait WarehouseConnection: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn WarehouseSession>, WarehouseError>;
    async fn close(self: Box<Self>) -> Result<(), WarehouseError>;
}

#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Submit a statement asynchronously.
    async fn execute(
        &self,
        statement: &Statement,
    ) -> Result<Box<dyn WarehouseOperation>, WarehouseError>;
    async fn close(self: Box<Self>) -> Result<(), WarehouseError>;
}

#[async_trait]
pub trait WarehouseOperation: Send + Sync {
    /// Wait for completion and collect every row.
    async fn fetch_all(&mut self) -> Result<RawResult, WarehouseError>;
    async fn close(self: Box<Self>) -> Result<(), WarehouseError>;
}

// ============================================================================
// SCOPED EXECUTION
// ============================================================================

/// Possibly incomplete connection coordinates.
#[derive(Debug, Clone, Default)]
pub struct WarehouseTarget {
    pub token: Option<SecretString>,
    pub host: Option<String>,
    pub http_path: Option<String>,
}

impl WarehouseTarget {
    /// Reject incomplete coordinates before anything is opened.
    pub fn validate(self) -> Result<ConnectionParams, WarehouseError> {
        let missing = missing_names(&[
            ("token", self.token.is_none()),
            ("host", self.host.is_none()),
            ("path", self.http_path.is_none()),
        ]);

        match (self.token, self.host, self.http_path) {
            (Some(token), Some(host), Some(http_path)) => Ok(ConnectionParams {
                token,
                host,
                http_path,
            }),
            _ => Err(WarehouseError::MissingConfiguration(missing)),
        }
    }
}

fn missing_names(checks: &[(&str, bool)]) -> String {
    checks
        .iter()
        .filter(|(_, absent)| *absent)
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join("/")
}

/// Run one statement with deterministic release of every resource.
pub async fn execute_statement(
    driver: &dyn WarehouseDriver,
    target: WarehouseTarget,
    statement: &Statement,
) -> Result<RawResult, WarehouseError> {
    let params = target.validate()?;
    let connection = driver.connect(&params).await?;
    let outcome = run_in_session(connection.as_ref(), statement).await;
    let released = connection.close().await;
    settle(outcome, released, "connection")
}

async fn run_in_session(
    connection: &dyn WarehouseConnection,
    statement: &Statement,
) -> Result<RawResult, WarehouseError> {
    let session = connection.open_session().await?;
    let outcome = run_operation(session.as_ref(), statement).await;
    let released = session.close().await;
    settle(outcome, released, "session")
}

async fn run_operation(
    session: &dyn WarehouseSession,
    statement: &Statement,
) -> Result<RawResult, WarehouseError> {
    let mut operation = session.execute(statement).await?;
    let outcome = operation.fetch_all().await;
    let released = operation.close().await;
    settle(outcome, released, "operation")
}

fn settle(
    outcome: Result<RawResult, WarehouseError>,
    released: Result<(), WarehouseError>,
    resource: &'static str,
) -> Result<RawResult, WarehouseError> {
    match (outcome, released) {
        (Ok(raw), Ok(())) => Ok(raw),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            tracing::warn!(resource, error = %release_err, "Failed to release warehouse resource");
            Err(err)
        }
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Token source, driver and coordinates bundled for the handlers.
#[derive(Clone)]
pub struct WarehouseClient {
    tokens: Arc<dyn TokenSource>,
    driver: Arc<dyn WarehouseDriver>,
    host: Option<String>,
    http_path: Option<String>,
}

impl WarehouseClient {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        driver: Arc<dyn WarehouseDriver>,
        host: Option<String>,
        http_path: Option<String>,
    ) -> Self {
        Self {
            tokens,
            driver,
            host,
            http_path,
        }
    }

    /// Execute one statement and return the driver's raw result.
    ///
    /// Host and path are checked before a token is requested.
    pub async fn run(&self, statement: &Statement) -> ApiResult<RawResult> {
        if self.host.is_none() || self.http_path.is_none() {
            let missing = missing_names(&[
                ("host", self.host.is_none()),
                ("path", self.http_path.is_none()),
            ]);
            return Err(WarehouseError::MissingConfiguration(missing).into());
        }

        let token = self.tokens.bearer_token().await?;
        let target = WarehouseTarget {
            token: Some(token),
            host: self.host.clone(),
            http_path: self.http_path.clone(),
        };

        let kind = statement_kind(statement);
        tracing::debug!(kind, params = statement.params().len(), sql = %statement.sql(), "Executing warehouse statement");

        let start = Instant::now();
        let result = execute_statement(self.driver.as_ref(), target, statement).await;
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_statement(kind, result.is_ok(), start.elapsed().as_secs_f64());
        }

        match &result {
            Ok(raw) => tracing::debug!(kind, rows = raw.row_count(), "Warehouse statement finished"),
            Err(e) => tracing::error!(kind, error = %e, "Warehouse statement failed"),
        }
        Ok(result?)
    }
}

/// Leading SQL keyword, used as a metrics label.
fn statement_kind(statement: &Statement) -> &'static str {
    let keyword = statement
        .sql()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    match keyword.as_str() {
        "SELECT" => "select",
        "INSERT" => "insert",
        "UPDATE" => "update",
        "DELETE" => "delete",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmdesk_core::{delete_farm, connectivity_check, TableName};

    #[test]
    fn test_target_reports_every_missing_value() {
        let err = WarehouseTarget {
            token: None,
            host: Some("adb.example.net".to_string()),
            http_path: None,
        }
        .validate()
        .err();
        assert!(matches!(
            err,
            Some(WarehouseError::MissingConfiguration(ref missing)) if missing == "token/path"
        ));
    }

    #[test]
    fn test_complete_target_validates() {
        let params = WarehouseTarget {
            token: Some(SecretString::new("t".into())),
            host: Some("adb.example.net".to_string()),
            http_path: Some("/sql/1.0/warehouses/abc".to_string()),
        }
        .validate();
        assert!(params.is_ok());
    }

    #[test]
    fn test_settle_prefers_primary_error() {
        let outcome = settle(
            Err(WarehouseError::Protocol("primary".to_string())),
            Err(WarehouseError::Connect("release".to_string())),
            "session",
        );
        assert!(matches!(outcome, Err(WarehouseError::Protocol(_))));

        let outcome = settle(
            Ok(RawResult::Records(vec![])),
            Err(WarehouseError::Connect("release".to_string())),
            "session",
        );
        assert!(matches!(outcome, Err(WarehouseError::Connect(_))));
    }

    #[test]
    fn test_statement_kind() -> Result<(), farmdesk_core::CoreError> {
        let table = TableName::parse("farms")?;
        assert_eq!(statement_kind(&connectivity_check()), "select");
        assert_eq!(statement_kind(&delete_farm(&table, 1)), "delete");
        Ok(())
    }
}
