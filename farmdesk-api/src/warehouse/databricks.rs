//! Databricks SQL Statement Execution driver.
//!
//! The REST API has no connection or session objects; a connection is an
//! authenticated HTTP client bound to one warehouse, a session is a handle on
//! it, and an operation is one submitted statement.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use farmdesk_core::{RawResult, Statement};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    ConnectionParams, WarehouseConnection, WarehouseDriver, WarehouseError, WarehouseOperation,
    WarehouseSession,
};

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";

/// Server-side wait before the submit call returns a pending statement.
const SUBMIT_WAIT: &str = "30s";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    parameters: Vec<ParameterBody<'a>>,
    disposition: &'static str,
    format: &'static str,
    wait_timeout: &'static str,
    on_wait_timeout: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(rename = "type")]
    type_name: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct StatementResponse {
    statement_id: Option<String>,
    status: Option<StatementStatus>,
    manifest: Option<Manifest>,
    result: Option<ResultChunk>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: String,
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    message: Option<String>,
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    schema: Option<Schema>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

#[derive(Debug, Deserialize)]
struct ColumnInfo {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResultChunk {
    data_array: Option<Vec<Vec<Value>>>,
    next_chunk_internal_link: Option<String>,
}

fn is_terminal(state: &str) -> bool {
    matches!(state, "SUCCEEDED" | "FAILED" | "CANCELED" | "CLOSED")
}

// ============================================================================
// DRIVER
// ============================================================================

/// Production driver over `reqwest`.
#[derive(Debug, Clone)]
pub struct DatabricksDriver {
    timeout: Duration,
}

impl DatabricksDriver {
    /// `timeout` bounds each HTTP call and the total wait for a statement.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl WarehouseDriver for DatabricksDriver {
    async fn connect(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        let warehouse_id = warehouse_id(&params.http_path).ok_or_else(|| {
            WarehouseError::Connect(format!(
                "HTTP path '{}' does not name a warehouse",
                params.http_path
            ))
        })?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", params.token.expose_secret()))
            .map_err(|_| WarehouseError::Connect("token is not a valid header value".to_string()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()?;

        tracing::debug!(host = %params.host, warehouse_id, "Warehouse connection opened");
        Ok(Box::new(DatabricksConnection {
            inner: Arc::new(Endpoint {
                http,
                base_url: base_url(&params.host),
                warehouse_id: warehouse_id.to_string(),
                max_wait: self.timeout,
            }),
        }))
    }
}

/// Shared by a connection and everything opened from it.
#[derive(Debug)]
struct Endpoint {
    http: reqwest::Client,
    base_url: String,
    warehouse_id: String,
    max_wait: Duration,
}

impl Endpoint {
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<StatementResponse, WarehouseError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json::<StatementResponse>().await?)
    }

    async fn fetch_chunk(&self, link: &str) -> Result<ResultChunk, WarehouseError> {
        let url = format!("{}{}", self.base_url, link);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response.json::<ResultChunk>().await?)
    }
}

struct DatabricksConnection {
    inner: Arc<Endpoint>,
}

#[async_trait]
impl WarehouseConnection for DatabricksConnection {
    async fn open_session(&self) -> Result<Box<dyn WarehouseSession>, WarehouseError> {
        Ok(Box::new(DatabricksSession {
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        Ok(())
    }
}

struct DatabricksSession {
    inner: Arc<Endpoint>,
}

#[async_trait]
impl WarehouseSession for DatabricksSession {
    async fn execute(
        &self,
        statement: &Statement,
    ) -> Result<Box<dyn WarehouseOperation>, WarehouseError> {
        let body = statement_request(&self.inner.warehouse_id, statement);
        let url = format!("{}{}", self.inner.base_url, STATEMENTS_PATH);
        let response = self.inner.send(self.inner.http.post(url).json(&body)).await?;

        let statement_id = response
            .statement_id
            .clone()
            .ok_or_else(|| WarehouseError::Protocol("response carries no statement_id".to_string()))?;
        tracing::debug!(statement_id = %statement_id, "Statement submitted");

        Ok(Box::new(DatabricksOperation {
            inner: Arc::clone(&self.inner),
            statement_id,
            latest: response,
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        Ok(())
    }
}

struct DatabricksOperation {
    inner: Arc<Endpoint>,
    statement_id: String,
    latest: StatementResponse,
}

impl DatabricksOperation {
    fn state(&self) -> &str {
        self.latest
            .status
            .as_ref()
            .map(|s| s.state.as_str())
            .unwrap_or("PENDING")
    }

    fn statement_url(&self) -> String {
        format!(
            "{}{}/{}",
            self.inner.base_url, STATEMENTS_PATH, self.statement_id
        )
    }
}

#[async_trait]
impl WarehouseOperation for DatabricksOperation {
    async fn fetch_all(&mut self) -> Result<RawResult, WarehouseError> {
        let deadline = Instant::now() + self.inner.max_wait;
        while !is_terminal(self.state()) {
            if Instant::now() >= deadline {
                return Err(WarehouseError::Protocol(format!(
                    "statement {} still {} after {:?}",
                    self.statement_id,
                    self.state(),
                    self.inner.max_wait
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
            let request = self.inner.http.get(self.statement_url());
            self.latest = self.inner.send(request).await?;
        }

        if self.state() != "SUCCEEDED" {
            return Err(statement_failure(&self.latest));
        }

        let mut rows = Vec::new();
        let mut next = collect_chunk(&mut rows, self.latest.result.take());
        while let Some(link) = next {
            let chunk = self.inner.fetch_chunk(&link).await?;
            next = collect_chunk(&mut rows, Some(chunk));
        }

        Ok(into_raw_result(column_names(&self.latest), rows))
    }

    async fn close(self: Box<Self>) -> Result<(), WarehouseError> {
        if is_terminal(self.state()) {
            return Ok(());
        }
        tracing::debug!(statement_id = %self.statement_id, "Cancelling unfinished statement");
        let url = format!("{}/cancel", self.statement_url());
        let response = self.inner.http.post(url).send().await?;
        if !response.status().is_success() {
            return Err(WarehouseError::Rejected {
                status: response.status().as_u16(),
                message: "cancel rejected".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Warehouse id: the last segment of `/sql/1.0/warehouses/{id}`.
fn warehouse_id(http_path: &str) -> Option<&str> {
    http_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
}

/// `https://{host}` unless the host already carries a scheme.
fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

fn statement_request<'a>(warehouse_id: &'a str, statement: &'a Statement) -> StatementRequest<'a> {
    StatementRequest {
        warehouse_id,
        statement: statement.sql(),
        parameters: statement
            .params()
            .iter()
            .map(|p| ParameterBody {
                name: p.name,
                value: p.value.to_wire(),
                type_name: p.value.type_name(),
            })
            .collect(),
        disposition: "INLINE",
        format: "JSON_ARRAY",
        wait_timeout: SUBMIT_WAIT,
        on_wait_timeout: "CONTINUE",
    }
}

/// Append a chunk's rows and return the link to the next chunk.
fn collect_chunk(rows: &mut Vec<Value>, chunk: Option<ResultChunk>) -> Option<String> {
    let chunk = chunk?;
    rows.extend(chunk.data_array.unwrap_or_default().into_iter().map(Value::Array));
    chunk.next_chunk_internal_link
}

fn column_names(response: &StatementResponse) -> Vec<String> {
    response
        .manifest
        .as_ref()
        .and_then(|m| m.schema.as_ref())
        .map(|s| s.columns.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

fn into_raw_result(columns: Vec<String>, rows: Vec<Value>) -> RawResult {
    if columns.is_empty() {
        RawResult::Tuples(
            rows.into_iter()
                .filter_map(|row| match row {
                    Value::Array(values) => Some(values),
                    _ => None,
                })
                .collect(),
        )
    } else {
        RawResult::Table { columns, rows }
    }
}

fn statement_failure(response: &StatementResponse) -> WarehouseError {
    let (state, error) = match &response.status {
        Some(status) => (status.state.clone(), status.error.as_ref()),
        None => ("UNKNOWN".to_string(), None),
    };
    let message = match error {
        Some(ServiceError {
            message: Some(message),
            error_code: Some(code),
        }) => format!("{}: {}", code, message),
        Some(ServiceError {
            message: Some(message),
            ..
        }) => message.clone(),
        _ => "no error message returned".to_string(),
    };
    WarehouseError::Statement { state, message }
}

/// Prefer the `message` field of an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(500).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmdesk_core::{connectivity_check, insert_farm, FarmInput, TableName};
    use mockito::{Matcher, Server};
    use secrecy::SecretString;
    use serde_json::json;

    #[test]
    fn test_warehouse_id_is_last_path_segment() {
        assert_eq!(warehouse_id("/sql/1.0/warehouses/abc123"), Some("abc123"));
        assert_eq!(warehouse_id("/sql/1.0/warehouses/abc123/"), Some("abc123"));
        assert_eq!(warehouse_id(""), None);
        assert_eq!(warehouse_id("/"), None);
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("adb-1.azuredatabricks.net"), "https://adb-1.azuredatabricks.net");
        assert_eq!(base_url("https://adb-1.azuredatabricks.net/"), "https://adb-1.azuredatabricks.net");
        assert_eq!(base_url("http://127.0.0.1:8080"), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_request_body_binds_parameters() -> Result<(), Box<dyn std::error::Error>> {
        let table = TableName::parse("farms")?;
        let input = FarmInput {
            name: Some("O'Hara".to_string()),
            owner_id: Some(5),
            ..Default::default()
        };
        let statement = insert_farm(&table, &input);
        let body = serde_json::to_value(statement_request("wh-1", &statement))?;

        assert_eq!(body["warehouse_id"], json!("wh-1"));
        assert_eq!(body["disposition"], json!("INLINE"));
        assert_eq!(body["format"], json!("JSON_ARRAY"));
        assert_eq!(body["on_wait_timeout"], json!("CONTINUE"));

        let params = body["parameters"].as_array().ok_or("parameters missing")?;
        assert_eq!(params.len(), 11);
        assert_eq!(params[0], json!({"name": "name", "value": "O'Hara", "type": "STRING"}));
        assert_eq!(params[3], json!({"name": "owner_id", "value": "5", "type": "BIGINT"}));
        // NULL parameters carry no value
        assert_eq!(params[1], json!({"name": "region", "type": "STRING"}));
        Ok(())
    }

    #[test]
    fn test_response_with_manifest_becomes_table() -> Result<(), serde_json::Error> {
        let mut response: StatementResponse = serde_json::from_value(json!({
            "statement_id": "01ef",
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [{"name": "농장ID"}, {"name": "농장명"}]}},
            "result": {"data_array": [["1", "Farm A"]], "next_chunk_internal_link": "/api/2.0/sql/statements/01ef/result/chunks/1"}
        }))?;

        let mut rows = Vec::new();
        let next = collect_chunk(&mut rows, response.result.take());
        assert_eq!(next.as_deref(), Some("/api/2.0/sql/statements/01ef/result/chunks/1"));

        let raw = into_raw_result(column_names(&response), rows);
        assert_eq!(
            raw,
            RawResult::Table {
                columns: vec!["농장ID".to_string(), "농장명".to_string()],
                rows: vec![json!(["1", "Farm A"])],
            }
        );
        Ok(())
    }

    #[test]
    fn test_response_without_manifest_becomes_tuples() {
        let raw = into_raw_result(Vec::new(), vec![json!([1])]);
        assert_eq!(raw, RawResult::Tuples(vec![vec![json!(1)]]));
    }

    #[test]
    fn test_failed_statement_carries_message() -> Result<(), serde_json::Error> {
        let response: StatementResponse = serde_json::from_value(json!({
            "statement_id": "01ef",
            "status": {
                "state": "FAILED",
                "error": {"error_code": "BAD_REQUEST", "message": "Table or view not found: farms"}
            }
        }))?;
        match statement_failure(&response) {
            WarehouseError::Statement { state, message } => {
                assert_eq!(state, "FAILED");
                assert_eq!(message, "BAD_REQUEST: Table or view not found: farms");
            }
            other => panic!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(error_message(r#"{"error_code":"X","message":"bad token"}"#), "bad token");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    // ------------------------------------------------------------------------
    // Against a mock Statement Execution API
    // ------------------------------------------------------------------------

    const WAREHOUSE_PATH: &str = "/sql/1.0/warehouses/wh-1";

    async fn operation(
        server: &Server,
        max_wait: Duration,
    ) -> Result<Box<dyn WarehouseOperation>, WarehouseError> {
        let params = ConnectionParams {
            token: SecretString::new("dapi-test".into()),
            host: server.url(),
            http_path: WAREHOUSE_PATH.to_string(),
        };
        let connection = DatabricksDriver::new(max_wait).connect(&params).await?;
        let session = connection.open_session().await?;
        session.execute(&connectivity_check()).await
    }

    async fn submit_mock(server: &mut Server, response: Value) -> mockito::Mock {
        server
            .mock("POST", STATEMENTS_PATH)
            .match_header("authorization", "Bearer dapi-test")
            .match_body(Matcher::PartialJson(json!({
                "warehouse_id": "wh-1",
                "statement": "SELECT 1",
                "disposition": "INLINE"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response.to_string())
            .expect(1)
            .create_async()
            .await
    }

    async fn get_mock(server: &mut Server, path: &str, response: Value, hits: usize) -> mockito::Mock {
        server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response.to_string())
            .expect(hits)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_pending_statement_is_polled_until_it_succeeds() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let submit = submit_mock(
            &mut server,
            json!({"statement_id": "st-1", "status": {"state": "PENDING"}}),
        )
        .await;
        let poll = get_mock(
            &mut server,
            "/api/2.0/sql/statements/st-1",
            json!({
                "statement_id": "st-1",
                "status": {"state": "SUCCEEDED"},
                "manifest": {"schema": {"columns": [{"name": "1"}]}},
                "result": {"data_array": [["1"]]}
            }),
            1,
        )
        .await;

        let mut op = operation(&server, Duration::from_secs(10)).await?;
        let raw = op.fetch_all().await?;
        op.close().await?;

        assert_eq!(
            raw,
            RawResult::Table {
                columns: vec!["1".to_string()],
                rows: vec![json!(["1"])],
            }
        );
        submit.assert_async().await;
        poll.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_statement_still_running_at_deadline_is_an_error() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let _submit = submit_mock(
            &mut server,
            json!({"statement_id": "st-slow", "status": {"state": "PENDING"}}),
        )
        .await;
        let poll = get_mock(
            &mut server,
            "/api/2.0/sql/statements/st-slow",
            json!({"statement_id": "st-slow", "status": {"state": "RUNNING"}}),
            1,
        )
        .await;

        let mut op = operation(&server, Duration::from_millis(200)).await?;
        match op.fetch_all().await {
            Err(WarehouseError::Protocol(message)) => {
                assert!(message.contains("st-slow"), "{message}");
                assert!(message.contains("RUNNING"), "{message}");
            }
            other => panic!("expected deadline error, got {other:?}"),
        }
        poll.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_result_chunks_are_followed_to_the_end() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let chunk_path = |n: u32| format!("/api/2.0/sql/statements/st-2/result/chunks/{n}");
        let _submit = submit_mock(
            &mut server,
            json!({
                "statement_id": "st-2",
                "status": {"state": "SUCCEEDED"},
                "manifest": {"schema": {"columns": [{"name": "농장ID"}, {"name": "농장명"}]}},
                "result": {"data_array": [["1", "A"]], "next_chunk_internal_link": chunk_path(1)}
            }),
        )
        .await;
        let first = get_mock(
            &mut server,
            &chunk_path(1),
            json!({"data_array": [["2", "B"]], "next_chunk_internal_link": chunk_path(2)}),
            1,
        )
        .await;
        let last = get_mock(&mut server, &chunk_path(2), json!({"data_array": [["3", "C"]]}), 1).await;

        let mut op = operation(&server, Duration::from_secs(10)).await?;
        let raw = op.fetch_all().await?;

        assert_eq!(
            raw,
            RawResult::Table {
                columns: vec!["농장ID".to_string(), "농장명".to_string()],
                rows: vec![json!(["1", "A"]), json!(["2", "B"]), json!(["3", "C"])],
            }
        );
        first.assert_async().await;
        last.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_closing_unfinished_statement_cancels_it() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let _submit = submit_mock(
            &mut server,
            json!({"statement_id": "st-3", "status": {"state": "RUNNING"}}),
        )
        .await;
        let cancel = server
            .mock("POST", "/api/2.0/sql/statements/st-3/cancel")
            .match_header("authorization", "Bearer dapi-test")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let op = operation(&server, Duration::from_secs(10)).await?;
        op.close().await?;

        cancel.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_closing_finished_statement_sends_nothing() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let _submit = submit_mock(
            &mut server,
            json!({"statement_id": "st-4", "status": {"state": "SUCCEEDED"}, "result": {"data_array": []}}),
        )
        .await;
        let cancel = server
            .mock("POST", "/api/2.0/sql/statements/st-4/cancel")
            .expect(0)
            .create_async()
            .await;

        let mut op = operation(&server, Duration::from_secs(10)).await?;
        op.fetch_all().await?;
        op.close().await?;

        cancel.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_statement_surfaces_service_error() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let _submit = submit_mock(
            &mut server,
            json!({"statement_id": "st-5", "status": {"state": "PENDING"}}),
        )
        .await;
        let _poll = get_mock(
            &mut server,
            "/api/2.0/sql/statements/st-5",
            json!({
                "statement_id": "st-5",
                "status": {
                    "state": "FAILED",
                    "error": {"error_code": "BAD_REQUEST", "message": "Table or view not found: farms"}
                }
            }),
            1,
        )
        .await;

        let mut op = operation(&server, Duration::from_secs(10)).await?;
        match op.fetch_all().await {
            Err(WarehouseError::Statement { state, message }) => {
                assert_eq!(state, "FAILED");
                assert_eq!(message, "BAD_REQUEST: Table or view not found: farms");
            }
            other => panic!("expected statement error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_submit_carries_status_and_message() -> Result<(), WarehouseError> {
        let mut server = Server::new_async().await;
        let _submit = server
            .mock("POST", STATEMENTS_PATH)
            .with_status(403)
            .with_body(r#"{"error_code":"PERMISSION_DENIED","message":"Invalid access token."}"#)
            .create_async()
            .await;

        match operation(&server, Duration::from_secs(10)).await {
            Err(WarehouseError::Rejected { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "Invalid access token.");
            }
            Err(other) => panic!("expected rejection, got {other}"),
            Ok(_) => panic!("expected rejection, got an operation"),
        }
        Ok(())
    }
}
