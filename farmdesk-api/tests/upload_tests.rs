//! Excel upload route against the in-memory file store.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use farmdesk_api::{create_app_router, AppConfig, AppState, FileStore};
use farmdesk_test_utils::{MemoryFileStore, MemoryWarehouse, StaticTokenSource, StoreStep};
use regex::Regex;
use serde_json::{json, Value};
use tower::ServiceExt;

type TestResult = Result<(), String>;

const BOUNDARY: &str = "farmdesk-test-boundary";
const CONTAINER: &str = "farm-uploads";
const WORKBOOK: &[u8] = b"PK\x03\x04 fake workbook bytes";

fn config(upload_dir: &Path, extra: &[(&str, &str)]) -> Result<AppConfig, String> {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("AZURE_STORAGE_CONTAINER".into(), CONTAINER.into());
    vars.insert("UPLOAD_DIR".into(), upload_dir.display().to_string());
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    AppConfig::from_lookup(|key| vars.get(key).cloned()).map_err(|e| e.to_string())
}

fn app(config: AppConfig, store: Option<&MemoryFileStore>) -> Router {
    let files = store.map(|s| Arc::new(s.clone()) as Arc<dyn FileStore>);
    let state = AppState::new(
        config,
        Arc::new(StaticTokenSource::new("unused")),
        Arc::new(MemoryWarehouse::new()),
        files,
    );
    create_app_router(state)
}

fn multipart_request(field: &str, file_name: &str, content: &[u8]) -> Result<Request<Body>, String> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/vnd.ms-excel\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .map_err(|e| e.to_string())
}

async fn send(app: Router, request: Request<Body>) -> Result<(StatusCode, Value), String> {
    let response = app.oneshot(request).await.map_err(|e| e.to_string())?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| e.to_string())?;
    let body = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
    Ok((status, body))
}

fn staged_files(dir: &Path) -> Result<usize, String> {
    if !dir.exists() {
        return Ok(0);
    }
    Ok(std::fs::read_dir(dir).map_err(|e| e.to_string())?.count())
}

#[tokio::test]
async fn test_upload_lands_file_with_timestamp_name() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    let router = app(config(temp.path(), &[])?, Some(&store));

    let (status, body) = send(router, multipart_request("xlsFile", "farms.xlsx", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Upload succeeded"));

    let file_name = body["fileName"].as_str().ok_or("no fileName")?;
    let pattern = Regex::new(r"^\d{8}_\d{6}\.xls$").map_err(|e| e.to_string())?;
    assert!(pattern.is_match(file_name), "unexpected name: {}", file_name);

    assert_eq!(store.file(CONTAINER, file_name).as_deref(), Some(WORKBOOK));
    assert_eq!(staged_files(temp.path())?, 0);
    Ok(())
}

#[tokio::test]
async fn test_original_naming_keeps_sanitized_base_and_extension() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    let router = app(
        config(temp.path(), &[("UPLOAD_NAMING", "original")])?,
        Some(&store),
    );

    let (status, body) = send(router, multipart_request("xlsFile", "farm list(2).xlsx", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::OK);

    let file_name = body["fileName"].as_str().ok_or("no fileName")?;
    let pattern = Regex::new(r"^\d{8}_\d{6}_farmlist2\.xlsx$").map_err(|e| e.to_string())?;
    assert!(pattern.is_match(file_name), "unexpected name: {}", file_name);
    assert_eq!(store.paths(CONTAINER), vec![file_name.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_missing_file_system_is_bad_request_and_discards_temp() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&["other-container"]);
    let router = app(config(temp.path(), &[])?, Some(&store));

    let (status, body) = send(router, multipart_request("xlsFile", "farms.xls", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "message": "File system does not exist." }));
    assert!(store.paths(CONTAINER).is_empty());
    assert_eq!(staged_files(temp.path())?, 0);
    Ok(())
}

#[tokio::test]
async fn test_append_failure_keeps_temp_file() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    store.fail_at(StoreStep::Append);
    let router = app(config(temp.path(), &[])?, Some(&store));

    let (status, body) = send(router, multipart_request("xlsFile", "farms.xls", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Upload failed" }));
    assert_eq!(staged_files(temp.path())?, 1);
    Ok(())
}

#[tokio::test]
async fn test_existence_check_failure_is_server_error() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    store.fail_at(StoreStep::Exists);
    let router = app(config(temp.path(), &[])?, Some(&store));

    let (status, body) = send(router, multipart_request("xlsFile", "farms.xls", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Upload failed" }));
    Ok(())
}

#[tokio::test]
async fn test_wrong_field_name_is_bad_request() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    let router = app(config(temp.path(), &[])?, Some(&store));

    let (status, body) = send(router, multipart_request("file", "farms.xls", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().ok_or("no message")?;
    assert!(message.contains("xlsFile"), "unexpected message: {}", message);
    assert_eq!(staged_files(temp.path())?, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_storage_configuration_is_bad_request() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let router = app(config(temp.path(), &[])?, None);

    let (status, body) = send(router, multipart_request("xlsFile", "farms.xls", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().ok_or("no message")?;
    assert!(message.contains("AZURE_STORAGE_CONNECTION_STRING"));
    assert_eq!(staged_files(temp.path())?, 0);
    Ok(())
}

#[tokio::test]
async fn test_body_over_limit_is_payload_too_large() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    let router = app(
        config(temp.path(), &[("UPLOAD_MAX_BYTES", "512")])?,
        Some(&store),
    );

    let oversized = vec![b'x'; 4096];
    let (status, body) = send(router, multipart_request("xlsFile", "farms.xlsx", &oversized)?).await?;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["message"].is_string());
    assert!(store.paths(CONTAINER).is_empty());
    assert_eq!(staged_files(temp.path())?, 0);
    Ok(())
}

#[tokio::test]
async fn test_unwritable_upload_dir_is_upload_failed() -> TestResult {
    let temp = tempfile::tempdir().map_err(|e| e.to_string())?;
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").map_err(|e| e.to_string())?;
    let store = MemoryFileStore::with_file_systems(&[CONTAINER]);
    let router = app(config(&blocker, &[])?, Some(&store));

    let (status, body) = send(router, multipart_request("xlsFile", "farms.xlsx", WORKBOOK)?).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "message": "Upload failed" }));
    assert!(store.paths(CONTAINER).is_empty());
    Ok(())
}
