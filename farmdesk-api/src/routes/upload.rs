//! Excel Upload Route
//!
//! `POST /upload` takes one multipart field, `xlsFile`, stages it on local
//! disk and lands it in the data lake under a timestamped name:
//!
//! 1. stream the field into a temp file in the upload directory
//! 2. check the file-system container exists (400 if not)
//! 3. create the file, append the whole content at position 0, flush
//! 4. delete the temp file
//!
//! A body over `UPLOAD_MAX_BYTES` answers 413. A missing container removes
//! the temp file; a failure in steps 3-4 answers 500 and leaves it behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    config::{UploadConfig, UploadNaming},
    error::{ApiError, ApiResult, ErrorBody},
    storage::{FileStore, StorageError},
    telemetry::METRICS,
};

/// Multipart field carrying the workbook.
pub const FILE_FIELD: &str = "xlsFile";

const MAX_BASE_NAME_CHARS: usize = 30;

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared state for the upload route.
#[derive(Clone)]
pub struct UploadState {
    pub files: Option<Arc<dyn FileStore>>,
    pub container: Option<String>,
    pub upload: UploadConfig,
}

impl UploadState {
    pub fn new(
        files: Option<Arc<dyn FileStore>>,
        container: Option<String>,
        upload: UploadConfig,
    ) -> Self {
        Self {
            files,
            container,
            upload,
        }
    }
}

/// Body of a successful upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

/// A multipart field written to local disk.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
    original_name: Option<String>,
    len: u64,
}

// ============================================================================
// NAMING
// ============================================================================

/// Destination name for an upload received at `now`.
///
/// `Timestamp` yields `YYYYMMDD_HHmmss.xls`. `Original` yields
/// `YYYYMMDD_HHmmss_{base}{ext}`, where `base` keeps only the ASCII letters
/// and digits of the original base name (at most 30) and `ext` is the
/// original extension.
pub fn destination_name(
    now: DateTime<FixedOffset>,
    naming: UploadNaming,
    original_name: Option<&str>,
) -> String {
    let timestamp = now.format("%Y%m%d_%H%M%S");
    match naming {
        UploadNaming::Timestamp => format!("{}.xls", timestamp),
        UploadNaming::Original => {
            let original = original_name
                .map(|n| n.rsplit(['/', '\\']).next().unwrap_or(n))
                .unwrap_or_default();
            let (base, ext) = split_extension(original);
            let clean: String = base
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .take(MAX_BASE_NAME_CHARS)
                .collect();
            format!("{}_{}{}", timestamp, clean, ext)
        }
    }
}

/// Split `report.v2.xlsx` into (`report.v2`, `.xlsx`). Dotfiles have no
/// extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

// ============================================================================
// HANDLER
// ============================================================================

fn upload_error(err: ApiError) -> ApiError {
    err.with_body(ErrorBody::Message)
}

/// Map a multipart read failure, keeping the body limit distinct.
fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(err.body_text())
    } else {
        ApiError::invalid_input(err.body_text())
    }
}

/// POST /upload - Forward one Excel file into the data lake
///
/// The staged temp file is removed once the data lake holds the content, and
/// also when the container does not exist (400). After a failed create,
/// append or flush it stays on disk.
pub async fn upload(
    State(state): State<Arc<UploadState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let multipart = multipart
        .map_err(|rejection| upload_error(ApiError::invalid_input(rejection.body_text())))?;

    let (files, container) = match (&state.files, &state.container) {
        (Some(files), Some(container)) => (Arc::clone(files), container.clone()),
        (None, _) => {
            return Err(upload_error(ApiError::configuration_missing(
                "Missing storage configuration: AZURE_STORAGE_CONNECTION_STRING",
            )))
        }
        (_, None) => {
            return Err(upload_error(ApiError::configuration_missing(
                "Missing storage configuration: AZURE_STORAGE_CONTAINER",
            )))
        }
    };

    let staged = stage_file(multipart, &state.upload.dir).await.map_err(upload_error)?;
    let now = Utc::now().with_timezone(&state.upload.utc_offset);
    let file_name = destination_name(now, state.upload.naming, staged.original_name.as_deref());

    tracing::info!(
        file_name = %file_name,
        bytes = staged.len,
        temp = %staged.path.display(),
        "Upload received"
    );

    let exists = files.file_system_exists(&container).await.map_err(|e| {
        record_upload("failed");
        tracing::error!(container = %container, error = %e, "Upload failed");
        upload_error(ApiError::storage_error("Upload failed"))
    })?;
    if !exists {
        record_upload("rejected");
        discard(&staged.path).await;
        return Err(upload_error(ApiError::file_system_not_found()));
    }

    if let Err(e) = forward(files.as_ref(), &container, &file_name, &staged).await {
        record_upload("failed");
        tracing::error!(
            file_name = %file_name,
            temp = %staged.path.display(),
            error = %e,
            "Upload failed; temp file left in place"
        );
        return Err(upload_error(ApiError::storage_error("Upload failed")));
    }

    record_upload("success");
    tracing::info!(file_name = %file_name, container = %container, "Upload stored");
    Ok(Json(UploadResponse {
        message: "Upload succeeded".to_string(),
        file_name,
    }))
}

/// Create, append, flush, then remove the temp file.
async fn forward(
    files: &dyn FileStore,
    container: &str,
    file_name: &str,
    staged: &StagedFile,
) -> Result<(), UploadStepError> {
    files.create_file(container, file_name).await?;
    let content = tokio::fs::read(&staged.path).await?;
    let len = content.len() as u64;
    files.append(container, file_name, 0, content).await?;
    files.flush(container, file_name, len).await?;
    tokio::fs::remove_file(&staged.path).await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum UploadStepError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stream the `xlsFile` field to a fresh temp file.
async fn stage_file(mut multipart: Multipart, dir: &Path) -> ApiResult<StagedFile> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| staging_failed(dir, e))?;
        let path = dir.join(Uuid::new_v4().simple().to_string());
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| staging_failed(&path, e))?;

        return match write_field(field, file).await {
            Ok(len) => Ok(StagedFile {
                path,
                original_name,
                len,
            }),
            Err(err) => {
                discard(&path).await;
                Err(match err {
                    StageError::Multipart(e) => multipart_error(e),
                    StageError::Io(e) => staging_failed(&path, e),
                })
            }
        };
    }

    Err(ApiError::missing_field(FILE_FIELD))
}

#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Copy the field into `file`; returns the byte count.
async fn write_field(
    mut field: axum::extract::multipart::Field<'_>,
    mut file: tokio::fs::File,
) -> Result<u64, StageError> {
    let mut len = 0u64;
    while let Some(chunk) = field.chunk().await? {
        len += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(len)
}

fn staging_failed(path: &Path, err: std::io::Error) -> ApiError {
    record_upload("failed");
    tracing::error!(path = %path.display(), error = %err, "Failed to stage upload");
    ApiError::storage_error("Upload failed")
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
    }
}

fn record_upload(outcome: &str) {
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_upload(outcome);
    }
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: UploadState) -> Router {
    let limit = state.upload.max_bytes;
    Router::new()
        .route("/", post(upload))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(Arc::new(state))
}
