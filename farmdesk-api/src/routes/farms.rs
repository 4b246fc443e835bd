//! Farm REST API Routes
//!
//! Each handler builds exactly one parameterized statement and runs it on the
//! warehouse. Nothing is cached between calls; concurrent updates race and
//! the last write wins.

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use farmdesk_core::{
    delete_farm, insert_farm, list_farms, normalize, update_farm, FarmInput, FarmRecord, TableName,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult, ErrorBody},
    extractors::FarmId,
    warehouse::WarehouseClient,
};

// ============================================================================
// SHARED STATE
// ============================================================================

/// Shared state for farm routes.
#[derive(Clone)]
pub struct FarmState {
    pub warehouse: WarehouseClient,
    pub table: TableName,
}

impl FarmState {
    pub fn new(warehouse: WarehouseClient, table: TableName) -> Self {
        Self { warehouse, table }
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Body of `GET /api/farms`.
#[derive(Debug, Serialize)]
pub struct ListFarmsResponse {
    pub success: bool,
    pub farms: Vec<FarmRecord>,
}

/// Body of every successful mutation.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

fn read_input(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<FarmInput> {
    let Json(body) = payload.map_err(|rejection| ApiError::invalid_input(rejection.body_text()))?;
    Ok(FarmInput::from_json(&body)?)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/farms - List every farm ordered by id
pub async fn list(State(state): State<Arc<FarmState>>) -> ApiResult<impl IntoResponse> {
    let raw = state
        .warehouse
        .run(&list_farms(&state.table))
        .await
        .map_err(|e| e.with_body(ErrorBody::SuccessFlag))?;

    let farms = normalize(&raw);
    tracing::debug!(count = farms.len(), "Listed farms");

    Ok(Json(ListFarmsResponse {
        success: true,
        farms,
    }))
}

/// POST /api/farms - Insert one farm
pub async fn create(
    State(state): State<Arc<FarmState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = read_input(payload)?;
    state
        .warehouse
        .run(&insert_farm(&state.table, &input))
        .await?;

    tracing::info!(name = ?input.name, "Farm created");
    Ok(MessageResponse::new("Farm created"))
}

/// PUT /api/farms/:id - Overwrite every editable field of one farm
pub async fn update(
    State(state): State<Arc<FarmState>>,
    FarmId(id): FarmId,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let input = read_input(payload)?;
    state
        .warehouse
        .run(&update_farm(&state.table, id, &input))
        .await?;

    tracing::info!(id, "Farm updated");
    Ok(MessageResponse::new("Farm updated"))
}

/// DELETE /api/farms/:id - Delete one farm
///
/// A missing id is not an error: the statement simply affects no rows.
pub async fn remove(
    State(state): State<Arc<FarmState>>,
    FarmId(id): FarmId,
) -> ApiResult<impl IntoResponse> {
    state.warehouse.run(&delete_farm(&state.table, id)).await?;

    tracing::info!(id, "Farm deleted");
    Ok(MessageResponse::new("Farm deleted"))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(warehouse: WarehouseClient, table: TableName) -> Router {
    let state = Arc::new(FarmState::new(warehouse, table));

    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", put(update).delete(remove))
        .with_state(state)
}
