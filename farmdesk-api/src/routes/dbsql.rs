//! Warehouse connectivity check.

use axum::{extract::State, response::IntoResponse, Json};
use farmdesk_core::connectivity_check;
use serde_json::json;

use crate::{error::ApiResult, warehouse::WarehouseClient};

/// GET /api/dbsql - Run `SELECT 1` and echo the raw result
pub async fn run_connectivity_check(State(warehouse): State<WarehouseClient>) -> ApiResult<impl IntoResponse> {
    let raw = warehouse.run(&connectivity_check()).await?;
    Ok(Json(json!({ "result": raw.to_json() })))
}
