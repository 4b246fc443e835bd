//! Prometheus Metrics Definitions
//!
//! Defines all Farmdesk metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Warehouse statements include polling, so the tail is longer.
const STATEMENT_LATENCY_BUCKETS: &[f64] =
    &[0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<FarmdeskMetrics>> = Lazy::new(FarmdeskMetrics::new);

/// Container for all Farmdesk metrics.
#[derive(Clone)]
pub struct FarmdeskMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Warehouse statement counter - labels: kind, status
    pub warehouse_statements_total: CounterVec,

    /// Warehouse statement duration histogram - labels: kind
    pub warehouse_statement_duration_seconds: HistogramVec,

    /// Upload counter - labels: outcome
    pub uploads_total: CounterVec,
}

impl FarmdeskMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "farmdesk_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_requests_total: {}", e)))?,

            http_request_duration_seconds: register_histogram_vec!(
                "farmdesk_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register http_request_duration_seconds: {}", e)))?,

            warehouse_statements_total: register_counter_vec!(
                "farmdesk_warehouse_statements_total",
                "Total number of warehouse statements",
                &["kind", "status"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register warehouse_statements_total: {}", e)))?,

            warehouse_statement_duration_seconds: register_histogram_vec!(
                "farmdesk_warehouse_statement_duration_seconds",
                "Warehouse statement duration in seconds, token exchange excluded",
                &["kind"],
                STATEMENT_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register warehouse_statement_duration_seconds: {}", e)))?,

            uploads_total: register_counter_vec!(
                "farmdesk_uploads_total",
                "Total number of file uploads",
                &["outcome"]
            )
            .map_err(|e| ApiError::internal_error(format!("Failed to register uploads_total: {}", e)))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a warehouse statement.
    pub fn record_statement(&self, kind: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.warehouse_statements_total
            .with_label_values(&[kind, status])
            .inc();
        self.warehouse_statement_duration_seconds
            .with_label_values(&[kind])
            .observe(duration_secs);
    }

    /// Record an upload outcome (`success`, `rejected` or `failed`).
    pub fn record_upload(&self, outcome: &str) {
        self.uploads_total.with_label_values(&[outcome]).inc();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the registry so an idle process still exports its families
    if let Err(e) = METRICS.as_ref() {
        tracing::error!(error = %e, "Metrics registry unavailable");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
