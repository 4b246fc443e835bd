//! Axum Middleware for HTTP Request Logging and Metrics
//!
//! Every request runs inside an `http_request` span, is counted in
//! Prometheus, and produces one completion log line.

use axum::{extract::Request, middleware::Next, response::Response};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Instant;
use tracing::{info_span, Instrument};

use super::metrics::METRICS;

static NUMERIC_SEGMENT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"/-?\d+(/|$)"));

/// Normalize path for metrics/spans (replace numeric ids with a placeholder).
///
/// This prevents high-cardinality label explosion in Prometheus.
fn normalize_path(path: &str) -> String {
    match NUMERIC_SEGMENT.as_ref() {
        // Applied twice so adjacent id segments sharing a slash both match
        Ok(re) => {
            let once = re.replace_all(path, "/{id}$1");
            re.replace_all(&once, "/{id}$1").into_owned()
        }
        Err(_) => path.to_string(),
    }
}

/// Observability middleware for Axum.
///
/// This middleware wraps every request with:
/// 1. A tracing span carrying method and route
/// 2. Prometheus metrics recording
/// 3. Request completion logging
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let normalized_path = normalize_path(&path);
    let origin = request
        .headers()
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %normalized_path,
    );

    let response = next.run(request).instrument(span).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_http_request(
            method.as_str(),
            &normalized_path,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    tracing::info!(
        method = %method,
        path = %path,
        origin = %origin,
        status = status.as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}
