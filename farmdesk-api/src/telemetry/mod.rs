//! Farmdesk Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the API
//! layer. Nothing here needs an external collector.

pub mod logging;
pub mod metrics;
pub mod middleware;

pub use logging::{init_tracing, LogFormat, TelemetryConfig};
pub use metrics::{metrics_handler, FarmdeskMetrics, METRICS};
pub use middleware::observability_middleware;
