//! REST API Routes Module
//!
//! Route modules and the composition of the full application router.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub mod client;
pub mod dashboard;
pub mod dbsql;
pub mod farms;
pub mod health;
pub mod upload;

pub use upload::UploadState;

/// Create the complete application router.
///
/// | Path | Methods |
/// |------|---------|
/// | `/api/farms` | GET, POST |
/// | `/api/farms/:id` | PUT, DELETE |
/// | `/api/dbsql` | GET |
/// | `/upload` | POST |
/// | `/dashboard` | GET |
/// | `/`, `/farms.html`, `/assets/farms-crud.js` | GET |
/// | `/health/*`, `/metrics` | GET |
///
/// Execution order: CORS -> Observability -> Handler
pub fn create_app_router(state: AppState) -> Router {
    let farms = farms::create_router(
        state.warehouse.clone(),
        state.config.warehouse.farms_table.clone(),
    );
    let upload = upload::create_router(UploadState::new(
        state.files.clone(),
        state.config.storage.container.clone(),
        state.config.upload.clone(),
    ));
    let cors = build_cors_layer(&state.config);

    let shared: Router = Router::new()
        .route("/api/dbsql", get(dbsql::run_connectivity_check))
        .route("/dashboard", get(dashboard::dashboard_page))
        .nest("/health", health::create_router())
        .with_state(state);

    Router::new()
        .nest("/api/farms", farms)
        .nest("/upload", upload)
        .merge(shared)
        .merge(client::create_router())
        .route("/metrics", get(metrics_handler))
        .layer(from_fn(observability_middleware))
        .layer(cors)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from AppConfig.
///
/// With no configured origins every origin is allowed; otherwise only the
/// listed ones.
fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.has_origin_allowlist() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if config.cors_allow_credentials {
        cors.allow_origin(origins).allow_credentials(true)
    } else {
        cors.allow_origin(origins)
    }
}
