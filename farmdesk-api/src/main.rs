//! Farmdesk Server Entry Point
//!
//! Loads `.env`, builds configuration and the outbound clients once, and
//! starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use farmdesk_api::storage::FileStore;
use farmdesk_api::telemetry::{init_tracing, TelemetryConfig};
use farmdesk_api::{
    create_app_router, ApiError, ApiResult, AppConfig, AppState, DataLakeClient,
    DatabricksDriver, OAuthTokenProvider,
};
use secrecy::ExposeSecret;

#[tokio::main]
async fn main() -> ApiResult<()> {
    dotenvy::dotenv().ok();

    let telemetry_config = TelemetryConfig::default();
    init_tracing(&telemetry_config)?;

    let config = AppConfig::from_env()?;

    let tokens = OAuthTokenProvider::new(config.oauth.clone(), config.http_timeout)?;
    let driver = DatabricksDriver::new(config.http_timeout);
    let files: Option<Arc<dyn FileStore>> = match &config.storage.connection_string {
        Some(raw) => {
            let client = DataLakeClient::from_connection_string(raw.expose_secret(), config.http_timeout)?;
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("AZURE_STORAGE_CONNECTION_STRING not set; uploads are disabled");
            None
        }
    };

    let addr = resolve_bind_addr(&config)?;
    let state = AppState::new(config, Arc::new(tokens), Arc::new(driver), files);
    let app: Router = create_app_router(state);

    tracing::info!(%addr, "Starting Farmdesk server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr(config: &AppConfig) -> ApiResult<SocketAddr> {
    let addr = format!("{}:{}", config.bind_host, config.port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
