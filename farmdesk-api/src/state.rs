//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use crate::config::AppConfig;
use crate::storage::FileStore;
use crate::token::TokenSource;
use crate::warehouse::{WarehouseClient, WarehouseDriver};

/// Application-wide state, built once at startup.
///
/// Everything in here is immutable or internally shared; handlers never
/// mutate it.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub warehouse: WarehouseClient,
    /// `None` when no storage connection string is configured.
    pub files: Option<Arc<dyn FileStore>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tokens: Arc<dyn TokenSource>,
        driver: Arc<dyn WarehouseDriver>,
        files: Option<Arc<dyn FileStore>>,
    ) -> Self {
        let warehouse = WarehouseClient::new(
            tokens,
            driver,
            config.warehouse.host.clone(),
            config.warehouse.http_path.clone(),
        );
        Self {
            config: Arc::new(config),
            warehouse,
            files,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<AppConfig>, config);
crate::impl_from_ref!(WarehouseClient, warehouse);
crate::impl_from_ref!(Instant, start_time);
