//! Application state for gateway service.

use std::sync::Arc;
use std::time::Duration;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};

use crate::query_store::QueryStore;
use crate::service::QueryService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub http_client: reqwest::Client,
    pub store: Arc<dyn QueryStore>,
    pub service: Arc<QueryService>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, store: Arc<dyn QueryStore>) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.resource_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| AppError::Application(format!("Failed to create HTTP client: {}", e)))?;

        let service = Arc::new(QueryService::new(
            store.clone(),
            http_client.clone(),
            config.original_query_max_len,
        ));

        Ok(Self {
            config,
            http_client,
            store,
            service,
        })
    }
}
