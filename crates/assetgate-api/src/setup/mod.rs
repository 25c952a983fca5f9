//! Application setup and initialization

pub mod routes;
pub mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use assetgate_core::Config;
use assetgate_services::ResourceManager;
use assetgate_storage::create_providers;

use crate::state::AppState;

/// Build providers, the resource manager and the router from configuration.
pub async fn initialize_app(config: &Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.log_format())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        asset_environment = %config.asset_environment(),
        providers = ?config.configured_providers(),
        "Configuration loaded and validated"
    );

    let providers = create_providers(config).context("Failed to create provider adapters")?;
    let resources = ResourceManager::new(config, providers)
        .map_err(|e| anyhow::anyhow!("Failed to build resource manager: {}", e))?;
    let state = Arc::new(AppState::new(Arc::new(resources)));

    let router = routes::setup_routes(config, state.clone())?;
    Ok((state, router))
}
