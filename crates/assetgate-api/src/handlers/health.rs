use std::sync::Arc;

use assetgate_core::ProviderName;
use assetgate_worker::CleanupStats;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub providers: Vec<ProviderName>,
    #[schema(value_type = Object)]
    pub cleanup: CleanupStats,
}

/// Liveness plus configured providers and cleanup queue counters
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        providers: state.resources.resolver().providers().names(),
        cleanup: state.resources.cleanup_stats(),
    })
}
