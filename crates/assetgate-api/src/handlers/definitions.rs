//! Read-only catalog: path definitions and configured providers.

use std::sync::Arc;

use assetgate_core::models::requests::{DefinitionSummary, ProviderSummary};
use axum::extract::{Path, State};
use axum::Json;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// List every registered path definition
#[utoipa::path(
    get,
    path = "/resources/definitions",
    tag = "definitions",
    responses(
        (status = 200, description = "Registered definitions, parents before children", body = [DefinitionSummary])
    )
)]
pub async fn list_definitions(State(state): State<Arc<AppState>>) -> Json<Vec<DefinitionSummary>> {
    Json(state.resources.definitions())
}

/// Describe one path definition
#[utoipa::path(
    get,
    path = "/resources/definitions/{name}",
    tag = "definitions",
    params(("name" = String, Path, description = "Definition name")),
    responses(
        (status = 200, description = "Definition found", body = DefinitionSummary),
        (status = 404, description = "No definition with this name", body = ErrorResponse)
    )
)]
pub async fn get_definition(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DefinitionSummary>, HttpAppError> {
    Ok(Json(state.resources.definition(&name)?))
}

/// List configured providers with their capabilities
#[utoipa::path(
    get,
    path = "/resources/providers",
    tag = "definitions",
    responses(
        (status = 200, description = "Configured providers", body = [ProviderSummary])
    )
)]
pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderSummary>> {
    Json(state.resources.provider_summaries())
}
