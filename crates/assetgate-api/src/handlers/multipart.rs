//! Untracked multipart sessions: the caller keeps the provider upload id.

use std::sync::Arc;

use assetgate_core::models::requests::{
    MultipartInitRequest, MultipartInitResponse, MultipartUrlsRequest, MultipartUrlsResponse,
};
use assetgate_core::ProviderName;
use assetgate_services::ResolveOptions;
use axum::extract::State;
use axum::Json;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Create a provider multipart session for a rendered definition path
#[utoipa::path(
    post,
    path = "/resources/multipart/init",
    tag = "multipart",
    request_body = MultipartInitRequest,
    responses(
        (status = 200, description = "Session created", body = MultipartInitResponse),
        (status = 400, description = "Invalid parameters or provider without multipart support", body = ErrorResponse),
        (status = 502, description = "Provider call failed", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, request),
    fields(definition = %request.definition_name, provider = %request.provider)
)]
pub async fn init_multipart(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<MultipartInitRequest>,
) -> Result<Json<MultipartInitResponse>, HttpAppError> {
    let provider: ProviderName = request.provider.parse()?;
    let options = ResolveOptions {
        scope: request.scope,
        scope_value: request.scope_value,
        parameters: request.parameters,
        expiry: None,
        metadata: request.metadata,
    };

    let init = state
        .resources
        .resolver()
        .init_multipart(&request.definition_name, provider, &options)
        .await?;

    Ok(Json(MultipartInitResponse {
        upload_id: init.provider_upload_id,
        path: init.path,
        provider: init.provider,
        min_part_size: init.limits.min_part_size,
        max_part_size: init.limits.max_part_size,
        max_parts: init.limits.max_parts,
        part_alignment: init.limits.part_alignment,
    }))
}

/// Sign part URLs plus complete and abort URLs for an open session
#[utoipa::path(
    post,
    path = "/resources/multipart/urls",
    tag = "multipart",
    request_body = MultipartUrlsRequest,
    responses(
        (status = 200, description = "URLs signed", body = MultipartUrlsResponse),
        (status = 400, description = "Part numbers or sizes outside the provider's limits", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, request),
    fields(provider = %request.provider, parts = request.url_options.len())
)]
pub async fn multipart_urls(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<MultipartUrlsRequest>,
) -> Result<Json<MultipartUrlsResponse>, HttpAppError> {
    let provider: ProviderName = request.provider.parse()?;

    let urls = state
        .resources
        .resolver()
        .multipart_urls(
            provider,
            &request.path,
            &request.upload_id,
            &request.url_options,
            request.expiry,
        )
        .await?;

    Ok(Json(MultipartUrlsResponse {
        part_urls: urls.parts,
        complete_url: urls.complete,
        abort_url: urls.abort,
    }))
}
