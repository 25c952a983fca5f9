//! Tracked uploads: initiate, inspect and finish.

use std::sync::Arc;

use assetgate_core::models::requests::{
    InitiateUploadRequest, MultipartUrlsResponse, RenewUploadRequest, UploadPartsRequest,
    UploadResponse,
};
use assetgate_core::models::{Upload, UploadConfirmation, UploadId};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

/// Start a tracked upload
#[utoipa::path(
    post,
    path = "/resources/uploads",
    tag = "uploads",
    request_body = InitiateUploadRequest,
    responses(
        (status = 201, description = "Upload initiated", body = UploadResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown definition or provider", body = ErrorResponse)
    )
)]
#[tracing::instrument(
    skip(state, request),
    fields(definition = %request.definition_name, provider = %request.provider)
)]
pub async fn initiate_upload(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitiateUploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), HttpAppError> {
    let response = state.resources.uploads().initiate(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Get an upload record
#[utoipa::path(
    get,
    path = "/resources/uploads/{id}",
    tag = "uploads",
    params(("id" = String, Path, description = "Upload id")),
    responses(
        (status = 200, description = "Upload found", body = Upload),
        (status = 404, description = "Upload not found", body = ErrorResponse)
    )
)]
pub async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Upload>, HttpAppError> {
    Ok(Json(state.resources.uploads().get(&UploadId::from(id)).await?))
}

/// Report the outcome of an upload
#[utoipa::path(
    post,
    path = "/resources/uploads/{id}/confirm",
    tag = "uploads",
    params(("id" = String, Path, description = "Upload id")),
    request_body = UploadConfirmation,
    responses(
        (status = 200, description = "Upload confirmed or marked failed", body = Upload),
        (status = 400, description = "Receipt does not match the upload", body = ErrorResponse),
        (status = 409, description = "Upload already finished", body = ErrorResponse),
        (status = 410, description = "Upload expired", body = ErrorResponse)
    )
)]
pub async fn confirm_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(confirmation): ValidatedJson<UploadConfirmation>,
) -> Result<Json<Upload>, HttpAppError> {
    let upload = state
        .resources
        .uploads()
        .confirm(&UploadId::from(id), confirmation)
        .await?;
    Ok(Json(upload))
}

/// Abort a pending upload
#[utoipa::path(
    post,
    path = "/resources/uploads/{id}/abort",
    tag = "uploads",
    params(("id" = String, Path, description = "Upload id")),
    responses(
        (status = 200, description = "Upload aborted", body = Upload),
        (status = 409, description = "Upload already finished", body = ErrorResponse)
    )
)]
pub async fn abort_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Upload>, HttpAppError> {
    Ok(Json(state.resources.uploads().abort(&UploadId::from(id)).await?))
}

/// Re-sign the write URL of a pending simple upload
#[utoipa::path(
    post,
    path = "/resources/uploads/{id}/renew",
    tag = "uploads",
    params(("id" = String, Path, description = "Upload id")),
    request_body = RenewUploadRequest,
    responses(
        (status = 200, description = "URL renewed", body = UploadResponse),
        (status = 409, description = "Upload already finished", body = ErrorResponse),
        (status = 410, description = "Upload expired", body = ErrorResponse)
    )
)]
pub async fn renew_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<RenewUploadRequest>,
) -> Result<Json<UploadResponse>, HttpAppError> {
    let response = state
        .resources
        .uploads()
        .renew(&UploadId::from(id), request)
        .await?;
    Ok(Json(response))
}

/// Sign part URLs for a pending multipart upload
#[utoipa::path(
    post,
    path = "/resources/uploads/{id}/parts",
    tag = "uploads",
    params(("id" = String, Path, description = "Upload id")),
    request_body = UploadPartsRequest,
    responses(
        (status = 200, description = "Part URLs signed", body = MultipartUrlsResponse),
        (status = 400, description = "Parts outside the session's limits", body = ErrorResponse),
        (status = 409, description = "Upload already finished", body = ErrorResponse),
        (status = 410, description = "Upload expired", body = ErrorResponse)
    )
)]
pub async fn upload_part_urls(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(request): ValidatedJson<UploadPartsRequest>,
) -> Result<Json<MultipartUrlsResponse>, HttpAppError> {
    let urls = state
        .resources
        .uploads()
        .part_urls(&UploadId::from(id), request)
        .await?;
    Ok(Json(MultipartUrlsResponse {
        part_urls: urls.parts,
        complete_url: urls.complete,
        abort_url: urls.abort,
    }))
}
