//! Object operations under `/resources/{provider}/...`
//!
//! One catch-all route per method. The tail of the path selects the
//! operation: `{definition}/upload`, `{definition}/list`, `{path}/download`
//! and `{path}/metadata`; `DELETE` takes the whole tail as the object path.
//! The provider code is parsed before anything else.

use std::sync::Arc;

use assetgate_core::models::requests::{
    DeleteObjectResponse, DownloadUrlRequest, DownloadUrlResponse, ListObjectsRequest,
    ListObjectsResponse, UploadUrlRequest, UploadUrlResponse,
};
use assetgate_core::models::MetadataPatch;
use assetgate_core::{AppError, AppResult, ObjectMetadata, ProviderName};
use assetgate_services::ResolveOptions;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, PartialEq, Eq)]
enum PostRoute<'a> {
    Upload(&'a str),
    List(&'a str),
    Download(&'a str),
}

fn split_action(rest: &str) -> Option<(&str, &str)> {
    rest.trim_end_matches('/')
        .rsplit_once('/')
        .filter(|(target, _)| !target.is_empty())
}

fn unknown_operation(rest: &str) -> AppError {
    AppError::InvalidInput(format!("Unknown resource operation: {}", rest))
}

fn definition_name<'a>(target: &'a str, rest: &str) -> AppResult<&'a str> {
    if target.contains('/') {
        return Err(unknown_operation(rest));
    }
    Ok(target)
}

fn post_route(rest: &str) -> AppResult<PostRoute<'_>> {
    match split_action(rest) {
        Some((target, "download")) => Ok(PostRoute::Download(target)),
        Some((target, "upload")) => Ok(PostRoute::Upload(definition_name(target, rest)?)),
        Some((target, "list")) => Ok(PostRoute::List(definition_name(target, rest)?)),
        _ => Err(unknown_operation(rest)),
    }
}

fn metadata_path(rest: &str) -> AppResult<&str> {
    match split_action(rest) {
        Some((path, "metadata")) => Ok(path),
        _ => Err(unknown_operation(rest)),
    }
}

/// Bodies of the catch-all routes are optional; an empty body means defaults.
fn parse_body<T>(body: &Bytes) -> Result<T, HttpAppError>
where
    T: DeserializeOwned + Validate + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    let value: T = serde_json::from_slice(body).map_err(AppError::from)?;
    value.validate()?;
    Ok(value)
}

/// `POST /resources/{provider}/{*rest}`
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    Path((provider, rest)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, HttpAppError> {
    let provider: ProviderName = provider.parse()?;
    let response = match post_route(&rest)? {
        PostRoute::Upload(definition) => {
            upload_url(&state, provider, definition, parse_body(&body)?)
                .await?
                .into_response()
        }
        PostRoute::List(definition) => list_objects(&state, provider, definition, parse_body(&body)?)
            .await?
            .into_response(),
        PostRoute::Download(path) => download_url(&state, provider, path, parse_body(&body)?)
            .await?
            .into_response(),
    };
    Ok(response)
}

/// `GET /resources/{provider}/{*rest}`
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((provider, rest)): Path<(String, String)>,
) -> Result<Json<ObjectMetadata>, HttpAppError> {
    let provider: ProviderName = provider.parse()?;
    let path = metadata_path(&rest)?;
    Ok(get_metadata(&state, provider, path).await?)
}

/// `PUT /resources/{provider}/{*rest}`
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((provider, rest)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<ObjectMetadata>, HttpAppError> {
    let provider: ProviderName = provider.parse()?;
    let path = metadata_path(&rest)?;
    Ok(update_metadata(&state, provider, path, parse_body(&body)?).await?)
}

/// Delete an object
#[utoipa::path(
    delete,
    path = "/resources/{provider}/{path}",
    tag = "objects",
    params(
        ("provider" = String, Path, description = "cdn, gcs or r2"),
        ("path" = String, Path, description = "Object path")
    ),
    responses(
        (status = 200, description = "Object deleted", body = DeleteObjectResponse),
        (status = 404, description = "Provider reports the object missing", body = ErrorResponse)
    )
)]
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((provider, rest)): Path<(String, String)>,
) -> Result<Json<DeleteObjectResponse>, HttpAppError> {
    let provider: ProviderName = provider.parse()?;
    let path = state.resources.resolver().delete_object(provider, &rest).await?;
    Ok(Json(DeleteObjectResponse {
        deleted: true,
        path,
    }))
}

/// Sign a write URL for a definition path
#[utoipa::path(
    post,
    path = "/resources/{provider}/{definition}/upload",
    tag = "objects",
    params(
        ("provider" = String, Path, description = "cdn, gcs or r2"),
        ("definition" = String, Path, description = "Definition name")
    ),
    request_body = UploadUrlRequest,
    responses(
        (status = 200, description = "Upload URL signed", body = UploadUrlResponse),
        (status = 400, description = "Scope, parameter or capability error", body = ErrorResponse),
        (status = 404, description = "Unknown definition or unconfigured provider", body = ErrorResponse),
        (status = 413, description = "Declared size exceeds the single-upload limit", body = ErrorResponse)
    )
)]
pub async fn upload_url(
    state: &AppState,
    provider: ProviderName,
    definition: &str,
    request: UploadUrlRequest,
) -> AppResult<Json<UploadUrlResponse>> {
    let resolved = state
        .resources
        .resolver()
        .resolve_upload_url(definition, provider, &ResolveOptions::from(request))
        .await?;

    Ok(Json(UploadUrlResponse {
        url: resolved.url.url,
        method: resolved.url.method,
        headers: resolved.url.headers,
        expires_at: resolved.url.expires_at,
        resolved_path: resolved.path,
        public_url: resolved.public_url,
    }))
}

/// List objects under a definition's prefix
#[utoipa::path(
    post,
    path = "/resources/{provider}/{definition}/list",
    tag = "objects",
    params(
        ("provider" = String, Path, description = "cdn, gcs or r2"),
        ("definition" = String, Path, description = "Definition name")
    ),
    request_body = ListObjectsRequest,
    responses(
        (status = 200, description = "One page of objects", body = ListObjectsResponse),
        (status = 400, description = "Invalid parameters or provider cannot list", body = ErrorResponse)
    )
)]
pub async fn list_objects(
    state: &AppState,
    provider: ProviderName,
    definition: &str,
    request: ListObjectsRequest,
) -> AppResult<Json<ListObjectsResponse>> {
    Ok(Json(
        state
            .resources
            .resolver()
            .list_objects(definition, provider, &request)
            .await?,
    ))
}

/// Sign a read URL for an object path
#[utoipa::path(
    post,
    path = "/resources/{provider}/{path}/download",
    tag = "objects",
    params(
        ("provider" = String, Path, description = "cdn, gcs or r2"),
        ("path" = String, Path, description = "Object path")
    ),
    request_body = DownloadUrlRequest,
    responses(
        (status = 200, description = "Download URL signed", body = DownloadUrlResponse),
        (status = 400, description = "Expiry out of range or overrides unsupported", body = ErrorResponse)
    )
)]
pub async fn download_url(
    state: &AppState,
    provider: ProviderName,
    path: &str,
    request: DownloadUrlRequest,
) -> AppResult<Json<DownloadUrlResponse>> {
    let resolved = state
        .resources
        .resolver()
        .resolve_download_url(provider, path, &request)
        .await?;

    Ok(Json(DownloadUrlResponse {
        url: resolved.url.url,
        method: resolved.url.method,
        expires_at: resolved.url.expires_at,
        headers: resolved.url.headers,
    }))
}

/// Read object metadata
#[utoipa::path(
    get,
    path = "/resources/{provider}/{path}/metadata",
    tag = "objects",
    params(
        ("provider" = String, Path, description = "cdn, gcs or r2"),
        ("path" = String, Path, description = "Object path")
    ),
    responses(
        (status = 200, description = "Object metadata", body = ObjectMetadata),
        (status = 404, description = "Object not found", body = ErrorResponse)
    )
)]
pub async fn get_metadata(
    state: &AppState,
    provider: ProviderName,
    path: &str,
) -> AppResult<Json<ObjectMetadata>> {
    Ok(Json(
        state.resources.resolver().get_metadata(provider, path).await?,
    ))
}

/// Update object metadata
#[utoipa::path(
    put,
    path = "/resources/{provider}/{path}/metadata",
    tag = "objects",
    params(
        ("provider" = String, Path, description = "cdn, gcs or r2"),
        ("path" = String, Path, description = "Object path")
    ),
    request_body = MetadataPatch,
    responses(
        (status = 200, description = "Updated metadata", body = ObjectMetadata),
        (status = 404, description = "Object not found", body = ErrorResponse)
    )
)]
pub async fn update_metadata(
    state: &AppState,
    provider: ProviderName,
    path: &str,
    patch: MetadataPatch,
) -> AppResult<Json<ObjectMetadata>> {
    Ok(Json(
        state
            .resources
            .resolver()
            .update_metadata(provider, path, &patch)
            .await?,
    ))
}
