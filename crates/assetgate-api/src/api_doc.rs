//! OpenAPI documentation, served at `/api/openapi.json`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use assetgate_core::models::{self, requests};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Assetgate API",
        version = "0.1.0",
        description = "Resource-addressing broker: renders object paths from named definitions and hands out signed provider URLs. Object bytes never pass through the service."
    ),
    paths(
        handlers::definitions::list_definitions,
        handlers::definitions::get_definition,
        handlers::definitions::list_providers,
        handlers::objects::upload_url,
        handlers::objects::list_objects,
        handlers::objects::download_url,
        handlers::objects::get_metadata,
        handlers::objects::update_metadata,
        handlers::objects::delete_object,
        handlers::multipart::init_multipart,
        handlers::multipart::multipart_urls,
        handlers::uploads::initiate_upload,
        handlers::uploads::get_upload,
        handlers::uploads::confirm_upload,
        handlers::uploads::abort_upload,
        handlers::uploads::renew_upload,
        handlers::uploads::upload_part_urls,
        handlers::health::health_check,
    ),
    components(
        schemas(
            requests::DefinitionSummary,
            requests::ParameterSummary,
            requests::ProviderSummary,
            requests::UploadMetadata,
            requests::UploadUrlRequest,
            requests::UploadUrlResponse,
            requests::MultipartInitRequest,
            requests::MultipartInitResponse,
            requests::MultipartUrlsRequest,
            requests::MultipartUrlsResponse,
            requests::DownloadUrlRequest,
            requests::DownloadUrlResponse,
            requests::ListObjectsRequest,
            requests::ListObjectsResponse,
            requests::DeleteObjectResponse,
            requests::InitiateUploadRequest,
            requests::UploadResponse,
            requests::RenewUploadRequest,
            requests::UploadPartsRequest,
            models::Upload,
            models::UploadConfirmation,
            models::Confirmation,
            models::PartETag,
            models::ObjectMetadata,
            models::MetadataPatch,
            models::ObjectUrl,
            models::PartRequest,
            models::PartUrl,
            models::Capabilities,
            models::ScopeType,
            models::ProviderName,
            handlers::health::HealthResponse,
            error::ErrorResponse,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "definitions", description = "Path definitions and configured providers"),
        (name = "objects", description = "Signed URLs, listing, metadata and deletion for object paths"),
        (name = "multipart", description = "Untracked multipart sessions"),
        (name = "uploads", description = "Tracked uploads and cleanup of replaced objects"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;
