//! Request and response bodies of the HTTP surface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::{
    Capabilities, ChecksumAlgorithm, HttpMethod, ObjectSummary, ObjectUrl, PartRequest, PartUrl,
    ProviderName, ResourceRef, ResponseOverrides, ScopeType, ScopeValue, Upload, UploadType,
};

/// Upload-time metadata a client may declare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    #[validate(length(min = 1, max = 255, message = "Content type must be between 1 and 255 characters"))]
    pub content_type: Option<String>,
    /// Declared object size in bytes
    pub content_length: Option<u64>,
    /// Checksums keyed by algorithm, encoded the way the provider expects (base64)
    #[serde(default)]
    pub checksums: BTreeMap<ChecksumAlgorithm, String>,
    /// Extra headers to sign into the upload URL
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Body of `POST /resources/{provider}/{definition}/upload`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub scope: ScopeType,
    pub scope_value: Option<ScopeValue>,
    /// Signed URL lifetime in seconds
    #[validate(range(min = 1, max = 604800, message = "Expiry must be between 1 second and 7 days"))]
    pub expiry: Option<u64>,
    #[validate(nested)]
    pub metadata: Option<UploadMetadata>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlResponse {
    pub url: String,
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub resolved_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

/// Body of `POST /resources/multipart/init`
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInitRequest {
    #[validate(length(min = 1, max = 128, message = "Definition name must be between 1 and 128 characters"))]
    pub definition_name: String,
    pub provider: String,
    #[serde(default)]
    pub scope: ScopeType,
    pub scope_value: Option<ScopeValue>,
    #[serde(default, rename = "paramResolver", alias = "parameters")]
    pub parameters: BTreeMap<String, String>,
    #[validate(nested)]
    pub metadata: Option<UploadMetadata>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartInitResponse {
    pub upload_id: String,
    pub path: String,
    pub provider: ProviderName,
    pub min_part_size: u64,
    pub max_part_size: u64,
    pub max_parts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_alignment: Option<u64>,
}

/// Body of `POST /resources/multipart/urls`
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUrlsRequest {
    #[validate(length(min = 1, max = 1024, message = "Path must be between 1 and 1024 characters"))]
    pub path: String,
    #[validate(length(min = 1, message = "Upload id is required"))]
    pub upload_id: String,
    pub provider: String,
    #[validate(length(max = 10000, message = "Too many parts in one request"))]
    pub url_options: Vec<PartRequest>,
    #[validate(range(min = 1, max = 604800, message = "Expiry must be between 1 second and 7 days"))]
    pub expiry: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUrlsResponse {
    pub part_urls: Vec<PartUrl>,
    pub complete_url: ObjectUrl,
    pub abort_url: ObjectUrl,
}

/// Body of `POST /resources/{provider}/{path}/download`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlRequest {
    #[validate(range(min = 1, max = 604800, message = "Expiry must be between 1 second and 7 days"))]
    pub expiry: Option<u64>,
    #[serde(default)]
    pub response_headers: Option<ResponseOverrides>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrlResponse {
    pub url: String,
    pub method: HttpMethod,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// Body of `POST /resources/{provider}/{definition}/list`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsRequest {
    #[serde(default)]
    pub scope: ScopeType,
    pub scope_value: Option<ScopeValue>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[validate(range(min = 1, max = 1000, message = "maxKeys must be between 1 and 1000"))]
    pub max_keys: Option<u32>,
    pub continuation_token: Option<String>,
    /// Narrows the listing below the definition's prefix
    #[validate(length(max = 512, message = "Prefix must be at most 512 characters"))]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsResponse {
    pub prefix: String,
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteObjectResponse {
    pub deleted: bool,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSummary {
    pub name: String,
    pub description: String,
    pub default: Option<String>,
    pub required: bool,
    pub rules: Vec<String>,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub allowed_scopes: Vec<ScopeType>,
    /// Parameters of the whole ancestor chain, root first
    pub parameters: Vec<ParameterSummary>,
    pub providers: Vec<ProviderName>,
    /// Pattern strings keyed by provider, then scope code
    pub patterns: BTreeMap<ProviderName, BTreeMap<ScopeType, String>>,
    pub parent: Option<String>,
    pub child: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderSummary {
    pub name: ProviderName,
    pub capabilities: Capabilities,
}

/// Body of `POST /resources/uploads`
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadRequest {
    #[validate(length(min = 1, max = 128, message = "Definition name must be between 1 and 128 characters"))]
    pub definition_name: String,
    pub provider: String,
    #[serde(default)]
    pub scope: ScopeType,
    pub scope_value: Option<ScopeValue>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub upload_type: UploadType,
    #[validate(nested)]
    pub resource: ResourceRef,
    /// Path the new object replaces; deleted once the upload is confirmed
    #[validate(length(min = 1, max = 1024, message = "Previous path must be between 1 and 1024 characters"))]
    pub previous_path: Option<String>,
    #[validate(range(min = 1, max = 604800, message = "Expiry must be between 1 second and 7 days"))]
    pub expiry: Option<u64>,
    #[validate(nested)]
    pub metadata: Option<UploadMetadata>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResponse {
    pub upload: Upload,
    /// Signed write URL for simple uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<ObjectUrl>,
}

/// Body of `POST /resources/uploads/{id}/renew`
#[derive(Debug, Clone, Default, Deserialize, ToSchema, Validate)]
pub struct RenewUploadRequest {
    #[validate(range(min = 1, max = 604800, message = "Expiry must be between 1 second and 7 days"))]
    pub expiry: Option<u64>,
    /// Upload metadata to sign into the new URL; the original is not kept
    #[validate(nested)]
    pub metadata: Option<UploadMetadata>,
}

/// Body of `POST /resources/uploads/{id}/parts`
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct UploadPartsRequest {
    #[validate(length(max = 10000, message = "Too many parts in one request"))]
    pub parts: Vec<PartRequest>,
    #[validate(range(min = 1, max = 604800, message = "Expiry must be between 1 second and 7 days"))]
    pub expiry: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_init_accepts_param_resolver_field() {
        let body = r#"{
            "definitionName": "game_build",
            "provider": "r2",
            "scope": "A",
            "scopeValue": 7,
            "paramResolver": {"version": "1.2.3"}
        }"#;
        let request: MultipartInitRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.scope, ScopeType::App);
        assert_eq!(request.parameters["version"], "1.2.3");
    }

    #[test]
    fn upload_request_defaults_to_global_scope() {
        let request: UploadUrlRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.scope, ScopeType::Global);
        assert!(request.parameters.is_empty());
    }

    #[test]
    fn upload_request_rejects_excessive_expiry() {
        let request = UploadUrlRequest {
            expiry: Some(604801),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }
}
