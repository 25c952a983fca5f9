//! Google Cloud Storage adapter.
//!
//! Signed URLs, listing and deletes go through `object_store`'s GCS client,
//! authenticated with a service account. Resumable sessions and object
//! metadata use the JSON API with the same credentials. Large uploads are
//! resumable sessions: the broker opens the session and hands out
//! `Content-Range` chunk requests against the session URI.

use std::collections::BTreeMap;
use std::time::Duration;

use assetgate_core::constants::{GIB, KIB, MAX_URL_EXPIRY_SECS, MIN_URL_EXPIRY_SECS, TIB};
use assetgate_core::models::{
    ListRequest, MetadataPatch, MultipartUrls, ObjectChecksum, ObjectListing, ObjectSummary,
    PartRequest, PartUrl,
};
use assetgate_core::{
    Capabilities, ChecksumAlgorithm, GcsConfig, HttpMethod, MultipartLimits, ObjectMetadata,
    ObjectUrl, Operation, ProviderName,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use http::Method;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{ClientOptions, CredentialProvider, RetryConfig};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::call::{bounded, expiry_from, send_checked};
use crate::keys::{encode_path, encode_query, validate_key};
use crate::traits::{ProviderAdapter, SignRequest, StorageError, StorageResult};

/// Resumable chunks must be multiples of 256 KiB, except the last one
const CHUNK_ALIGNMENT: u64 = 256 * KIB;
const MAX_PARTS: u32 = 10_000;
const CUSTOM_METADATA_PREFIX: &str = "x-goog-meta-";

/// GCS storage adapter
pub struct GcsProvider {
    store: GoogleCloudStorage,
    bucket: String,
    endpoint: String,
    http: reqwest::Client,
    timeout: Duration,
    capabilities: Capabilities,
    public_base_url: Option<String>,
}

/// Object resource of the JSON API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    size: Option<String>,
    content_type: Option<String>,
    content_encoding: Option<String>,
    content_language: Option<String>,
    content_disposition: Option<String>,
    cache_control: Option<String>,
    etag: Option<String>,
    md5_hash: Option<String>,
    crc32c: Option<String>,
    storage_class: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    time_created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
}

impl From<ObjectResource> for ObjectMetadata {
    fn from(resource: ObjectResource) -> Self {
        let mut checksums = Vec::new();
        if let Some(value) = resource.md5_hash {
            checksums.push(ObjectChecksum {
                algorithm: ChecksumAlgorithm::Md5,
                value,
            });
        }
        if let Some(value) = resource.crc32c {
            checksums.push(ObjectChecksum {
                algorithm: ChecksumAlgorithm::Crc32c,
                value,
            });
        }

        ObjectMetadata {
            key: resource.name,
            size: resource
                .size
                .and_then(|size| size.parse().ok())
                .unwrap_or(0),
            content_type: resource.content_type,
            content_encoding: resource.content_encoding,
            content_language: resource.content_language,
            content_disposition: resource.content_disposition,
            cache_control: resource.cache_control,
            etag: resource.etag,
            checksums,
            storage_class: resource.storage_class,
            acl: None,
            custom_metadata: resource.metadata,
            created_at: resource.time_created,
            last_modified: resource.updated,
            expires_at: None,
        }
    }
}

impl GcsProvider {
    pub fn new(config: &GcsConfig, http: reqwest::Client, timeout: Duration) -> StorageResult<Self> {
        let builder = GoogleCloudStorageBuilder::new()
            .with_service_account_path(config.service_account_path.clone());
        let provider = Self::with_builder(builder, config, http, timeout)?;

        tracing::info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "GCS provider configured"
        );
        Ok(provider)
    }

    fn with_builder(
        builder: GoogleCloudStorageBuilder,
        config: &GcsConfig,
        http: reqwest::Client,
        timeout: Duration,
    ) -> StorageResult<Self> {
        // Retries happen in the services layer, only for idempotent reads
        let store = builder
            .with_bucket_name(config.bucket.clone())
            .with_client_options(ClientOptions::new().with_timeout(timeout))
            .with_retry(RetryConfig {
                max_retries: 0,
                ..Default::default()
            })
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http,
            timeout,
            capabilities: Self::default_capabilities(),
            public_base_url: config.public_base_url.clone(),
        })
    }

    pub fn default_capabilities() -> Capabilities {
        Capabilities::new()
            .with_read()
            .with_write()
            .with_delete()
            .with_list()
            .with_metadata()
            .with_signed_urls()
            .with_resumable_uploads()
            .with_multipart(
                MultipartLimits::new(CHUNK_ALIGNMENT, 5 * GIB, MAX_PARTS)
                    .with_part_alignment(CHUNK_ALIGNMENT),
            )
            .with_checksums(&[ChecksumAlgorithm::Md5])
            .with_max_single_upload_size(5 * TIB)
            .with_url_expiry(MIN_URL_EXPIRY_SECS, MAX_URL_EXPIRY_SECS)
    }

    fn object_resource_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            encode_query(&self.bucket),
            encode_query(path)
        )
    }

    fn session_uri(&self, session_id: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=resumable&upload_id={}",
            self.endpoint,
            encode_query(&self.bucket),
            encode_query(session_id)
        )
    }

    /// Attach the service account's bearer token. Emulators run without one.
    async fn authorize(&self, request: reqwest::RequestBuilder) -> StorageResult<reqwest::RequestBuilder> {
        let credential = self
            .store
            .credentials()
            .get_credential()
            .await
            .map_err(|e| object_store_error("get_credential", "", e))?;
        if credential.bearer.is_empty() {
            Ok(request)
        } else {
            Ok(request.bearer_auth(&credential.bearer))
        }
    }

    async fn fetch_metadata(&self, path: &str) -> StorageResult<ObjectMetadata> {
        bounded(ProviderName::Gcs, "get_object", path, self.timeout, async {
            let request = self.authorize(self.http.get(self.object_resource_url(path))).await?;
            let response = send_checked(ProviderName::Gcs, "get_object", path, request).await?;
            let resource: ObjectResource = response.json().await.map_err(|e| {
                StorageError::provider_call(ProviderName::Gcs, format!("invalid object resource: {}", e))
            })?;
            Ok(resource.into())
        })
        .await
    }
}

fn object_path(path: &str) -> StorageResult<Path> {
    Path::parse(path).map_err(|e| StorageError::InvalidKey(e.to_string()))
}

fn method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Post => Method::POST,
        HttpMethod::Delete => Method::DELETE,
    }
}

/// Map an `object_store` failure; statuses are kept where the error kind implies one.
fn object_store_error(operation: &str, key: &str, err: object_store::Error) -> StorageError {
    let message = format!("{} failed: {}", operation, err);
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound(key.to_string()),
        object_store::Error::Unauthenticated { .. } => {
            StorageError::provider_status(ProviderName::Gcs, 401, message)
        }
        object_store::Error::PermissionDenied { .. } => {
            StorageError::provider_status(ProviderName::Gcs, 403, message)
        }
        object_store::Error::AlreadyExists { .. } => {
            StorageError::provider_status(ProviderName::Gcs, 409, message)
        }
        object_store::Error::Precondition { .. } => {
            StorageError::provider_status(ProviderName::Gcs, 412, message)
        }
        _ => StorageError::provider_call(ProviderName::Gcs, message),
    }
}

/// JSON API body describing the object a resumable session will create.
fn session_resource(path: &str, headers: &BTreeMap<String, String>) -> Value {
    let mut resource = Map::new();
    resource.insert("name".to_string(), Value::String(path.to_string()));
    let mut metadata = Map::new();
    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        let field = match name.as_str() {
            "content-type" => "contentType",
            "content-encoding" => "contentEncoding",
            "content-language" => "contentLanguage",
            "content-disposition" => "contentDisposition",
            "cache-control" => "cacheControl",
            other => {
                if let Some(key) = other.strip_prefix(CUSTOM_METADATA_PREFIX) {
                    metadata.insert(key.to_string(), Value::String(value.clone()));
                }
                continue;
            }
        };
        resource.insert(field.to_string(), Value::String(value.clone()));
    }
    if !metadata.is_empty() {
        resource.insert("metadata".to_string(), Value::Object(metadata));
    }
    Value::Object(resource)
}

/// JSON API patch body. Custom metadata is replaced, so keys missing from
/// the merged set are cleared with `null`.
fn metadata_patch_body(current: &ObjectMetadata, merged: &ObjectMetadata) -> Value {
    let mut metadata = Map::new();
    for key in current.custom_metadata.keys() {
        if !merged.custom_metadata.contains_key(key) {
            metadata.insert(key.clone(), Value::Null);
        }
    }
    for (key, value) in &merged.custom_metadata {
        metadata.insert(key.clone(), Value::String(value.clone()));
    }

    json!({
        "contentType": merged.content_type,
        "contentEncoding": merged.content_encoding,
        "contentLanguage": merged.content_language,
        "contentDisposition": merged.content_disposition,
        "cacheControl": merged.cache_control,
        "metadata": metadata,
    })
}

/// Byte ranges of a resumable upload, one per part.
///
/// Every part needs a declared size and parts must be numbered 1..=n in
/// order, since chunks of a session are written sequentially.
fn chunk_ranges(parts: &[PartRequest]) -> StorageResult<(Vec<(u64, u64)>, u64)> {
    let mut ranges = Vec::with_capacity(parts.len());
    let mut offset = 0u64;
    for (index, part) in parts.iter().enumerate() {
        let expected = index as u32 + 1;
        if part.part_number != expected {
            return Err(StorageError::invalid_request(
                "partNumber",
                format!(
                    "resumable chunks must be numbered consecutively from 1; expected {}, got {}",
                    expected, part.part_number
                ),
            ));
        }
        let size = match part.size {
            Some(size) if size > 0 => size,
            _ => {
                return Err(StorageError::invalid_request(
                    "size",
                    format!("part {} needs a declared size for resumable uploads", part.part_number),
                ))
            }
        };
        ranges.push((offset, offset + size - 1));
        offset += size;
    }
    Ok((ranges, offset))
}

/// `upload_id` query parameter of a resumable session `Location` header
fn session_id_from_location(location: &str) -> Option<String> {
    let url = reqwest::Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == "upload_id")
        .map(|(_, value)| value.into_owned())
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl ProviderAdapter for GcsProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Gcs
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn public_url(&self, path: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, encode_path(path)))
    }

    /// The signature covers the host only; requested headers and the MD5
    /// checksum are returned for the client to send alongside.
    async fn sign_url(&self, path: &str, request: &SignRequest) -> StorageResult<ObjectUrl> {
        validate_key(path)?;
        self.check_sign_request(request)?;

        let location = object_path(path)?;
        let url = self
            .store
            .signed_url(method(request.method), &location, request.expires_in)
            .await
            .map_err(|e| object_store_error("sign_url", path, e))?;

        let mut headers = request.headers.clone();
        if let Some(md5) = request.checksums.get(&ChecksumAlgorithm::Md5) {
            headers.insert("content-md5".to_string(), md5.clone());
        }

        Ok(ObjectUrl::new(url.to_string(), request.method)
            .with_headers(headers)
            .expiring_at(expiry_from(Utc::now(), request.expires_in)))
    }

    /// Open a resumable session and return its id.
    async fn create_multipart_upload(
        &self,
        path: &str,
        headers: &BTreeMap<String, String>,
    ) -> StorageResult<String> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;

        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=resumable&name={}",
            self.endpoint,
            encode_query(&self.bucket),
            encode_query(path)
        );
        let body = session_resource(path, headers);

        let session_id = bounded(
            ProviderName::Gcs,
            "create_resumable_session",
            path,
            self.timeout,
            async {
                let mut request = self.http.post(&url).json(&body);
                if let Some(content_type) = body.get("contentType").and_then(Value::as_str) {
                    request = request.header("X-Upload-Content-Type", content_type);
                }
                let request = self.authorize(request).await?;
                let response =
                    send_checked(ProviderName::Gcs, "create_resumable_session", path, request)
                        .await?;

                response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(session_id_from_location)
                    .ok_or_else(|| {
                        StorageError::provider_call(
                            ProviderName::Gcs,
                            "resumable session response has no upload_id in Location",
                        )
                    })
            },
        )
        .await?;

        tracing::info!(key = %path, "GCS resumable session created");
        Ok(session_id)
    }

    async fn part_urls(
        &self,
        path: &str,
        provider_upload_id: &str,
        parts: &[PartRequest],
        expires_in: Duration,
    ) -> StorageResult<MultipartUrls> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;
        if provider_upload_id.trim().is_empty() {
            return Err(StorageError::invalid_request("uploadId", "must not be empty"));
        }

        let (ranges, total) = chunk_ranges(parts)?;
        let session = self.session_uri(provider_upload_id);
        let expires_at = expiry_from(Utc::now(), expires_in);
        let last = ranges.len().saturating_sub(1);

        let part_urls = parts
            .iter()
            .zip(ranges)
            .enumerate()
            .map(|(index, (part, (start, end)))| {
                let total_marker = if index == last {
                    total.to_string()
                } else {
                    "*".to_string()
                };
                let mut headers = BTreeMap::from([(
                    "content-range".to_string(),
                    format!("bytes {}-{}/{}", start, end, total_marker),
                )]);
                if let Some(checksum) = &part.checksum {
                    headers.insert("content-md5".to_string(), checksum.clone());
                }
                PartUrl {
                    part_number: part.part_number,
                    url: session.clone(),
                    method: HttpMethod::Put,
                    headers,
                }
            })
            .collect();

        let complete = ObjectUrl::new(session.clone(), HttpMethod::Put)
            .with_header("content-range", format!("bytes */{}", total))
            .expiring_at(expires_at);
        let abort = ObjectUrl::new(session, HttpMethod::Delete).expiring_at(expires_at);

        Ok(MultipartUrls {
            parts: part_urls,
            complete,
            abort,
        })
    }

    async fn abort_multipart_upload(
        &self,
        path: &str,
        provider_upload_id: &str,
    ) -> StorageResult<()> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;

        let session = self.session_uri(provider_upload_id);
        let status = bounded(
            ProviderName::Gcs,
            "cancel_resumable_session",
            path,
            self.timeout,
            async {
                let response = self.http.delete(&session).send().await.map_err(|e| {
                    StorageError::provider_call(
                        ProviderName::Gcs,
                        format!("cancel_resumable_session failed: {}", e),
                    )
                })?;
                Ok(response.status().as_u16())
            },
        )
        .await?;

        // A cancelled session answers 499
        match status {
            200..=299 | 404 | 499 => Ok(()),
            status => Err(StorageError::provider_status(
                ProviderName::Gcs,
                status,
                format!("cancel_resumable_session returned {}", status),
            )),
        }
    }

    async fn list_objects(&self, request: &ListRequest) -> StorageResult<ObjectListing> {
        use object_store::ObjectStore as _;

        self.require(Operation::List)?;

        // object_store lists whole directories; narrow to the string prefix
        let directory = match request.prefix.rfind('/') {
            Some(index) => Some(object_path(&request.prefix[..index])?),
            None => None,
        };
        let wanted = request.max_keys as usize;

        bounded(
            ProviderName::Gcs,
            "list_objects",
            &request.prefix,
            self.timeout,
            async {
                let mut stream = match &request.continuation_token {
                    Some(token) => self
                        .store
                        .list_with_offset(directory.as_ref(), &object_path(token)?),
                    None => self.store.list(directory.as_ref()),
                };

                let mut objects = Vec::new();
                let mut is_truncated = false;
                while let Some(item) = stream.next().await {
                    let meta = item.map_err(|e| object_store_error("list_objects", &request.prefix, e))?;
                    let key = meta.location.to_string();
                    if !key.starts_with(&request.prefix) {
                        continue;
                    }
                    if objects.len() == wanted {
                        is_truncated = true;
                        break;
                    }
                    objects.push(ObjectSummary {
                        key,
                        size: meta.size as u64,
                        etag: meta.e_tag,
                        last_modified: Some(meta.last_modified),
                        storage_class: None,
                    });
                }

                let next_token = if is_truncated {
                    objects.last().map(|o: &ObjectSummary| o.key.clone())
                } else {
                    None
                };
                Ok(ObjectListing {
                    objects,
                    next_token,
                    is_truncated,
                })
            },
        )
        .await
    }

    async fn get_metadata(&self, path: &str) -> StorageResult<ObjectMetadata> {
        validate_key(path)?;
        self.require(Operation::Metadata)?;
        self.fetch_metadata(path).await
    }

    async fn update_metadata(
        &self,
        path: &str,
        patch: &MetadataPatch,
    ) -> StorageResult<ObjectMetadata> {
        validate_key(path)?;
        self.require(Operation::Metadata)?;

        let current = self.fetch_metadata(path).await?;
        let mut merged = current.clone();
        patch.apply_to(&mut merged);
        let body = metadata_patch_body(&current, &merged);

        bounded(ProviderName::Gcs, "patch_object", path, self.timeout, async {
            let request = self
                .authorize(self.http.patch(self.object_resource_url(path)).json(&body))
                .await?;
            let response = send_checked(ProviderName::Gcs, "patch_object", path, request).await?;
            let resource: ObjectResource = response.json().await.map_err(|e| {
                StorageError::provider_call(ProviderName::Gcs, format!("invalid object resource: {}", e))
            })?;
            Ok(resource.into())
        })
        .await
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        use object_store::ObjectStoreExt as _;

        validate_key(path)?;
        self.require(Operation::Delete)?;

        let location = object_path(path)?;
        bounded(ProviderName::Gcs, "delete_object", path, self.timeout, async {
            self.store
                .delete(&location)
                .await
                .map_err(|e| object_store_error("delete_object", path, e))
        })
        .await?;

        tracing::info!(key = %path, "GCS object deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::models::ResponseOverrides;
    use assetgate_core::{AppError, ErrorMetadata};
    use mockito::{Matcher, Server};

    fn config(endpoint: &str) -> GcsConfig {
        GcsConfig {
            bucket: "game-assets".to_string(),
            service_account_path: "unused.json".to_string(),
            endpoint: endpoint.to_string(),
            public_base_url: None,
        }
    }

    /// Provider talking to a local emulator without OAuth.
    fn provider_at(endpoint: &str) -> GcsProvider {
        let key = json!({
            "private_key": "",
            "private_key_id": "",
            "client_email": "",
            "disable_oauth": true,
            "gcs_base_url": endpoint,
        })
        .to_string();
        let builder = GoogleCloudStorageBuilder::new().with_service_account_key(key);
        GcsProvider::with_builder(
            builder,
            &config(endpoint),
            reqwest::Client::new(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn provider() -> GcsProvider {
        provider_at("https://storage.googleapis.com")
    }

    #[tokio::test]
    async fn rejects_unsupported_checksum_and_overrides() {
        let request = SignRequest::new(HttpMethod::Put, Duration::from_secs(900)).with_checksums(
            BTreeMap::from([(
                ChecksumAlgorithm::Sha256,
                "n4bQgYhMfWWaL+qgxVrQFaO/TxsrC4Is0V1sFbDwCgg=".to_string(),
            )]),
        );
        assert!(matches!(
            provider().sign_url("dev/a.png", &request).await,
            Err(StorageError::InvalidRequest { .. })
        ));

        let request = SignRequest::new(HttpMethod::Get, Duration::from_secs(900))
            .with_response_overrides(ResponseOverrides {
                content_type: Some("image/png".to_string()),
                ..Default::default()
            });
        assert!(matches!(
            provider().sign_url("dev/a.png", &request).await,
            Err(StorageError::Unsupported {
                operation: Operation::ResponseOverrides,
                ..
            })
        ));
        assert_eq!(provider().public_url("dev/a.png"), None);
    }

    #[tokio::test]
    async fn resumable_chunks_carry_content_ranges() {
        let chunk = CHUNK_ALIGNMENT * 4;
        let parts = vec![
            PartRequest::new(1).with_size(chunk),
            PartRequest::new(2).with_size(chunk),
            PartRequest::new(3).with_size(1000),
        ];
        let urls = provider()
            .part_urls("builds/game.zip", "session-1", &parts, Duration::from_secs(3600))
            .await
            .unwrap();

        let total = chunk * 2 + 1000;
        assert_eq!(
            urls.parts[0].headers["content-range"],
            format!("bytes 0-{}/*", chunk - 1)
        );
        assert_eq!(
            urls.parts[2].headers["content-range"],
            format!("bytes {}-{}/{}", chunk * 2, total - 1, total)
        );
        assert!(urls.parts[0]
            .url
            .ends_with("/upload/storage/v1/b/game-assets/o?uploadType=resumable&upload_id=session-1"));
        assert_eq!(urls.complete.headers["content-range"], format!("bytes */{}", total));
        assert_eq!(urls.abort.method, HttpMethod::Delete);
    }

    #[test]
    fn chunks_must_be_sized_and_consecutive() {
        assert!(chunk_ranges(&[PartRequest::new(1)]).is_err());
        assert!(chunk_ranges(&[PartRequest::new(2).with_size(10)]).is_err());
        let (ranges, total) = chunk_ranges(&[
            PartRequest::new(1).with_size(10),
            PartRequest::new(2).with_size(5),
        ])
        .unwrap();
        assert_eq!(ranges, vec![(0, 9), (10, 14)]);
        assert_eq!(total, 15);
    }

    #[test]
    fn extracts_session_id_from_location() {
        let location = "https://storage.googleapis.com/upload/storage/v1/b/game-assets/o?uploadType=resumable&upload_id=ADPycdtb-x2";
        assert_eq!(session_id_from_location(location).as_deref(), Some("ADPycdtb-x2"));
        assert_eq!(session_id_from_location("https://example.com/a"), None);
    }

    #[test]
    fn patch_body_clears_dropped_metadata() {
        let current = ObjectMetadata {
            custom_metadata: BTreeMap::from([
                ("build".to_string(), "41".to_string()),
                ("owner".to_string(), "studio".to_string()),
            ]),
            ..Default::default()
        };
        let merged = ObjectMetadata {
            content_type: Some("application/zip".to_string()),
            custom_metadata: BTreeMap::from([("build".to_string(), "42".to_string())]),
            ..Default::default()
        };
        let body = metadata_patch_body(&current, &merged);
        assert_eq!(body["contentType"], "application/zip");
        assert_eq!(body["metadata"]["build"], "42");
        assert!(body["metadata"]["owner"].is_null());
    }

    #[tokio::test]
    async fn resumable_session_id_comes_from_location() {
        let mut server = Server::new_async().await;
        let location = format!(
            "{}/upload/storage/v1/b/game-assets/o?uploadType=resumable&upload_id=ADPy-42",
            server.url()
        );
        let init = server
            .mock(
                "POST",
                Matcher::Regex(r"^/upload/storage/v1/b/game-assets/o".to_string()),
            )
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".to_string(), "resumable".to_string()),
                Matcher::UrlEncoded("name".to_string(), "builds/game.zip".to_string()),
            ]))
            .match_header("x-upload-content-type", "application/zip")
            .with_status(200)
            .with_header("location", &location)
            .create_async()
            .await;

        let gcs = provider_at(&server.url());
        let headers = BTreeMap::from([(
            "content-type".to_string(),
            "application/zip".to_string(),
        )]);
        let session = gcs
            .create_multipart_upload("builds/game.zip", &headers)
            .await
            .unwrap();
        assert_eq!(session, "ADPy-42");
        init.assert_async().await;
    }

    #[tokio::test]
    async fn session_without_location_is_a_provider_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .create_async()
            .await;

        let gcs = provider_at(&server.url());
        let err = gcs
            .create_multipart_upload("a.zip", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ProviderCall { status: None, .. }));
    }

    #[tokio::test]
    async fn cancelled_session_counts_as_aborted() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", Matcher::Regex(r"^/upload/storage/v1/b/game-assets/o".to_string()))
            .with_status(499)
            .create_async()
            .await;

        let gcs = provider_at(&server.url());
        assert!(gcs.abort_multipart_upload("a.zip", "ADPy-1").await.is_ok());
    }

    #[tokio::test]
    async fn metadata_reads_the_object_resource() {
        let mut server = Server::new_async().await;
        server
            .mock(
                "GET",
                Matcher::Regex(r"^/storage/v1/b/game-assets/o/dev%2Fa\.png".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "name": "dev/a.png",
                    "size": "2048",
                    "contentType": "image/png",
                    "etag": "CKih16GjycICEAE=",
                    "md5Hash": "Ojk9c3dhfxgoKVVHYwFbHQ==",
                    "crc32c": "n03x6A==",
                    "storageClass": "STANDARD",
                    "metadata": { "build": "42" },
                    "updated": "2024-01-01T00:00:00.000Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let gcs = provider_at(&server.url());
        let metadata = gcs.get_metadata("dev/a.png").await.unwrap();
        assert_eq!(metadata.size, 2048);
        assert_eq!(metadata.content_type.as_deref(), Some("image/png"));
        assert_eq!(metadata.custom_metadata["build"], "42");
        let algorithms: Vec<_> = metadata.checksums.iter().map(|c| c.algorithm).collect();
        assert_eq!(algorithms, vec![ChecksumAlgorithm::Md5, ChecksumAlgorithm::Crc32c]);
        assert!(metadata.last_modified.is_some());
    }

    #[tokio::test]
    async fn metadata_maps_response_statuses() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", Matcher::Regex(r"/o/missing\.png$".to_string()))
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"/o/locked\.png$".to_string()))
            .with_status(403)
            .with_body("{\"error\":{\"code\":403,\"message\":\"forbidden\"}}")
            .create_async()
            .await;
        server
            .mock("GET", Matcher::Regex(r"/o/busy\.png$".to_string()))
            .with_status(503)
            .create_async()
            .await;

        let gcs = provider_at(&server.url());
        assert!(matches!(
            gcs.get_metadata("missing.png").await,
            Err(StorageError::NotFound(_))
        ));

        let locked = gcs.get_metadata("locked.png").await.unwrap_err();
        assert!(matches!(
            locked,
            StorageError::ProviderCall {
                status: Some(403),
                ..
            }
        ));
        assert!(!locked.is_retryable());
        assert_eq!(AppError::from(locked).http_status_code(), 502);

        let busy = gcs.get_metadata("busy.png").await.unwrap_err();
        assert!(busy.is_retryable());
    }
}
