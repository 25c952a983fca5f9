//! Cloudflare R2 adapter.
//!
//! R2 speaks the S3 API, so presigned URLs (single requests, multipart parts,
//! complete and abort) and the broker's own calls all go through
//! `aws_sdk_s3` against the account endpoint with path-style addressing.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use assetgate_core::constants::{GIB, MAX_URL_EXPIRY_SECS, MIB, MIN_URL_EXPIRY_SECS};
use assetgate_core::models::{
    ListRequest, MetadataPatch, MultipartUrls, ObjectChecksum, ObjectListing, ObjectSummary,
    PartRequest, PartUrl,
};
use assetgate_core::{
    Capabilities, ChecksumAlgorithm, HttpMethod, MultipartLimits, ObjectMetadata, ObjectUrl,
    Operation, ProviderName, R2Config,
};
use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpRequest;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::{PresignedRequest, PresigningConfig};
use aws_sdk_s3::types::{ChecksumMode, MetadataDirective};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use crate::call::{bounded, check_headers, expiry_from};
use crate::keys::{encode_path, validate_key};
use crate::traits::{ProviderAdapter, SignRequest, StorageError, StorageResult};

const MAX_PARTS: u32 = 10_000;

/// R2 storage adapter
pub struct R2Provider {
    client: Client,
    bucket: String,
    capabilities: Capabilities,
    public_base_url: Option<String>,
    timeout: Duration,
}

impl R2Provider {
    pub fn new(config: &R2Config, timeout: Duration) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "assetgate",
        );

        // Retries happen in the services layer, only for idempotent reads
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("auto"))
            .endpoint_url(config.endpoint.clone())
            .credentials_provider(credentials)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .build();

        tracing::info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint,
            "R2 provider configured"
        );

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            capabilities: Self::default_capabilities(),
            public_base_url: config.public_base_url.clone(),
            timeout,
        }
    }

    pub fn default_capabilities() -> Capabilities {
        Capabilities::new()
            .with_read()
            .with_write()
            .with_delete()
            .with_list()
            .with_metadata()
            .with_signed_urls()
            .with_response_overrides()
            .with_multipart(MultipartLimits::new(5 * MIB, 5 * GIB, MAX_PARTS))
            .with_checksums(&[
                ChecksumAlgorithm::Md5,
                ChecksumAlgorithm::Crc32,
                ChecksumAlgorithm::Crc32c,
                ChecksumAlgorithm::Sha1,
                ChecksumAlgorithm::Sha256,
            ])
            .with_max_single_upload_size(5 * GIB)
            .with_url_expiry(MIN_URL_EXPIRY_SECS, MAX_URL_EXPIRY_SECS)
    }

    async fn head(&self, path: &str) -> StorageResult<ObjectMetadata> {
        bounded(ProviderName::R2, "head_object", path, self.timeout, async {
            let output = self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(path)
                .checksum_mode(ChecksumMode::Enabled)
                .send()
                .await
                .map_err(|e| sdk_error("head_object", path, e))?;

            let mut checksums = Vec::new();
            for (algorithm, value) in [
                (ChecksumAlgorithm::Crc32, output.checksum_crc32()),
                (ChecksumAlgorithm::Crc32c, output.checksum_crc32_c()),
                (ChecksumAlgorithm::Sha1, output.checksum_sha1()),
                (ChecksumAlgorithm::Sha256, output.checksum_sha256()),
            ] {
                if let Some(value) = value {
                    checksums.push(ObjectChecksum {
                        algorithm,
                        value: value.to_string(),
                    });
                }
            }

            Ok(ObjectMetadata {
                key: path.to_string(),
                size: output.content_length().unwrap_or(0).max(0) as u64,
                content_type: output.content_type().map(str::to_string),
                content_encoding: output.content_encoding().map(str::to_string),
                content_language: output.content_language().map(str::to_string),
                content_disposition: output.content_disposition().map(str::to_string),
                cache_control: output.cache_control().map(str::to_string),
                etag: output.e_tag().map(unquote_etag),
                checksums,
                storage_class: output.storage_class().map(|c| c.as_str().to_string()),
                acl: None,
                custom_metadata: output
                    .metadata()
                    .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default(),
                created_at: None,
                last_modified: output.last_modified().and_then(to_chrono),
                expires_at: None,
            })
        })
        .await
    }
}

/// S3 header carrying a client-declared checksum
fn checksum_header(algorithm: ChecksumAlgorithm) -> String {
    match algorithm {
        ChecksumAlgorithm::Md5 => "content-md5".to_string(),
        other => format!("x-amz-checksum-{}", other.as_str()),
    }
}

fn unquote_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn to_chrono(time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

fn presigning(expires_in: Duration) -> StorageResult<PresigningConfig> {
    PresigningConfig::expires_in(expires_in).map_err(|e| StorageError::Signing(e.to_string()))
}

/// Sign `headers` into the request so the client must send them verbatim.
fn add_headers(headers: BTreeMap<String, String>) -> impl Fn(&mut HttpRequest) + Send + Sync + 'static {
    move |request: &mut HttpRequest| {
        for (name, value) in &headers {
            // Names and values are checked before presigning
            let _ = request.headers_mut().try_insert(name.clone(), value.clone());
        }
    }
}

fn presigned_url(request: PresignedRequest, method: HttpMethod, expires_in: Duration) -> ObjectUrl {
    let headers = request
        .headers()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_string()))
        .collect();
    ObjectUrl::new(request.uri().to_string(), method)
        .with_headers(headers)
        .expiring_at(expiry_from(Utc::now(), expires_in))
}

fn presign_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::Signing(DisplayErrorContext(&err).to_string())
}

/// Map an SDK failure: deadline to `Timeout`, 404 to `NotFound`, other
/// responses keep their status, and no response at all is a transport error.
fn sdk_error<E>(operation: &str, key: &str, err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let SdkError::TimeoutError(_) = err {
        return StorageError::Timeout {
            provider: ProviderName::R2,
            operation: operation.to_string(),
        };
    }
    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));
    match err.raw_response().map(|response| response.status().as_u16()) {
        Some(404) => StorageError::NotFound(key.to_string()),
        Some(status) => StorageError::provider_status(ProviderName::R2, status, message),
        None => StorageError::provider_call(ProviderName::R2, message),
    }
}

#[async_trait]
impl ProviderAdapter for R2Provider {
    fn name(&self) -> ProviderName {
        ProviderName::R2
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn public_url(&self, path: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, encode_path(path)))
    }

    async fn sign_url(&self, path: &str, request: &SignRequest) -> StorageResult<ObjectUrl> {
        validate_key(path)?;
        self.check_sign_request(request)?;

        let mut headers = request.headers.clone();
        for (algorithm, value) in &request.checksums {
            headers.insert(checksum_header(*algorithm), value.clone());
        }
        check_headers(&headers)?;

        let config = presigning(request.expires_in)?;
        let overrides = &request.response_overrides;
        let presigned = match request.method {
            HttpMethod::Get => self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(path)
                .set_response_content_type(overrides.content_type.clone())
                .set_response_content_disposition(overrides.content_disposition.clone())
                .set_response_cache_control(overrides.cache_control.clone())
                .set_response_content_language(overrides.content_language.clone())
                .set_response_content_encoding(overrides.content_encoding.clone())
                .customize()
                .mutate_request(add_headers(headers))
                .presigned(config)
                .await
                .map_err(presign_error)?,
            HttpMethod::Head => self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(path)
                .set_response_content_type(overrides.content_type.clone())
                .set_response_content_disposition(overrides.content_disposition.clone())
                .set_response_cache_control(overrides.cache_control.clone())
                .set_response_content_language(overrides.content_language.clone())
                .set_response_content_encoding(overrides.content_encoding.clone())
                .customize()
                .mutate_request(add_headers(headers))
                .presigned(config)
                .await
                .map_err(presign_error)?,
            HttpMethod::Put => self
                .client
                .put_object()
                .bucket(&self.bucket)
                .key(path)
                .customize()
                .mutate_request(add_headers(headers))
                .presigned(config)
                .await
                .map_err(presign_error)?,
            HttpMethod::Delete => self
                .client
                .delete_object()
                .bucket(&self.bucket)
                .key(path)
                .customize()
                .mutate_request(add_headers(headers))
                .presigned(config)
                .await
                .map_err(presign_error)?,
            HttpMethod::Post => {
                return Err(StorageError::invalid_request(
                    "method",
                    "R2 has no single-request POST upload; use a multipart session",
                ))
            }
        };

        Ok(presigned_url(presigned, request.method, request.expires_in))
    }

    async fn create_multipart_upload(
        &self,
        path: &str,
        headers: &BTreeMap<String, String>,
    ) -> StorageResult<String> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;
        check_headers(headers)?;

        let upload_id = bounded(
            ProviderName::R2,
            "create_multipart_upload",
            path,
            self.timeout,
            async {
                let output = self
                    .client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(path)
                    .customize()
                    .mutate_request(add_headers(headers.clone()))
                    .send()
                    .await
                    .map_err(|e| sdk_error("create_multipart_upload", path, e))?;
                output.upload_id().map(str::to_string).ok_or_else(|| {
                    StorageError::provider_call(
                        ProviderName::R2,
                        "create_multipart_upload returned no upload id",
                    )
                })
            },
        )
        .await?;

        tracing::info!(key = %path, upload_id = %upload_id, "R2 multipart upload created");
        Ok(upload_id)
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

        let mut part_urls = Vec::with_capacity(parts.len());
        for part in parts {
            let presigned = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(path)
                .upload_id(provider_upload_id)
                .part_number(part.part_number as i32)
                .set_content_md5(part.checksum.clone())
                .presigned(presigning(expires_in)?)
                .await
                .map_err(presign_error)?;
            let url = presigned_url(presigned, HttpMethod::Put, expires_in);
            part_urls.push(PartUrl {
                part_number: part.part_number,
                url: url.url,
                method: HttpMethod::Put,
                headers: url.headers,
            });
        }

        let complete = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(provider_upload_id)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(presign_error)?;

        let abort = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(path)
            .upload_id(provider_upload_id)
            .presigned(presigning(expires_in)?)
            .await
            .map_err(presign_error)?;

        Ok(MultipartUrls {
            parts: part_urls,
            complete: presigned_url(complete, HttpMethod::Post, expires_in),
            abort: presigned_url(abort, HttpMethod::Delete, expires_in),
        })
    }

    /// An upload the provider no longer knows counts as aborted.
    async fn abort_multipart_upload(
        &self,
        path: &str,
        provider_upload_id: &str,
    ) -> StorageResult<()> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;

        let result = bounded(
            ProviderName::R2,
            "abort_multipart_upload",
            path,
            self.timeout,
            async {
                self.client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(path)
                    .upload_id(provider_upload_id)
                    .send()
                    .await
                    .map_err(|e| sdk_error("abort_multipart_upload", path, e))?;
                Ok(())
            },
        )
        .await;

        match result {
            Err(StorageError::NotFound(_)) => {
                tracing::debug!(key = %path, "Multipart upload already gone");
                Ok(())
            }
            other => other,
        }
    }

    async fn list_objects(&self, request: &ListRequest) -> StorageResult<ObjectListing> {
        self.require(Operation::List)?;

        bounded(
            ProviderName::R2,
            "list_objects",
            &request.prefix,
            self.timeout,
            async {
                let output = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&request.prefix)
                    .max_keys(i32::try_from(request.max_keys).unwrap_or(i32::MAX))
                    .set_continuation_token(request.continuation_token.clone())
                    .send()
                    .await
                    .map_err(|e| sdk_error("list_objects", &request.prefix, e))?;

                let objects = output
                    .contents()
                    .iter()
                    .filter_map(|object| {
                        Some(ObjectSummary {
                            key: object.key()?.to_string(),
                            size: object.size().unwrap_or(0).max(0) as u64,
                            etag: object.e_tag().map(unquote_etag),
                            last_modified: object.last_modified().and_then(to_chrono),
                            storage_class: object.storage_class().map(|c| c.as_str().to_string()),
                        })
                    })
                    .collect();

                let is_truncated = output.is_truncated().unwrap_or(false);
                Ok(ObjectListing {
                    objects,
                    next_token: output
                        .next_continuation_token()
                        .filter(|_| is_truncated)
                        .map(str::to_string),
                    is_truncated,
                })
            },
        )
        .await
    }

    async fn get_metadata(&self, path: &str) -> StorageResult<ObjectMetadata> {
        validate_key(path)?;
        self.require(Operation::Metadata)?;
        self.head(path).await
    }

    /// Rewrite metadata with a self-copy using the `REPLACE` directive.
    async fn update_metadata(
        &self,
        path: &str,
        patch: &MetadataPatch,
    ) -> StorageResult<ObjectMetadata> {
        validate_key(path)?;
        self.require(Operation::Metadata)?;

        let mut merged = self.head(path).await?;
        patch.apply_to(&mut merged);
        let custom: HashMap<String, String> = merged.custom_metadata.clone().into_iter().collect();

        bounded(ProviderName::R2, "copy_object", path, self.timeout, async {
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .key(path)
                .copy_source(format!("{}/{}", self.bucket, encode_path(path)))
                .metadata_directive(MetadataDirective::Replace)
                .set_content_type(merged.content_type.clone())
                .set_content_encoding(merged.content_encoding.clone())
                .set_content_language(merged.content_language.clone())
                .set_content_disposition(merged.content_disposition.clone())
                .set_cache_control(merged.cache_control.clone())
                .set_metadata(Some(custom))
                .send()
                .await
                .map_err(|e| sdk_error("copy_object", path, e))?;
            Ok(())
        })
        .await?;

        self.head(path).await
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        validate_key(path)?;
        self.require(Operation::Delete)?;

        bounded(ProviderName::R2, "delete_object", path, self.timeout, async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
                .map_err(|e| sdk_error("delete_object", path, e))?;
            Ok(())
        })
        .await?;

        tracing::info!(key = %path, "R2 object deleted");
        Ok(())
    }
}
