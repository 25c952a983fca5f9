//! In-process adapter for tests and local development.
//!
//! Keeps object metadata in memory, signs deterministic `memory://` URLs and
//! records deletes and aborts so callers can assert on side effects. Failures
//! can be injected to exercise retry paths.

use std::collections::BTreeMap;
use std::time::Duration;

use assetgate_core::constants::{GIB, MIB, TIB};
use assetgate_core::models::{
    ListRequest, MetadataPatch, MultipartUrls, ObjectListing, ObjectSummary, PartRequest, PartUrl,
};
use assetgate_core::{
    Capabilities, ChecksumAlgorithm, HttpMethod, MultipartLimits, ObjectMetadata, ObjectUrl,
    Operation, ProviderName,
};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::keys::{encode_path, encode_query, validate_key};
use crate::call::expiry_from;
use crate::traits::{ProviderAdapter, SignRequest, StorageError, StorageResult};

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<String, ObjectMetadata>,
    /// provider upload id to object path
    sessions: BTreeMap<String, String>,
    next_session: u64,
    deleted: Vec<String>,
    aborted: Vec<String>,
    failing_deletes: u32,
    failing_metadata_reads: u32,
    metadata_reads: u32,
}

pub struct MemoryProvider {
    name: ProviderName,
    capabilities: Capabilities,
    public_base_url: Option<String>,
    state: Mutex<MemoryState>,
}

impl MemoryProvider {
    pub fn new(name: ProviderName, capabilities: Capabilities) -> Self {
        Self {
            name,
            capabilities,
            public_base_url: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Adapter supporting every operation, with S3-like multipart limits.
    pub fn full(name: ProviderName) -> Self {
        Self::new(
            name,
            Capabilities::new()
                .with_read()
                .with_write()
                .with_delete()
                .with_list()
                .with_metadata()
                .with_signed_urls()
                .with_response_overrides()
                .with_multipart(MultipartLimits::new(5 * MIB, 5 * GIB, 10_000))
                .with_checksums(&[
                    ChecksumAlgorithm::Md5,
                    ChecksumAlgorithm::Crc32c,
                    ChecksumAlgorithm::Sha256,
                ])
                .with_max_single_upload_size(5 * TIB),
        )
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    pub async fn insert_object(&self, path: impl Into<String>, size: u64) {
        let key = path.into();
        let metadata = ObjectMetadata {
            key: key.clone(),
            size,
            created_at: Some(Utc::now()),
            last_modified: Some(Utc::now()),
            ..Default::default()
        };
        self.state.lock().await.objects.insert(key, metadata);
    }

    pub async fn insert_metadata(&self, metadata: ObjectMetadata) {
        self.state
            .lock()
            .await
            .objects
            .insert(metadata.key.clone(), metadata);
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.state.lock().await.objects.contains_key(path)
    }

    /// Make the next `count` deletes fail with a retryable error.
    pub async fn fail_next_deletes(&self, count: u32) {
        self.state.lock().await.failing_deletes = count;
    }

    /// Make the next `count` metadata reads fail with a retryable error.
    pub async fn fail_next_metadata_reads(&self, count: u32) {
        self.state.lock().await.failing_metadata_reads = count;
    }

    pub async fn deleted_paths(&self) -> Vec<String> {
        self.state.lock().await.deleted.clone()
    }

    pub async fn aborted_uploads(&self) -> Vec<String> {
        self.state.lock().await.aborted.clone()
    }

    pub async fn metadata_reads(&self) -> u32 {
        self.state.lock().await.metadata_reads
    }

    fn object_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.name, encode_path(path))
    }
}

#[async_trait]
impl ProviderAdapter for MemoryProvider {
    fn name(&self) -> ProviderName {
        self.name
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

        let mut url = format!(
            "{}?method={}&expires={}",
            self.object_url(path),
            request.method.as_str(),
            request.expires_in.as_secs()
        );
        for (name, value) in request.response_overrides.query_pairs() {
            url.push_str(&format!("&{}={}", name, encode_query(value)));
        }

        let mut headers = request.headers.clone();
        for (algorithm, value) in &request.checksums {
            headers.insert(format!("x-checksum-{}", algorithm.as_str()), value.clone());
        }

        Ok(ObjectUrl::new(url, request.method)
            .with_headers(headers)
            .expiring_at(expiry_from(Utc::now(), request.expires_in)))
    }

    async fn create_multipart_upload(
        &self,
        path: &str,
        _headers: &BTreeMap<String, String>,
    ) -> StorageResult<String> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;

        let mut state = self.state.lock().await;
        state.next_session += 1;
        let id = format!("mem-upload-{}", state.next_session);
        state.sessions.insert(id.clone(), path.to_string());
        Ok(id)
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

        let state = self.state.lock().await;
        match state.sessions.get(provider_upload_id) {
            Some(session_path) if session_path == path => {}
            _ => return Err(StorageError::NotFound(provider_upload_id.to_string())),
        }

        let base = self.object_url(path);
        let expires_at = expiry_from(Utc::now(), expires_in);
        let parts = parts
            .iter()
            .map(|part| PartUrl {
                part_number: part.part_number,
                url: format!(
                    "{}?uploadId={}&partNumber={}",
                    base, provider_upload_id, part.part_number
                ),
                method: HttpMethod::Put,
                headers: part
                    .checksum
                    .iter()
                    .map(|c| ("content-md5".to_string(), c.clone()))
                    .collect(),
            })
            .collect();

        Ok(MultipartUrls {
            parts,
            complete: ObjectUrl::new(
                format!("{}?uploadId={}", base, provider_upload_id),
                HttpMethod::Post,
            )
            .expiring_at(expires_at),
            abort: ObjectUrl::new(
                format!("{}?uploadId={}", base, provider_upload_id),
                HttpMethod::Delete,
            )
            .expiring_at(expires_at),
        })
    }

    async fn abort_multipart_upload(
        &self,
        path: &str,
        provider_upload_id: &str,
    ) -> StorageResult<()> {
        validate_key(path)?;
        self.require(Operation::Multipart)?;

        let mut state = self.state.lock().await;
        state.sessions.remove(provider_upload_id);
        state.aborted.push(provider_upload_id.to_string());
        Ok(())
    }

    async fn list_objects(&self, request: &ListRequest) -> StorageResult<ObjectListing> {
        self.require(Operation::List)?;

        let state = self.state.lock().await;
        let mut matching = state
            .objects
            .values()
            .filter(|o| o.key.starts_with(&request.prefix))
            .filter(|o| match &request.continuation_token {
                Some(token) => o.key.as_str() > token.as_str(),
                None => true,
            });

        let limit = request.max_keys.max(1) as usize;
        let objects: Vec<ObjectSummary> = matching
            .by_ref()
            .take(limit)
            .map(|o| ObjectSummary {
                key: o.key.clone(),
                size: o.size,
                etag: o.etag.clone(),
                last_modified: o.last_modified,
                storage_class: o.storage_class.clone(),
            })
            .collect();
        let is_truncated = matching.next().is_some();

        Ok(ObjectListing {
            next_token: if is_truncated {
                objects.last().map(|o| o.key.clone())
            } else {
                None
            },
            objects,
            is_truncated,
        })
    }

    async fn get_metadata(&self, path: &str) -> StorageResult<ObjectMetadata> {
        validate_key(path)?;
        self.require(Operation::Metadata)?;

        let mut state = self.state.lock().await;
        state.metadata_reads += 1;
        if state.failing_metadata_reads > 0 {
            state.failing_metadata_reads -= 1;
            return Err(StorageError::provider_call(self.name, "injected metadata failure"));
        }
        state
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn update_metadata(
        &self,
        path: &str,
        patch: &MetadataPatch,
    ) -> StorageResult<ObjectMetadata> {
        validate_key(path)?;
        self.require(Operation::Metadata)?;

        let mut state = self.state.lock().await;
        let metadata = state
            .objects
            .get_mut(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        patch.apply_to(metadata);
        metadata.last_modified = Some(Utc::now());
        Ok(metadata.clone())
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        validate_key(path)?;
        self.require(Operation::Delete)?;

        let mut state = self.state.lock().await;
        if state.failing_deletes > 0 {
            state.failing_deletes -= 1;
            return Err(StorageError::provider_call(self.name, "injected delete failure"));
        }
        state.deleted.push(path.to_string());
        match state.objects.remove(path) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(path.to_string())),
        }
    }
}
