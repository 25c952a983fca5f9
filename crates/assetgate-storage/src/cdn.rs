//! Token-authenticated CDN adapter.
//!
//! Signed URLs carry `expires`, `method` and an HMAC-SHA256 `token` over
//! `METHOD\n/path\nexpires`, which the edge verifies with the shared signing
//! key. Objects are publicly readable under the base URL. Deletes go through
//! the storage API and are only available when it is configured.

use std::time::Duration;

use assetgate_core::constants::{MAX_URL_EXPIRY_SECS, MIB};
use assetgate_core::{
    Capabilities, CdnConfig, ChecksumAlgorithm, HttpMethod, ObjectUrl, Operation, ProviderName,
};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::call::{bounded, expiry_from, reqwest_method, send_checked};
use crate::keys::{encode_path, validate_key};
use crate::traits::{ProviderAdapter, SignRequest, StorageError, StorageResult};

const MIN_EXPIRY_SECS: u64 = 60;
const MAX_UPLOAD_SIZE: u64 = 512 * MIB;

struct StorageApi {
    url: String,
    access_key: String,
}

/// CDN storage adapter
pub struct CdnProvider {
    base_url: String,
    signing_key: String,
    storage_api: Option<StorageApi>,
    http: reqwest::Client,
    timeout: Duration,
    capabilities: Capabilities,
}

impl CdnProvider {
    pub fn new(config: &CdnConfig, http: reqwest::Client, timeout: Duration) -> Self {
        let storage_api = match (&config.storage_api_url, &config.storage_api_key) {
            (Some(url), Some(key)) => Some(StorageApi {
                url: url.trim_end_matches('/').to_string(),
                access_key: key.clone(),
            }),
            _ => None,
        };

        let mut capabilities = Capabilities::new()
            .with_read()
            .with_write()
            .with_signed_urls()
            .with_public_read()
            .with_checksums(&[ChecksumAlgorithm::Sha256])
            .with_max_single_upload_size(MAX_UPLOAD_SIZE)
            .with_url_expiry(MIN_EXPIRY_SECS, MAX_URL_EXPIRY_SECS);
        if storage_api.is_some() {
            capabilities = capabilities.with_delete();
        }

        tracing::info!(
            base_url = %config.base_url,
            deletes_enabled = storage_api.is_some(),
            "CDN provider configured"
        );

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            signing_key: config.signing_key.clone(),
            storage_api,
            http,
            timeout,
            capabilities,
        }
    }

    fn token(&self, method: HttpMethod, encoded_path: &str, expires: i64) -> StorageResult<String> {
        edge_token(&self.signing_key, method, encoded_path, expires)
    }
}

/// hex(HMAC-SHA256(key, "METHOD\n/path\nexpires"))
fn edge_token(
    signing_key: &str,
    method: HttpMethod,
    encoded_path: &str,
    expires: i64,
) -> StorageResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_key.as_bytes())
        .map_err(|e| StorageError::Signing(format!("invalid CDN signing key: {}", e)))?;
    mac.update(format!("{}\n/{}\n{}", method.as_str(), encoded_path, expires).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl ProviderAdapter for CdnProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Cdn
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn public_url(&self, path: &str) -> Option<String> {
        Some(format!("{}/{}", self.base_url, encode_path(path)))
    }

    async fn sign_url(&self, path: &str, request: &SignRequest) -> StorageResult<ObjectUrl> {
        validate_key(path)?;
        self.check_sign_request(request)?;

        let now = Utc::now();
        let expires_at = expiry_from(now, request.expires_in);
        let expires = expires_at.timestamp();
        let encoded = encode_path(path);
        let token = self.token(request.method, &encoded, expires)?;

        let mut headers = request.headers.clone();
        if let Some(digest) = request.checksums.get(&ChecksumAlgorithm::Sha256) {
            headers.insert("checksum".to_string(), digest.clone());
        }

        let url = format!(
            "{}/{}?expires={}&method={}&token={}",
            self.base_url,
            encoded,
            expires,
            request.method.as_str(),
            token
        );
        Ok(ObjectUrl::new(url, request.method)
            .with_headers(headers)
            .expiring_at(expires_at))
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        validate_key(path)?;
        self.require(Operation::Delete)?;
        let Some(api) = &self.storage_api else {
            return Err(self.unsupported(Operation::Delete));
        };

        let url = format!("{}/{}", api.url, encode_path(path));
        bounded(ProviderName::Cdn, "delete_object", path, self.timeout, async {
            let request = self
                .http
                .request(reqwest_method(HttpMethod::Delete), &url)
                .header("AccessKey", api.access_key.as_str());
            send_checked(ProviderName::Cdn, "delete_object", path, request).await?;
            Ok(())
        })
        .await?;

        tracing::info!(key = %path, "CDN object deleted");
        Ok(())
    }
}
