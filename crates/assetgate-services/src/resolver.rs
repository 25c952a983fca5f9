//! URL resolution
//!
//! Upload resolution: lookup definition, resolve parameters, render the path,
//! select the adapter, sign a write URL. Download resolution works on a raw
//! path the caller already holds. Multipart init and listing share the same
//! rendering front half.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use assetgate_core::constants::{DEFAULT_LIST_MAX_KEYS, DEFAULT_URL_EXPIRY_SECS};
use assetgate_core::models::requests::{
    DownloadUrlRequest, ListObjectsRequest, ListObjectsResponse, UploadMetadata, UploadUrlRequest,
};
use assetgate_core::models::{
    ListRequest, MetadataPatch, MultipartUrls, PartRequest, ResolvedResource, ScopeValue,
    StorageMetadataDefaults, UrlType,
};
use assetgate_core::{
    AppError, AppResult, Config, HttpMethod, MultipartLimits, ObjectMetadata, ObjectUrl,
    Operation, ProviderName, ScopeNames, ScopeType,
};
use assetgate_storage::{ProviderAdapter, SignRequest};

use crate::multipart::validate_part_requests;
use crate::params::resolve_parameters;
use crate::providers::ProviderSet;
use crate::registry::{DefinitionChain, DefinitionRegistry};
use crate::render::{ensure_scope_allowed, render};
use crate::retry::retry_read;

const DEFAULT_READ_ATTEMPTS: u32 = 3;
const DEFAULT_READ_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub default_expiry_secs: u64,
    /// Attempts for idempotent provider reads
    pub read_attempts: u32,
    pub read_backoff: Duration,
    pub scope_names: ScopeNames,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            default_expiry_secs: DEFAULT_URL_EXPIRY_SECS,
            read_attempts: DEFAULT_READ_ATTEMPTS,
            read_backoff: DEFAULT_READ_BACKOFF,
            scope_names: ScopeNames::default(),
        }
    }
}

impl From<&Config> for ResolverSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_expiry_secs: config.default_url_expiry_secs(),
            read_attempts: config.metadata_read_attempts(),
            read_backoff: DEFAULT_READ_BACKOFF,
            scope_names: config.scope_names().clone(),
        }
    }
}

/// Inputs shared by upload resolution and multipart init.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub scope: ScopeType,
    pub scope_value: Option<ScopeValue>,
    pub parameters: BTreeMap<String, String>,
    /// Signed URL lifetime in seconds; the configured default when absent
    pub expiry: Option<u64>,
    pub metadata: Option<UploadMetadata>,
}

impl From<UploadUrlRequest> for ResolveOptions {
    fn from(request: UploadUrlRequest) -> Self {
        Self {
            scope: request.scope,
            scope_value: request.scope_value,
            parameters: request.parameters,
            expiry: request.expiry,
            metadata: request.metadata,
        }
    }
}

/// A rendered path that has not been signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub definition: String,
    pub provider: ProviderName,
    pub scope: ScopeType,
    pub path: String,
    pub parameters: BTreeMap<String, String>,
    pub url_type: UrlType,
}

/// A provider multipart session created for a rendered path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartInit {
    pub provider_upload_id: String,
    pub provider: ProviderName,
    pub path: String,
    pub parameters: BTreeMap<String, String>,
    pub limits: MultipartLimits,
}

pub struct UrlResolver {
    registry: Arc<DefinitionRegistry>,
    providers: ProviderSet,
    settings: ResolverSettings,
}

impl UrlResolver {
    pub fn new(
        registry: Arc<DefinitionRegistry>,
        providers: ProviderSet,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            registry,
            providers,
            settings,
        }
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Render a definition's path without signing anything.
    pub fn resolve_path(
        &self,
        definition: &str,
        provider: ProviderName,
        scope: ScopeType,
        scope_value: Option<ScopeValue>,
        parameters: &BTreeMap<String, String>,
    ) -> AppResult<ResolvedPath> {
        self.providers.get(provider)?;
        let chain = self.registry.lookup(definition)?;
        self.render_chain(&chain, provider, scope, scope_value, parameters)
    }

    fn render_chain(
        &self,
        chain: &DefinitionChain,
        provider: ProviderName,
        scope: ScopeType,
        scope_value: Option<ScopeValue>,
        parameters: &BTreeMap<String, String>,
    ) -> AppResult<ResolvedPath> {
        ensure_scope_allowed(chain, scope)?;
        let values = resolve_parameters(
            chain,
            scope,
            scope_value,
            parameters,
            &self.settings.scope_names,
        )?;
        let rendered = render(chain, scope, provider, &values)?;

        Ok(ResolvedPath {
            definition: chain.name().to_string(),
            provider,
            scope,
            path: rendered.path,
            parameters: values,
            url_type: rendered.url_type,
        })
    }

    #[tracing::instrument(
        skip(self, options),
        fields(definition = %definition, provider = %provider, scope = %options.scope)
    )]
    pub async fn resolve_upload_url(
        &self,
        definition: &str,
        provider: ProviderName,
        options: &ResolveOptions,
    ) -> AppResult<ResolvedResource> {
        let adapter = self.providers.get(provider)?;
        let chain = self.registry.lookup(definition)?;
        let resolved = self.render_chain(
            &chain,
            provider,
            options.scope,
            options.scope_value,
            &options.parameters,
        )?;

        let url = self
            .sign_upload(
                adapter.as_ref(),
                chain.storage_metadata(),
                &resolved.path,
                options.expiry,
                options.metadata.as_ref(),
            )
            .await?;

        let public_url = match resolved.url_type {
            UrlType::Public => adapter.public_url(&resolved.path),
            UrlType::Signed => None,
        };

        tracing::info!(path = %resolved.path, "Upload URL resolved");

        Ok(ResolvedResource {
            definition: Some(resolved.definition),
            provider,
            scope: Some(resolved.scope),
            path: resolved.path,
            parameters: resolved.parameters,
            url,
            public_url,
        })
    }

    /// Sign a write URL for an already rendered path.
    ///
    /// Checks write and signing capabilities, the expiry window, the declared
    /// size against the single-upload limit and the definition's required
    /// checksums before any signing happens.
    pub async fn sign_upload(
        &self,
        adapter: &dyn ProviderAdapter,
        defaults: Option<&StorageMetadataDefaults>,
        path: &str,
        expiry: Option<u64>,
        metadata: Option<&UploadMetadata>,
    ) -> AppResult<ObjectUrl> {
        adapter.require(Operation::Write)?;
        adapter.require(Operation::SignedUrl)?;
        let expires_in = self.expiry(adapter, expiry)?;
        let capabilities = adapter.capabilities();

        if let Some(length) = metadata.and_then(|m| m.content_length) {
            if length > capabilities.max_single_upload_size {
                return Err(AppError::PayloadTooLarge(format!(
                    "{} bytes exceeds the {} byte single upload limit of {}; use a multipart upload",
                    length,
                    capabilities.max_single_upload_size,
                    adapter.name()
                )));
            }
        }

        let checksums = metadata.map(|m| m.checksums.clone()).unwrap_or_default();
        if let Some(defaults) = defaults {
            for algorithm in &defaults.required_checksums {
                if !capabilities.supports_checksum(*algorithm) {
                    return Err(AppError::InvalidParameter {
                        parameter: "checksums".to_string(),
                        reason: format!(
                            "{} cannot verify {} checksums required by this definition",
                            adapter.name(),
                            algorithm
                        ),
                    });
                }
                if !checksums.contains_key(algorithm) {
                    return Err(AppError::MissingParameter {
                        parameter: format!("metadata.checksums.{}", algorithm),
                        details: "checksum required by this definition".to_string(),
                    });
                }
            }
        }

        let request = SignRequest::new(HttpMethod::Put, expires_in)
            .with_headers(upload_headers(defaults, metadata))
            .with_checksums(checksums);
        Ok(adapter.sign_url(path, &request).await?)
    }

    #[tracing::instrument(skip(self, request), fields(provider = %provider, path = %path))]
    pub async fn resolve_download_url(
        &self,
        provider: ProviderName,
        path: &str,
        request: &DownloadUrlRequest,
    ) -> AppResult<ResolvedResource> {
        let adapter = self.providers.get(provider)?;
        let path = object_path(provider, path)?;

        let overrides = request.response_headers.clone().unwrap_or_default();
        if !overrides.is_empty() {
            adapter.require(Operation::ResponseOverrides)?;
        }
        let expires_in = self.expiry(adapter.as_ref(), request.expiry)?;

        let sign = SignRequest::new(HttpMethod::Get, expires_in).with_response_overrides(overrides);
        let url = adapter.sign_url(&path, &sign).await?;
        let public_url = if adapter.capabilities().public_read {
            adapter.public_url(&path)
        } else {
            None
        };

        tracing::debug!("Download URL resolved");

        Ok(ResolvedResource {
            definition: None,
            provider,
            scope: None,
            path,
            parameters: BTreeMap::new(),
            url,
            public_url,
        })
    }

    /// Render the path and open a provider multipart session. Never retried.
    #[tracing::instrument(
        skip(self, options),
        fields(definition = %definition, provider = %provider, scope = %options.scope)
    )]
    pub async fn init_multipart(
        &self,
        definition: &str,
        provider: ProviderName,
        options: &ResolveOptions,
    ) -> AppResult<MultipartInit> {
        let adapter = self.providers.get(provider)?;
        let limits = multipart_limits(adapter.as_ref())?;

        let chain = self.registry.lookup(definition)?;
        let resolved = self.render_chain(
            &chain,
            provider,
            options.scope,
            options.scope_value,
            &options.parameters,
        )?;

        let headers = upload_headers(chain.storage_metadata(), options.metadata.as_ref());
        let provider_upload_id = adapter
            .create_multipart_upload(&resolved.path, &headers)
            .await?;

        tracing::info!(
            path = %resolved.path,
            provider_upload_id = %provider_upload_id,
            "Multipart session created"
        );

        Ok(MultipartInit {
            provider_upload_id,
            provider,
            path: resolved.path,
            parameters: resolved.parameters,
            limits,
        })
    }

    /// Signed part URLs plus complete and abort URLs for an open session.
    pub async fn multipart_urls(
        &self,
        provider: ProviderName,
        path: &str,
        provider_upload_id: &str,
        parts: &[PartRequest],
        expiry: Option<u64>,
    ) -> AppResult<MultipartUrls> {
        let adapter = self.providers.get(provider)?;
        let limits = multipart_limits(adapter.as_ref())?;
        self.part_urls_within(provider, &limits, path, provider_upload_id, parts, expiry)
            .await
    }

    /// Part URLs validated against the given limits rather than the adapter's current ones.
    #[tracing::instrument(
        skip(self, limits, parts),
        fields(provider = %provider, path = %path, parts = parts.len())
    )]
    pub async fn part_urls_within(
        &self,
        provider: ProviderName,
        limits: &MultipartLimits,
        path: &str,
        provider_upload_id: &str,
        parts: &[PartRequest],
        expiry: Option<u64>,
    ) -> AppResult<MultipartUrls> {
        let adapter = self.providers.get(provider)?;
        adapter.require(Operation::Multipart)?;
        let path = object_path(provider, path)?;
        validate_part_requests(limits, parts)?;
        if provider_upload_id.trim().is_empty() {
            return Err(AppError::InvalidParameter {
                parameter: "uploadId".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let expires_in = self.expiry(adapter.as_ref(), expiry)?;

        Ok(adapter
            .part_urls(&path, provider_upload_id, parts, expires_in)
            .await?)
    }

    pub async fn abort_multipart(
        &self,
        provider: ProviderName,
        path: &str,
        provider_upload_id: &str,
    ) -> AppResult<()> {
        let adapter = self.providers.get(provider)?;
        Ok(adapter
            .abort_multipart_upload(path, provider_upload_id)
            .await?)
    }

    /// List objects under a definition's rendered prefix.
    #[tracing::instrument(skip(self, request), fields(definition = %definition, provider = %provider))]
    pub async fn list_objects(
        &self,
        definition: &str,
        provider: ProviderName,
        request: &ListObjectsRequest,
    ) -> AppResult<ListObjectsResponse> {
        let adapter = self.providers.get(provider)?;
        adapter.require(Operation::List)?;

        let chain = self.registry.lookup(definition)?;
        let resolved = self.render_chain(
            &chain,
            provider,
            request.scope,
            request.scope_value,
            &request.parameters,
        )?;

        let mut prefix = resolved.path;
        if let Some(sub) = request.prefix.as_deref().filter(|p| !p.is_empty()) {
            check_sub_prefix(sub)?;
            prefix.push_str(sub);
        }

        let list = ListRequest {
            prefix: prefix.clone(),
            max_keys: request
                .max_keys
                .unwrap_or(DEFAULT_LIST_MAX_KEYS)
                .clamp(1, DEFAULT_LIST_MAX_KEYS),
            continuation_token: request.continuation_token.clone(),
        };
        let listing = retry_read(
            "list_objects",
            self.settings.read_attempts,
            self.settings.read_backoff,
            || adapter.list_objects(&list),
        )
        .await?;

        Ok(ListObjectsResponse {
            prefix,
            objects: listing.objects,
            next_token: listing.next_token,
            is_truncated: listing.is_truncated,
        })
    }

    #[tracing::instrument(skip(self), fields(provider = %provider))]
    pub async fn get_metadata(&self, provider: ProviderName, path: &str) -> AppResult<ObjectMetadata> {
        let adapter = self.providers.get(provider)?;
        adapter.require(Operation::Metadata)?;
        let path = object_path(provider, path)?;

        Ok(retry_read(
            "get_metadata",
            self.settings.read_attempts,
            self.settings.read_backoff,
            || adapter.get_metadata(&path),
        )
        .await?)
    }

    #[tracing::instrument(skip(self, patch), fields(provider = %provider))]
    pub async fn update_metadata(
        &self,
        provider: ProviderName,
        path: &str,
        patch: &MetadataPatch,
    ) -> AppResult<ObjectMetadata> {
        let adapter = self.providers.get(provider)?;
        adapter.require(Operation::Metadata)?;
        let path = object_path(provider, path)?;
        if patch.is_empty() {
            return Err(AppError::InvalidInput(
                "metadata update does not change anything".to_string(),
            ));
        }

        let metadata = adapter.update_metadata(&path, patch).await?;
        tracing::info!(path = %path, "Object metadata updated");
        Ok(metadata)
    }

    #[tracing::instrument(skip(self), fields(provider = %provider))]
    pub async fn delete_object(&self, provider: ProviderName, path: &str) -> AppResult<String> {
        let adapter = self.providers.get(provider)?;
        adapter.require(Operation::Delete)?;
        let path = object_path(provider, path)?;

        adapter.delete_object(&path).await?;
        tracing::info!(path = %path, "Object deleted");
        Ok(path)
    }

    fn expiry(&self, adapter: &dyn ProviderAdapter, requested: Option<u64>) -> AppResult<Duration> {
        let secs = requested.unwrap_or(self.settings.default_expiry_secs);
        let capabilities = adapter.capabilities();
        if !capabilities.expiry_in_range(secs) {
            return Err(AppError::InvalidParameter {
                parameter: "expiry".to_string(),
                reason: format!(
                    "{} seconds is outside [{}, {}] for {}",
                    secs,
                    capabilities.min_url_expiry_secs,
                    capabilities.max_url_expiry_secs,
                    adapter.name()
                ),
            });
        }
        Ok(Duration::from_secs(secs))
    }
}

fn multipart_limits(adapter: &dyn ProviderAdapter) -> AppResult<MultipartLimits> {
    adapter.require(Operation::Multipart)?;
    adapter
        .capabilities()
        .multipart
        .ok_or_else(|| adapter.unsupported(Operation::Multipart).into())
}

/// Headers signed into an upload: definition custom headers, request headers
/// on top, then the definition's cache policy and the declared content type.
fn upload_headers(
    defaults: Option<&StorageMetadataDefaults>,
    metadata: Option<&UploadMetadata>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();

    if let Some(defaults) = defaults {
        for (name, value) in &defaults.custom_headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
    }
    if let Some(metadata) = metadata {
        for (name, value) in &metadata.headers {
            headers.insert(name.to_ascii_lowercase(), value.clone());
        }
    }
    if let Some(cache_control) = defaults.and_then(|d| d.cache_control.as_ref()) {
        headers.insert("cache-control".to_string(), cache_control.clone());
    }
    if let Some(content_type) = metadata.and_then(|m| m.content_type.as_ref()) {
        headers.insert("content-type".to_string(), content_type.clone());
    }

    headers
}

/// Normalise a caller-held object path. An empty path is always an error.
fn object_path(provider: ProviderName, path: &str) -> AppResult<String> {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return Err(AppError::EmptyResolvedPath(format!(
            "{} object path",
            provider
        )));
    }
    Ok(path.to_string())
}

fn check_sub_prefix(prefix: &str) -> AppResult<()> {
    if prefix.starts_with('/')
        || prefix.split('/').any(|segment| segment == "..")
        || prefix.chars().any(char::is_control)
    {
        return Err(AppError::InvalidParameter {
            parameter: "prefix".to_string(),
            reason: "must be a relative prefix without '..' segments".to_string(),
        });
    }
    Ok(())
}
