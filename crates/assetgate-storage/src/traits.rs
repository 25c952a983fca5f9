//! Provider adapter abstraction
//!
//! Every storage provider is exposed through [`ProviderAdapter`]. Adapters expose
//! all operations; those outside the adapter's capabilities keep the default
//! implementation, which returns [`StorageError::Unsupported`] without any
//! network traffic.

use std::collections::BTreeMap;
use std::time::Duration;

use assetgate_core::models::{
    ListRequest, MetadataPatch, MultipartUrls, ObjectListing, PartRequest, ResponseOverrides,
};
use assetgate_core::{
    AppError, Capabilities, ChecksumAlgorithm, HttpMethod, ObjectMetadata, ObjectUrl, Operation,
    ProviderName,
};
use async_trait::async_trait;
use thiserror::Error;

use crate::keys::validate_checksum;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderName,
        operation: Operation,
    },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid {parameter}: {reason}")]
    InvalidRequest { parameter: String, reason: String },

    /// `status` is the provider's HTTP status; `None` when no response arrived
    #[error("{provider} request failed: {message}")]
    ProviderCall {
        provider: ProviderName,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} timed out during {operation}")]
    Timeout {
        provider: ProviderName,
        operation: String,
    },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn invalid_request(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::InvalidRequest {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    /// Transport failure with no provider response
    pub fn provider_call(provider: ProviderName, message: impl Into<String>) -> Self {
        StorageError::ProviderCall {
            provider,
            status: None,
            message: message.into(),
        }
    }

    /// Non-success response from the provider
    pub fn provider_status(provider: ProviderName, status: u16, message: impl Into<String>) -> Self {
        StorageError::ProviderCall {
            provider,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Transient failures worth retrying for idempotent operations.
    ///
    /// Timeouts, transport errors, throttling (429) and 5xx responses are
    /// transient. Other 4xx answers (bad credentials, precondition failures)
    /// will not change on a retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Timeout { .. } => true,
            StorageError::ProviderCall { status, .. } => match status {
                None => true,
                Some(status) => *status == 429 || *status >= 500,
            },
            _ => false,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unsupported {
                provider,
                operation,
            } => AppError::UnsupportedOperation {
                provider,
                operation,
            },
            StorageError::NotFound(path) => AppError::ObjectNotFound(path),
            StorageError::InvalidKey(reason) => AppError::InvalidParameter {
                parameter: "path".to_string(),
                reason,
            },
            StorageError::InvalidRequest { parameter, reason } => {
                AppError::InvalidParameter { parameter, reason }
            }
            StorageError::ProviderCall {
                provider, message, ..
            } => AppError::ProviderCallFailed { provider, message },
            StorageError::Timeout {
                provider,
                operation,
            } => AppError::ProviderTimeout {
                provider,
                operation,
            },
            StorageError::Signing(msg) => AppError::Internal(format!("Signing error: {}", msg)),
            StorageError::ConfigError(msg) => {
                AppError::Internal(format!("Storage configuration error: {}", msg))
            }
        }
    }
}

/// Parameters of a single signed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub method: HttpMethod,
    pub expires_in: Duration,
    /// Headers the client must send; signed where the provider supports it
    pub headers: BTreeMap<String, String>,
    pub checksums: BTreeMap<ChecksumAlgorithm, String>,
    pub response_overrides: ResponseOverrides,
}

impl SignRequest {
    pub fn new(method: HttpMethod, expires_in: Duration) -> Self {
        Self {
            method,
            expires_in,
            headers: BTreeMap::new(),
            checksums: BTreeMap::new(),
            response_overrides: ResponseOverrides::default(),
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_checksums(mut self, checksums: BTreeMap<ChecksumAlgorithm, String>) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn with_response_overrides(mut self, overrides: ResponseOverrides) -> Self {
        self.response_overrides = overrides;
        self
    }
}

/// Capability an HTTP method exercises on an object.
pub fn method_operation(method: HttpMethod) -> Operation {
    match method {
        HttpMethod::Get | HttpMethod::Head => Operation::Read,
        HttpMethod::Put | HttpMethod::Post => Operation::Write,
        HttpMethod::Delete => Operation::Delete,
    }
}

/// Capability-tagged provider contract.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> ProviderName;

    fn capabilities(&self) -> &Capabilities;

    /// Unsigned read URL for publicly readable providers
    fn public_url(&self, _path: &str) -> Option<String> {
        None
    }

    /// Fail with `Unsupported` unless the capability set includes `operation`.
    fn require(&self, operation: Operation) -> StorageResult<()> {
        if self.capabilities().supports(operation) {
            Ok(())
        } else {
            Err(StorageError::Unsupported {
                provider: self.name(),
                operation,
            })
        }
    }

    /// Checks shared by every `sign_url` implementation: the method's
    /// operation is supported, the expiry is in range, each checksum algorithm
    /// is known to the provider and response overrides only go on reads.
    fn check_sign_request(&self, request: &SignRequest) -> StorageResult<()> {
        self.require(Operation::SignedUrl)?;
        self.require(method_operation(request.method))?;

        let capabilities = self.capabilities();
        let secs = request.expires_in.as_secs();
        if !capabilities.expiry_in_range(secs) {
            return Err(StorageError::invalid_request(
                "expiry",
                format!(
                    "{} accepts expiries between {} and {} seconds, got {}",
                    self.name(),
                    capabilities.min_url_expiry_secs,
                    capabilities.max_url_expiry_secs,
                    secs
                ),
            ));
        }

        for (algorithm, value) in &request.checksums {
            if !capabilities.supports_checksum(*algorithm) {
                return Err(StorageError::invalid_request(
                    "checksums",
                    format!("{} does not accept {} checksums", self.name(), algorithm),
                ));
            }
            validate_checksum(*algorithm, value)?;
        }

        if !request.response_overrides.is_empty() {
            self.require(Operation::ResponseOverrides)?;
            if !matches!(request.method, HttpMethod::Get | HttpMethod::Head) {
                return Err(StorageError::invalid_request(
                    "responseHeaders",
                    "response overrides only apply to GET and HEAD URLs",
                ));
            }
        }
        Ok(())
    }

    /// Produce a time-limited URL for one HTTP operation on `path`.
    async fn sign_url(&self, _path: &str, _request: &SignRequest) -> StorageResult<ObjectUrl> {
        Err(self.unsupported(Operation::SignedUrl))
    }

    /// Open a provider multipart session and return its id.
    async fn create_multipart_upload(
        &self,
        _path: &str,
        _headers: &BTreeMap<String, String>,
    ) -> StorageResult<String> {
        Err(self.unsupported(Operation::Multipart))
    }

    /// Signed URLs for each part plus complete and abort URLs.
    async fn part_urls(
        &self,
        _path: &str,
        _provider_upload_id: &str,
        _parts: &[PartRequest],
        _expires_in: Duration,
    ) -> StorageResult<MultipartUrls> {
        Err(self.unsupported(Operation::Multipart))
    }

    async fn abort_multipart_upload(
        &self,
        _path: &str,
        _provider_upload_id: &str,
    ) -> StorageResult<()> {
        Err(self.unsupported(Operation::Multipart))
    }

    async fn list_objects(&self, _request: &ListRequest) -> StorageResult<ObjectListing> {
        Err(self.unsupported(Operation::List))
    }

    async fn get_metadata(&self, _path: &str) -> StorageResult<ObjectMetadata> {
        Err(self.unsupported(Operation::Metadata))
    }

    async fn update_metadata(
        &self,
        _path: &str,
        _patch: &MetadataPatch,
    ) -> StorageResult<ObjectMetadata> {
        Err(self.unsupported(Operation::Metadata))
    }

    async fn delete_object(&self, _path: &str) -> StorageResult<()> {
        Err(self.unsupported(Operation::Delete))
    }

    fn unsupported(&self, operation: Operation) -> StorageError {
        StorageError::Unsupported {
            provider: self.name(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare {
        capabilities: Capabilities,
    }

    #[async_trait]
    impl ProviderAdapter for Bare {
        fn name(&self) -> ProviderName {
            ProviderName::Cdn
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }
    }

    #[tokio::test]
    async fn default_operations_are_unsupported() {
        let adapter = Bare {
            capabilities: Capabilities::new().with_read(),
        };
        let err = adapter
            .create_multipart_upload("a/b", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Unsupported {
                operation: Operation::Multipart,
                ..
            }
        ));
        assert!(adapter.require(Operation::Read).is_ok());
        assert!(adapter.require(Operation::Delete).is_err());
    }

    #[test]
    fn sign_request_checks_capabilities() {
        let adapter = Bare {
            capabilities: Capabilities::new()
                .with_read()
                .with_signed_urls()
                .with_checksums(&[ChecksumAlgorithm::Md5])
                .with_url_expiry(60, 3600),
        };

        let ok = SignRequest::new(HttpMethod::Get, Duration::from_secs(600));
        assert!(adapter.check_sign_request(&ok).is_ok());

        let write = SignRequest::new(HttpMethod::Put, Duration::from_secs(600));
        assert!(matches!(
            adapter.check_sign_request(&write),
            Err(StorageError::Unsupported {
                operation: Operation::Write,
                ..
            })
        ));

        let short = SignRequest::new(HttpMethod::Get, Duration::from_secs(10));
        assert!(matches!(
            adapter.check_sign_request(&short),
            Err(StorageError::InvalidRequest { ref parameter, .. }) if parameter == "expiry"
        ));

        let sha = SignRequest::new(HttpMethod::Get, Duration::from_secs(600)).with_checksums(
            BTreeMap::from([(ChecksumAlgorithm::Sha256, "abc".to_string())]),
        );
        assert!(adapter.check_sign_request(&sha).is_err());

        let overrides = SignRequest::new(HttpMethod::Get, Duration::from_secs(600))
            .with_response_overrides(ResponseOverrides {
                content_type: Some("image/png".to_string()),
                ..Default::default()
            });
        assert!(matches!(
            adapter.check_sign_request(&overrides),
            Err(StorageError::Unsupported {
                operation: Operation::ResponseOverrides,
                ..
            })
        ));
    }

    #[test]
    fn only_transient_provider_failures_are_retryable() {
        assert!(StorageError::provider_call(ProviderName::R2, "connection reset").is_retryable());
        assert!(StorageError::provider_status(ProviderName::R2, 503, "SlowDown").is_retryable());
        assert!(StorageError::provider_status(ProviderName::Gcs, 429, "rateLimited").is_retryable());
        assert!(StorageError::Timeout {
            provider: ProviderName::Cdn,
            operation: "delete_object".to_string(),
        }
        .is_retryable());

        assert!(!StorageError::provider_status(ProviderName::R2, 403, "AccessDenied").is_retryable());
        assert!(!StorageError::provider_status(ProviderName::Gcs, 412, "conditionNotMet").is_retryable());
        assert!(!StorageError::NotFound("a.png".to_string()).is_retryable());
        assert!(!StorageError::invalid_request("expiry", "too long").is_retryable());
    }

    #[test]
    fn storage_errors_map_to_app_errors() {
        let err: AppError = StorageError::Timeout {
            provider: ProviderName::R2,
            operation: "head_object".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::ProviderTimeout { .. }));

        let err: AppError = StorageError::NotFound("a.png".to_string()).into();
        assert!(matches!(err, AppError::ObjectNotFound(ref p) if p == "a.png"));

        let err: AppError = StorageError::Unsupported {
            provider: ProviderName::Cdn,
            operation: Operation::List,
        }
        .into();
        assert!(matches!(err, AppError::UnsupportedOperation { .. }));
    }
}
