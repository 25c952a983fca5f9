//! Error types module
//!
//! Every failure the broker can produce is a variant of [`AppError`]. Each
//! variant self-describes its HTTP presentation through [`ErrorMetadata`],
//! so the API layer never has to match on variants itself.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::models::{Operation, ProviderName, ScopeType, UploadStatus};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like provider hiccups
    Warn,
    /// Error level - for unexpected failures and invariant breaches
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "MISSING_PARAMETER")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

pub type AppResult<T> = Result<T, AppError>;

fn provider_suffix(provider: &Option<ProviderName>) -> String {
    provider
        .map(|p| format!(" on provider {}", p))
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("Definition already registered: {0}")]
    DuplicateDefinition(String),

    #[error("Invalid definition {definition}: {reason}")]
    InvalidDefinition { definition: String, reason: String },

    #[error("Scope {scope} is not supported by definition {definition}{}", provider_suffix(.provider))]
    ScopeNotSupported {
        definition: String,
        scope: ScopeType,
        provider: Option<ProviderName>,
    },

    #[error("Missing parameter {parameter}: {details}")]
    MissingParameter { parameter: String, details: String },

    #[error("Invalid parameter {parameter}: {reason}")]
    InvalidParameter { parameter: String, reason: String },

    #[error("Unresolved token {{{token}}} while rendering {definition}")]
    UnresolvedToken { definition: String, token: String },

    #[error("Resolved path is empty: {0}")]
    EmptyResolvedPath(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    #[error("Provider not configured: {0}")]
    ProviderNotFound(ProviderName),

    #[error("Provider {provider} does not support {operation}")]
    UnsupportedOperation {
        provider: ProviderName,
        operation: Operation,
    },

    #[error("Too many parts: {requested} requested, at most {max} allowed")]
    TooManyParts { requested: usize, max: u32 },

    #[error("Part {part_number} size {size} is outside [{min}, {max}]")]
    PartSizeOutOfRange {
        part_number: u32,
        size: u64,
        min: u64,
        max: u64,
    },

    #[error("Provider {provider} call failed: {message}")]
    ProviderCallFailed {
        provider: ProviderName,
        message: String,
    },

    #[error("Provider {provider} timed out during {operation}")]
    ProviderTimeout {
        provider: ProviderName,
        operation: String,
    },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Upload not found: {0}")]
    UploadNotFound(String),

    #[error("Upload {upload_id} expired at {expires_at}")]
    UploadExpired {
        upload_id: String,
        expires_at: DateTime<Utc>,
    },

    #[error("Upload {upload_id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        upload_id: String,
        from: UploadStatus,
        to: UploadStatus,
    },

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::DefinitionNotFound(_) => (
            404,
            "DEFINITION_NOT_FOUND",
            false,
            Some("List definitions to find a valid name"),
            false,
            LogLevel::Debug,
        ),
        AppError::DuplicateDefinition(_) => (
            409,
            "DUPLICATE_DEFINITION",
            false,
            Some("Register the definition under a unique name"),
            false,
            LogLevel::Warn,
        ),
        AppError::InvalidDefinition { .. } => (
            500,
            "INVALID_DEFINITION",
            false,
            Some("Fix the path definition before registering it"),
            true,
            LogLevel::Error,
        ),
        AppError::ScopeNotSupported { .. } => (
            400,
            "SCOPE_NOT_SUPPORTED",
            false,
            Some("Use one of the scopes listed for this definition and provider"),
            false,
            LogLevel::Debug,
        ),
        AppError::MissingParameter { .. } => (
            400,
            "MISSING_PARAMETER",
            false,
            Some("Supply the missing parameter and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidParameter { .. } => (
            400,
            "INVALID_PARAMETER",
            false,
            Some("Check the parameter against the definition's rules"),
            false,
            LogLevel::Debug,
        ),
        AppError::UnresolvedToken { .. } => (
            500,
            "UNRESOLVED_TOKEN",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        AppError::EmptyResolvedPath(_) => (
            400,
            "EMPTY_RESOLVED_PATH",
            false,
            Some("Provide a non-empty object path"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidProvider(_) => (
            400,
            "INVALID_PROVIDER",
            false,
            Some("Use one of: cdn, gcs, r2"),
            false,
            LogLevel::Debug,
        ),
        AppError::ProviderNotFound(_) => (
            404,
            "PROVIDER_NOT_FOUND",
            false,
            Some("List providers to find a configured one"),
            false,
            LogLevel::Debug,
        ),
        AppError::UnsupportedOperation { .. } => (
            400,
            "UNSUPPORTED_OPERATION",
            false,
            Some("Check the provider's capabilities before calling"),
            false,
            LogLevel::Debug,
        ),
        AppError::TooManyParts { .. } => (
            400,
            "TOO_MANY_PARTS",
            false,
            Some("Use larger parts to stay within the provider's part limit"),
            false,
            LogLevel::Debug,
        ),
        AppError::PartSizeOutOfRange { .. } => (
            400,
            "PART_SIZE_OUT_OF_RANGE",
            false,
            Some("Adjust part sizes to the provider's limits"),
            false,
            LogLevel::Debug,
        ),
        AppError::ProviderCallFailed { .. } => (
            502,
            "PROVIDER_CALL_FAILED",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Warn,
        ),
        AppError::ProviderTimeout { .. } => (
            504,
            "PROVIDER_TIMEOUT",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::ObjectNotFound(_) => (
            404,
            "OBJECT_NOT_FOUND",
            false,
            Some("Verify the object path exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::UploadNotFound(_) => (
            404,
            "UPLOAD_NOT_FOUND",
            false,
            Some("Verify the upload ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::UploadExpired { .. } => (
            410,
            "UPLOAD_EXPIRED",
            false,
            Some("Start a new upload"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidStateTransition { .. } => (
            409,
            "INVALID_STATE_TRANSITION",
            false,
            Some("Start a new upload; this one is already finished"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size or use a multipart upload"),
            false,
            LogLevel::Debug,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Field-level detail for validation errors, rendered into the response envelope.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::MissingParameter { parameter, details } => {
                Some(json!({ "parameter": parameter, "reason": details }))
            }
            AppError::InvalidParameter { parameter, reason } => {
                Some(json!({ "parameter": parameter, "reason": reason }))
            }
            AppError::ScopeNotSupported {
                definition,
                scope,
                provider,
            } => Some(json!({
                "definition": definition,
                "scope": scope,
                "provider": provider,
            })),
            AppError::UnsupportedOperation {
                provider,
                operation,
            } => Some(json!({ "provider": provider, "operation": operation })),
            AppError::TooManyParts { requested, max } => {
                Some(json!({ "requested": requested, "maxParts": max }))
            }
            AppError::PartSizeOutOfRange {
                part_number,
                size,
                min,
                max,
            } => Some(json!({
                "partNumber": part_number,
                "size": size,
                "minPartSize": min,
                "maxPartSize": max,
            })),
            AppError::InvalidStateTransition {
                upload_id,
                from,
                to,
            } => Some(json!({ "uploadId": upload_id, "from": from, "to": to })),
            AppError::UploadExpired {
                upload_id,
                expires_at,
            } => Some(json!({ "uploadId": upload_id, "expiresAt": expires_at })),
            _ => None,
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::UnresolvedToken { .. } | AppError::InvalidDefinition { .. } => {
                "Resource definition is misconfigured".to_string()
            }
            AppError::ProviderCallFailed { provider, .. } => {
                format!("Storage provider {} request failed", provider)
            }
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}
