//! Cleanup job and handler trait
//!
//! The services crate implements [`CleanupHandler`] on top of the provider
//! adapters. The queue only decides when to call it and whether to retry.

use assetgate_core::ProviderName;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Deletion of one object that is no longer referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupJob {
    pub provider: ProviderName,
    pub path: String,
    /// Why the object became obsolete, for logs
    pub reason: String,
    /// Attempts made so far
    pub attempt: u32,
}

impl CleanupJob {
    pub fn new(provider: ProviderName, path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider,
            path: path.into(),
            reason: reason.into(),
            attempt: 0,
        }
    }
}

/// Outcome of a failed cleanup attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CleanupFailure {
    /// Transient failure; the job is retried with backoff
    #[error("retryable: {0}")]
    Retryable(String),
    /// The job can never succeed (unsupported operation, invalid key)
    #[error("permanent: {0}")]
    Permanent(String),
}

impl CleanupFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CleanupFailure::Retryable(_))
    }
}

#[async_trait]
pub trait CleanupHandler: Send + Sync {
    async fn cleanup(&self, job: &CleanupJob) -> Result<(), CleanupFailure>;
}
