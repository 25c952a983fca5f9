use assetgate_storage::StorageError;
use assetgate_worker::{CleanupFailure, CleanupHandler, CleanupJob};
use async_trait::async_trait;

use crate::providers::ProviderSet;

/// Deletes superseded objects through the provider adapters.
pub struct ProviderCleanup {
    providers: ProviderSet,
}

impl ProviderCleanup {
    pub fn new(providers: ProviderSet) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl CleanupHandler for ProviderCleanup {
    async fn cleanup(&self, job: &CleanupJob) -> Result<(), CleanupFailure> {
        let adapter = self
            .providers
            .get(job.provider)
            .map_err(|e| CleanupFailure::Permanent(e.to_string()))?;

        match adapter.delete_object(&job.path).await {
            Ok(()) => Ok(()),
            // Already gone
            Err(StorageError::NotFound(_)) => Ok(()),
            Err(e) if e.is_retryable() => Err(CleanupFailure::Retryable(e.to_string())),
            Err(e) => Err(CleanupFailure::Permanent(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::{Capabilities, ProviderName};
    use assetgate_storage::{MemoryProvider, ProviderAdapter};
    use std::sync::Arc;

    #[tokio::test]
    async fn maps_provider_errors() {
        let r2 = Arc::new(MemoryProvider::full(ProviderName::R2));
        let cdn = Arc::new(MemoryProvider::new(
            ProviderName::Cdn,
            Capabilities::new().with_read(),
        ));
        let handler = ProviderCleanup::new(ProviderSet::new([
            r2.clone() as Arc<dyn ProviderAdapter>,
            cdn as Arc<dyn ProviderAdapter>,
        ]));

        r2.fail_next_deletes(1).await;
        let job = CleanupJob::new(ProviderName::R2, "old.png", "test");
        assert!(handler.cleanup(&job).await.unwrap_err().is_retryable());
        assert!(handler.cleanup(&job).await.is_ok());

        let job = CleanupJob::new(ProviderName::Cdn, "old.png", "test");
        assert!(!handler.cleanup(&job).await.unwrap_err().is_retryable());

        let job = CleanupJob::new(ProviderName::Gcs, "old.png", "test");
        assert!(!handler.cleanup(&job).await.unwrap_err().is_retryable());
    }
}
