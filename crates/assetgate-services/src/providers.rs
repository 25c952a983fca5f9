use std::collections::BTreeMap;
use std::sync::Arc;

use assetgate_core::models::requests::ProviderSummary;
use assetgate_core::{AppError, AppResult, ProviderName};
use assetgate_storage::ProviderAdapter;

/// Configured provider adapters, keyed by name.
#[derive(Clone, Default)]
pub struct ProviderSet {
    adapters: BTreeMap<ProviderName, Arc<dyn ProviderAdapter>>,
}

impl ProviderSet {
    pub fn new(adapters: impl IntoIterator<Item = Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            adapters: adapters
                .into_iter()
                .map(|adapter| (adapter.name(), adapter))
                .collect(),
        }
    }

    pub fn get(&self, name: ProviderName) -> AppResult<&Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&name)
            .ok_or(AppError::ProviderNotFound(name))
    }

    pub fn names(&self) -> Vec<ProviderName> {
        self.adapters.keys().copied().collect()
    }

    pub fn summaries(&self) -> Vec<ProviderSummary> {
        self.adapters
            .values()
            .map(|adapter| ProviderSummary {
                name: adapter.name(),
                capabilities: adapter.capabilities().clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_storage::MemoryProvider;

    #[test]
    fn unknown_provider_is_not_found() {
        let set = ProviderSet::new([
            Arc::new(MemoryProvider::full(ProviderName::R2)) as Arc<dyn ProviderAdapter>
        ]);
        assert!(set.get(ProviderName::R2).is_ok());
        assert!(matches!(
            set.get(ProviderName::Gcs),
            Err(AppError::ProviderNotFound(ProviderName::Gcs))
        ));
        assert_eq!(set.names(), vec![ProviderName::R2]);
    }
}
