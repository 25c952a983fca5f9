//! Resource manager facade
//!
//! Wires the registry, provider set, resolver, upload store and cleanup queue
//! together and exposes the read-only catalog views the API serves.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use assetgate_core::models::requests::{DefinitionSummary, ParameterSummary, ProviderSummary};
use assetgate_core::{AppResult, Config, UploadConfig};
use assetgate_storage::ProviderAdapter;
use assetgate_worker::{CleanupQueue, CleanupQueueConfig, CleanupStats};
use tokio::task::JoinHandle;

use crate::catalog::register_builtin;
use crate::providers::ProviderSet;
use crate::registry::{DefinitionChain, DefinitionRegistry};
use crate::resolver::{ResolverSettings, UrlResolver};
use crate::uploads::{MemoryUploadStore, ProviderCleanup, UploadManager, UploadStore};

pub struct ResourceManager {
    registry: Arc<DefinitionRegistry>,
    resolver: Arc<UrlResolver>,
    uploads: Arc<UploadManager>,
    cleanup: CleanupQueue,
    sweeper: Option<JoinHandle<()>>,
}

impl ResourceManager {
    /// Build the manager from configuration, registering the built-in catalog.
    ///
    /// Must be called from within a Tokio runtime: the cleanup workers and
    /// the upload sweeper are spawned here.
    pub fn new(config: &Config, providers: Vec<Arc<dyn ProviderAdapter>>) -> AppResult<Self> {
        let registry = Arc::new(DefinitionRegistry::new());
        register_builtin(&registry, config.asset_environment())?;

        let mut manager = Self::with_parts(
            registry,
            ProviderSet::new(providers),
            ResolverSettings::from(config),
            Arc::new(MemoryUploadStore::new()),
            CleanupQueueConfig::from(config.cleanup()),
        );
        manager.sweeper = Some(spawn_sweeper(manager.uploads.clone(), config.uploads()));
        Ok(manager)
    }

    pub fn with_parts(
        registry: Arc<DefinitionRegistry>,
        providers: ProviderSet,
        settings: ResolverSettings,
        store: Arc<dyn UploadStore>,
        cleanup_config: CleanupQueueConfig,
    ) -> Self {
        let cleanup = CleanupQueue::start(
            cleanup_config,
            Arc::new(ProviderCleanup::new(providers.clone())),
        );
        let resolver = Arc::new(UrlResolver::new(registry.clone(), providers, settings));
        let uploads = Arc::new(UploadManager::new(resolver.clone(), store, cleanup.clone()));

        tracing::info!(
            definitions = registry.len(),
            providers = ?resolver.providers().names(),
            "Resource manager ready"
        );

        Self {
            registry,
            resolver,
            uploads,
            cleanup,
            sweeper: None,
        }
    }

    pub fn registry(&self) -> &DefinitionRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &UrlResolver {
        &self.resolver
    }

    pub fn uploads(&self) -> &UploadManager {
        &self.uploads
    }

    pub fn cleanup_stats(&self) -> CleanupStats {
        self.cleanup.stats()
    }

    pub fn provider_summaries(&self) -> Vec<ProviderSummary> {
        self.resolver.providers().summaries()
    }

    /// Every registered definition, in registration order.
    pub fn definitions(&self) -> Vec<DefinitionSummary> {
        self.registry.list_all().iter().map(describe).collect()
    }

    pub fn definition(&self, name: &str) -> AppResult<DefinitionSummary> {
        Ok(describe(&self.registry.lookup(name)?))
    }

    /// Stop the upload sweeper and drain the cleanup queue.
    pub async fn shutdown(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.abort();
        }
        self.cleanup.shutdown().await;
    }
}

fn spawn_sweeper(uploads: Arc<UploadManager>, config: &UploadConfig) -> JoinHandle<()> {
    let retention = config.retention();
    let period = config.sweep_interval().max(Duration::from_secs(1));
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = period.as_secs(),
        "Upload sweeper started"
    );
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            uploads.sweep(retention).await;
        }
    })
}

fn describe(chain: &DefinitionChain) -> DefinitionSummary {
    let target = chain.target();

    let parameters = chain
        .parameters()
        .into_iter()
        .map(|p| ParameterSummary {
            name: p.name.clone(),
            description: p.description.clone(),
            default: p.default.clone(),
            required: p.is_required(),
            rules: p.rules.iter().map(|r| r.to_string()).collect(),
            fallback: p.fallback.as_ref().map(|f| f.to_string()),
        })
        .collect();

    let patterns = target
        .patterns
        .iter()
        .map(|(provider, by_scope)| {
            let by_scope: BTreeMap<_, _> = by_scope
                .iter()
                .map(|(scope, pattern)| (*scope, pattern.pattern.clone()))
                .collect();
            (*provider, by_scope)
        })
        .collect();

    DefinitionSummary {
        name: target.name.clone(),
        display_name: target.display_name.clone(),
        description: target.description.clone(),
        allowed_scopes: target.allowed_scopes.clone(),
        parameters,
        providers: target.providers(),
        patterns,
        parent: chain.parent().map(|p| p.name.clone()),
        child: target.child.as_ref().map(|c| c.name.clone()),
    }
}
