use std::sync::Arc;

use assetgate_core::Config;

use crate::{CdnProvider, GcsProvider, ProviderAdapter, R2Provider, StorageError, StorageResult};

/// Create an adapter for every provider with a complete configuration.
///
/// The CDN and GCS adapters share one HTTP client and its connection pool;
/// R2 runs on the S3 SDK's own client.
pub fn create_providers(config: &Config) -> StorageResult<Vec<Arc<dyn ProviderAdapter>>> {
    let timeout = config.provider_timeout();
    let http = reqwest::Client::builder()
        .connect_timeout(timeout)
        .build()
        .map_err(|e| StorageError::ConfigError(format!("failed to build HTTP client: {}", e)))?;

    let mut providers: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    if let Some(cdn) = config.cdn() {
        providers.push(Arc::new(CdnProvider::new(cdn, http.clone(), timeout)));
    }

    if let Some(gcs) = config.gcs() {
        providers.push(Arc::new(GcsProvider::new(gcs, http.clone(), timeout)?));
    }

    if let Some(r2) = config.r2() {
        providers.push(Arc::new(R2Provider::new(r2, timeout)));
    }

    if providers.is_empty() {
        return Err(StorageError::ConfigError(
            "no storage provider is configured".to_string(),
        ));
    }

    tracing::info!(
        providers = ?providers.iter().map(|p| p.name().as_str()).collect::<Vec<_>>(),
        "Storage providers initialized"
    );
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::{BrokerConfig, ProviderName};
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config(Box::new(
            BrokerConfig::from_lookup(|key| vars.get(key).cloned()).unwrap(),
        ))
    }

    #[test]
    fn builds_only_configured_providers() {
        let config = config(&[
            ("CDN_BASE_URL", "https://cdn.example.com"),
            ("CDN_SIGNING_KEY", "k"),
            ("R2_ACCOUNT_ID", "acc"),
            ("R2_BUCKET", "assets"),
            ("R2_ACCESS_KEY_ID", "id"),
            ("R2_SECRET_ACCESS_KEY", "secret"),
        ]);
        let providers = create_providers(&config).unwrap();
        let names: Vec<_> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec![ProviderName::Cdn, ProviderName::R2]);
    }

    #[test]
    fn fails_without_providers() {
        assert!(create_providers(&config(&[])).is_err());
    }
}
