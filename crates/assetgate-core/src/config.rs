//! Configuration module
//!
//! All settings come from the process environment (optionally seeded from a
//! `.env` file). A provider is only configured when its required keys are set;
//! setting some of a provider's keys but not all of them is a startup error.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_URL_EXPIRY_SECS, MAX_URL_EXPIRY_SECS, MIN_URL_EXPIRY_SECS};
use crate::models::{ProviderName, ScopeValue};

const SERVER_PORT: u16 = 4000;
const PROVIDER_TIMEOUT_SECS: u64 = 10;
const METADATA_READ_ATTEMPTS: u32 = 3;
const CLEANUP_MAX_WORKERS: usize = 4;
const CLEANUP_QUEUE_CAPACITY: usize = 256;
const CLEANUP_MAX_RETRIES: u32 = 3;
const CLEANUP_BACKOFF_BASE_MS: u64 = 500;
const CLEANUP_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
const UPLOAD_RETENTION_SECS: u64 = 86_400;
const UPLOAD_SWEEP_INTERVAL_SECS: u64 = 300;
const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Server-level settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    /// `compact` or `json`
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct CdnConfig {
    pub base_url: String,
    pub signing_key: String,
    /// Storage API used for deletes; deletes are unsupported without it
    pub storage_api_url: Option<String>,
    pub storage_api_key: Option<String>,
}

#[derive(Clone, Debug)]
pub struct GcsConfig {
    pub bucket: String,
    /// Service account key file; signs URLs and authorizes JSON API calls
    pub service_account_path: String,
    /// Base URL of the JSON API (resumable sessions, object metadata)
    pub endpoint: String,
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct R2Config {
    pub account_id: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: String,
    pub public_base_url: Option<String>,
}

/// Background cleanup of superseded objects
#[derive(Clone, Debug)]
pub struct CleanupConfig {
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// How long shutdown waits for accepted jobs to finish
    pub shutdown_timeout_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_workers: CLEANUP_MAX_WORKERS,
            queue_capacity: CLEANUP_QUEUE_CAPACITY,
            max_retries: CLEANUP_MAX_RETRIES,
            backoff_base_ms: CLEANUP_BACKOFF_BASE_MS,
            shutdown_timeout_secs: CLEANUP_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

/// Retention of tracked upload records
#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Finished records, and pending ones past their expiry, are kept this long
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retention_secs: UPLOAD_RETENTION_SECS,
            sweep_interval_secs: UPLOAD_SWEEP_INTERVAL_SECS,
        }
    }
}

impl UploadConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Scope value to human name tables used by scope fallbacks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScopeNames {
    pub apps: BTreeMap<ScopeValue, String>,
    pub client_apps: BTreeMap<ScopeValue, String>,
}

impl ScopeNames {
    pub fn with_app(mut self, id: ScopeValue, name: impl Into<String>) -> Self {
        self.apps.insert(id, name.into());
        self
    }

    pub fn with_client_app(mut self, id: ScopeValue, name: impl Into<String>) -> Self {
        self.client_apps.insert(id, name.into());
        self
    }

    pub fn app_name(&self, id: ScopeValue) -> Option<&str> {
        self.apps.get(&id).map(String::as_str)
    }

    pub fn client_app_name(&self, id: ScopeValue) -> Option<&str> {
        self.client_apps.get(&id).map(String::as_str)
    }

    /// Parse a `1=rowing,2=bike` table.
    pub fn parse_table(key: &str, raw: &str) -> Result<BTreeMap<ScopeValue, String>, anyhow::Error> {
        let mut table = BTreeMap::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (id, name) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("{} entry '{}' must look like id=name", key, entry))?;
            let id: ScopeValue = id
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} id '{}' is not an integer", key, id.trim()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(anyhow::anyhow!("{} entry for id {} has an empty name", key, id));
            }
            table.insert(id, name.to_string());
        }
        Ok(table)
    }
}

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub base: BaseConfig,
    /// Value of the `environment` path parameter, e.g. `dev` or `prod`
    pub asset_environment: String,
    pub default_url_expiry_secs: u64,
    pub provider_timeout_secs: u64,
    pub metadata_read_attempts: u32,
    pub cdn: Option<CdnConfig>,
    pub gcs: Option<GcsConfig>,
    pub r2: Option<R2Config>,
    pub cleanup: CleanupConfig,
    pub uploads: UploadConfig,
    pub scope_names: ScopeNames,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<BrokerConfig>);

impl Config {
    fn as_broker(&self) -> &BrokerConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = BrokerConfig::from_lookup(|key| env::var(key).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.as_broker().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        is_production_env(&self.as_broker().base.environment)
    }

    pub fn server_port(&self) -> u16 {
        self.as_broker().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.as_broker().base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.as_broker().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.as_broker().base.log_format
    }

    pub fn asset_environment(&self) -> &str {
        &self.as_broker().asset_environment
    }

    pub fn default_url_expiry_secs(&self) -> u64 {
        self.as_broker().default_url_expiry_secs
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.as_broker().provider_timeout_secs)
    }

    pub fn metadata_read_attempts(&self) -> u32 {
        self.as_broker().metadata_read_attempts
    }

    pub fn cdn(&self) -> Option<&CdnConfig> {
        self.as_broker().cdn.as_ref()
    }

    pub fn gcs(&self) -> Option<&GcsConfig> {
        self.as_broker().gcs.as_ref()
    }

    pub fn r2(&self) -> Option<&R2Config> {
        self.as_broker().r2.as_ref()
    }

    pub fn cleanup(&self) -> &CleanupConfig {
        &self.as_broker().cleanup
    }

    pub fn uploads(&self) -> &UploadConfig {
        &self.as_broker().uploads
    }

    pub fn scope_names(&self) -> &ScopeNames {
        &self.as_broker().scope_names
    }

    /// Providers with a complete configuration, in canonical order
    pub fn configured_providers(&self) -> Vec<ProviderName> {
        let broker = self.as_broker();
        let mut providers = Vec::new();
        if broker.cdn.is_some() {
            providers.push(ProviderName::Cdn);
        }
        if broker.gcs.is_some() {
            providers.push(ProviderName::Gcs);
        }
        if broker.r2.is_some() {
            providers.push(ProviderName::R2);
        }
        providers
    }
}

pub fn is_production_env(environment: &str) -> bool {
    let env = environment.to_lowercase();
    env == "production" || env == "prod"
}

/// Read a group of keys that configures one provider.
///
/// Returns `None` when none of the required keys are set, and an error naming
/// the first missing key when only some of them are.
fn required_group<F>(
    lookup: &F,
    provider: &str,
    keys: &[&str],
) -> Result<Option<Vec<String>>, anyhow::Error>
where
    F: Fn(&str) -> Option<String>,
{
    let values: Vec<Option<String>> = keys
        .iter()
        .map(|k| lookup(k).filter(|v| !v.trim().is_empty()))
        .collect();

    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let mut present = Vec::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(values) {
        match value {
            Some(v) => present.push(v.trim().to_string()),
            None => {
                return Err(anyhow::anyhow!(
                    "{} is required when configuring the {} provider",
                    key,
                    provider
                ))
            }
        }
    }
    Ok(Some(present))
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
}

impl BrokerConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cors_origins_str = lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string());
        if is_production_env(&environment) && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let base = BaseConfig {
            server_port: lookup("PORT")
                .unwrap_or_else(|| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            environment,
            log_format: lookup("LOG_FORMAT").unwrap_or_else(|| "compact".to_string()),
        };

        let cdn = required_group(&lookup, "cdn", &["CDN_BASE_URL", "CDN_SIGNING_KEY"])?.map(
            |values| CdnConfig {
                base_url: values[0].trim_end_matches('/').to_string(),
                signing_key: values[1].clone(),
                storage_api_url: optional(&lookup, "CDN_STORAGE_API_URL"),
                storage_api_key: optional(&lookup, "CDN_STORAGE_API_KEY"),
            },
        );

        let gcs = required_group(
            &lookup,
            "gcs",
            &["GCS_BUCKET", "GCS_SERVICE_ACCOUNT_PATH"],
        )?
        .map(|values| GcsConfig {
            bucket: values[0].clone(),
            service_account_path: values[1].clone(),
            endpoint: optional(&lookup, "GCS_ENDPOINT").unwrap_or_else(|| GCS_ENDPOINT.to_string()),
            public_base_url: optional(&lookup, "GCS_PUBLIC_BASE_URL"),
        });

        let r2 = required_group(
            &lookup,
            "r2",
            &[
                "R2_ACCOUNT_ID",
                "R2_BUCKET",
                "R2_ACCESS_KEY_ID",
                "R2_SECRET_ACCESS_KEY",
            ],
        )?
        .map(|values| R2Config {
            endpoint: optional(&lookup, "R2_ENDPOINT")
                .unwrap_or_else(|| format!("https://{}.r2.cloudflarestorage.com", values[0])),
            account_id: values[0].clone(),
            bucket: values[1].clone(),
            access_key_id: values[2].clone(),
            secret_access_key: values[3].clone(),
            public_base_url: optional(&lookup, "R2_PUBLIC_BASE_URL"),
        });

        let cleanup = CleanupConfig {
            max_workers: lookup("CLEANUP_MAX_WORKERS")
                .unwrap_or_else(|| CLEANUP_MAX_WORKERS.to_string())
                .parse()
                .unwrap_or(CLEANUP_MAX_WORKERS),
            queue_capacity: lookup("CLEANUP_QUEUE_CAPACITY")
                .unwrap_or_else(|| CLEANUP_QUEUE_CAPACITY.to_string())
                .parse()
                .unwrap_or(CLEANUP_QUEUE_CAPACITY),
            max_retries: lookup("CLEANUP_MAX_RETRIES")
                .unwrap_or_else(|| CLEANUP_MAX_RETRIES.to_string())
                .parse()
                .unwrap_or(CLEANUP_MAX_RETRIES),
            backoff_base_ms: lookup("CLEANUP_BACKOFF_BASE_MS")
                .unwrap_or_else(|| CLEANUP_BACKOFF_BASE_MS.to_string())
                .parse()
                .unwrap_or(CLEANUP_BACKOFF_BASE_MS),
            shutdown_timeout_secs: lookup("CLEANUP_SHUTDOWN_TIMEOUT_SECS")
                .unwrap_or_else(|| CLEANUP_SHUTDOWN_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CLEANUP_SHUTDOWN_TIMEOUT_SECS),
        };

        let uploads = UploadConfig {
            retention_secs: lookup("UPLOAD_RETENTION_SECS")
                .unwrap_or_else(|| UPLOAD_RETENTION_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_RETENTION_SECS),
            sweep_interval_secs: lookup("UPLOAD_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|| UPLOAD_SWEEP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(UPLOAD_SWEEP_INTERVAL_SECS),
        };

        let scope_names = ScopeNames {
            apps: ScopeNames::parse_table(
                "SCOPE_APP_NAMES",
                &lookup("SCOPE_APP_NAMES").unwrap_or_default(),
            )?,
            client_apps: ScopeNames::parse_table(
                "SCOPE_CLIENT_APP_NAMES",
                &lookup("SCOPE_CLIENT_APP_NAMES").unwrap_or_default(),
            )?,
        };

        Ok(BrokerConfig {
            base,
            asset_environment: lookup("ASSET_ENVIRONMENT").unwrap_or_else(|| "dev".to_string()),
            default_url_expiry_secs: lookup("DEFAULT_URL_EXPIRY_SECS")
                .unwrap_or_else(|| DEFAULT_URL_EXPIRY_SECS.to_string())
                .parse()
                .unwrap_or(DEFAULT_URL_EXPIRY_SECS),
            provider_timeout_secs: lookup("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|| PROVIDER_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
            metadata_read_attempts: lookup("METADATA_READ_ATTEMPTS")
                .unwrap_or_else(|| METADATA_READ_ATTEMPTS.to_string())
                .parse()
                .unwrap_or(METADATA_READ_ATTEMPTS),
            cdn,
            gcs,
            r2,
            cleanup,
            uploads,
            scope_names,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.cdn.is_none() && self.gcs.is_none() && self.r2.is_none() {
            return Err(anyhow::anyhow!(
                "No storage provider configured. Set the CDN_*, GCS_* or R2_* variables."
            ));
        }

        if !(MIN_URL_EXPIRY_SECS..=MAX_URL_EXPIRY_SECS).contains(&self.default_url_expiry_secs) {
            return Err(anyhow::anyhow!(
                "DEFAULT_URL_EXPIRY_SECS must be between {} and {}",
                MIN_URL_EXPIRY_SECS,
                MAX_URL_EXPIRY_SECS
            ));
        }

        if self.provider_timeout_secs == 0 {
            return Err(anyhow::anyhow!("PROVIDER_TIMEOUT_SECS must be greater than 0"));
        }

        if self.metadata_read_attempts == 0 {
            return Err(anyhow::anyhow!("METADATA_READ_ATTEMPTS must be at least 1"));
        }

        if self.cleanup.max_workers == 0 || self.cleanup.queue_capacity == 0 {
            return Err(anyhow::anyhow!(
                "CLEANUP_MAX_WORKERS and CLEANUP_QUEUE_CAPACITY must be greater than 0"
            ));
        }

        if self.uploads.sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!("UPLOAD_SWEEP_INTERVAL_SECS must be greater than 0"));
        }

        if self.asset_environment.trim().is_empty() {
            return Err(anyhow::anyhow!("ASSET_ENVIRONMENT cannot be empty"));
        }

        if let Some(cdn) = &self.cdn {
            if !cdn.base_url.starts_with("http://") && !cdn.base_url.starts_with("https://") {
                return Err(anyhow::anyhow!("CDN_BASE_URL must be an http(s) URL"));
            }
            if cdn.storage_api_url.is_some() != cdn.storage_api_key.is_some() {
                return Err(anyhow::anyhow!(
                    "CDN_STORAGE_API_URL and CDN_STORAGE_API_KEY must be set together"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<BrokerConfig, anyhow::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BrokerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_variables() {
        let config = load(&[]).unwrap();
        assert_eq!(config.base.server_port, 4000);
        assert_eq!(config.asset_environment, "dev");
        assert_eq!(config.default_url_expiry_secs, DEFAULT_URL_EXPIRY_SECS);
        assert_eq!(config.cleanup.max_workers, CLEANUP_MAX_WORKERS);
        assert_eq!(config.cleanup.shutdown_timeout_secs, CLEANUP_SHUTDOWN_TIMEOUT_SECS);
        assert_eq!(config.uploads.retention(), Duration::from_secs(UPLOAD_RETENTION_SECS));
        assert!(config.r2.is_none());
        // Nothing configured is a validation error, not a load error
        assert!(config.validate().is_err());
    }

    #[test]
    fn r2_endpoint_is_derived_from_account() {
        let config = load(&[
            ("R2_ACCOUNT_ID", "acc123"),
            ("R2_BUCKET", "assets"),
            ("R2_ACCESS_KEY_ID", "key"),
            ("R2_SECRET_ACCESS_KEY", "secret"),
        ])
        .unwrap();
        let r2 = config.r2.as_ref().unwrap();
        assert_eq!(r2.endpoint, "https://acc123.r2.cloudflarestorage.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_provider_group_is_rejected() {
        let err = load(&[("GCS_BUCKET", "b")]).unwrap_err();
        assert!(err.to_string().contains("GCS_SERVICE_ACCOUNT_PATH"));
    }

    #[test]
    fn wildcard_cors_is_rejected_in_production() {
        assert!(load(&[("ENVIRONMENT", "production")]).is_err());
        assert!(load(&[
            ("ENVIRONMENT", "production"),
            ("CORS_ORIGINS", "https://admin.example.com")
        ])
        .is_ok());
    }

    #[test]
    fn scope_name_tables_are_parsed() {
        let config = load(&[
            ("SCOPE_APP_NAMES", "1=rowing, 2=bike"),
            ("SCOPE_CLIENT_APP_NAMES", "10=gym-west"),
        ])
        .unwrap();
        assert_eq!(config.scope_names.app_name(2), Some("bike"));
        assert_eq!(config.scope_names.client_app_name(10), Some("gym-west"));
        assert_eq!(config.scope_names.app_name(3), None);

        assert!(load(&[("SCOPE_APP_NAMES", "rowing")]).is_err());
        assert!(load(&[("SCOPE_APP_NAMES", "x=rowing")]).is_err());
    }

    #[test]
    fn cdn_storage_api_must_be_complete() {
        let config = load(&[
            ("CDN_BASE_URL", "https://cdn.example.com/"),
            ("CDN_SIGNING_KEY", "k"),
            ("CDN_STORAGE_API_URL", "https://storage.example.com"),
        ])
        .unwrap();
        assert_eq!(config.cdn.as_ref().unwrap().base_url, "https://cdn.example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let config = load(&[
            ("CDN_BASE_URL", "https://cdn.example.com"),
            ("CDN_SIGNING_KEY", "k"),
            ("UPLOAD_SWEEP_INTERVAL_SECS", "0"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }
}
