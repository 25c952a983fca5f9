//! Test helpers: build the router over in-process memory providers.
//!
//! Run with `cargo test -p assetgate-api`. No network access is needed.

use std::collections::HashMap;
use std::sync::Arc;

use assetgate_api::setup::routes;
use assetgate_api::state::AppState;
use assetgate_core::constants::MIB;
use assetgate_core::{BrokerConfig, Capabilities, ChecksumAlgorithm, Config, ProviderName};
use assetgate_services::ResourceManager;
use assetgate_storage::{MemoryProvider, ProviderAdapter};
use axum_test::TestServer;

pub const ACHIEVEMENT_ID: &str = "11111111-1111-1111-1111-111111111111";

#[allow(dead_code)]
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    /// Full-featured object store
    pub r2: Arc<MemoryProvider>,
    /// Public CDN without multipart, listing or deletes
    pub cdn: Arc<MemoryProvider>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn test_config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("ASSET_ENVIRONMENT", "dev"),
        ("SCOPE_APP_NAMES", "7=rowing"),
        ("CLEANUP_BACKOFF_BASE_MS", "1"),
    ]);
    let config = BrokerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
        .expect("Failed to build test config");
    Config(Box::new(config))
}

/// Setup the app. Must run inside a Tokio runtime.
pub fn setup_test_app() -> TestApp {
    let r2 = Arc::new(MemoryProvider::full(ProviderName::R2));
    let cdn = Arc::new(
        MemoryProvider::new(
            ProviderName::Cdn,
            Capabilities::new()
                .with_read()
                .with_write()
                .with_signed_urls()
                .with_public_read()
                .with_checksums(&[ChecksumAlgorithm::Sha256])
                .with_max_single_upload_size(512 * MIB)
                .with_url_expiry(60, 604_800),
        )
        .with_public_base_url("https://cdn.example.com"),
    );

    let config = test_config();
    let resources = ResourceManager::new(
        &config,
        vec![
            r2.clone() as Arc<dyn ProviderAdapter>,
            cdn.clone() as Arc<dyn ProviderAdapter>,
        ],
    )
    .expect("Failed to build resource manager");
    let state = Arc::new(AppState::new(Arc::new(resources)));

    let router = routes::setup_routes(&config, state.clone()).expect("Failed to build routes");
    let server = TestServer::new(router.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        r2,
        cdn,
    }
}
