//! Application state shared by every handler.

use std::sync::Arc;

use assetgate_services::ResourceManager;

pub struct AppState {
    pub resources: Arc<ResourceManager>,
}

impl AppState {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self { resources }
    }
}
