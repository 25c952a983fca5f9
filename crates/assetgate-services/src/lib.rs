//! Assetgate Services Layer
//!
//! Hosts the definition registry, parameter resolution and path rendering,
//! the URL resolver that turns rendered paths into signed provider URLs, and
//! upload tracking. The API crate talks to [`ResourceManager`] only and keeps
//! HTTP handling thin.

pub mod catalog;
pub mod manager;
pub mod multipart;
pub mod params;
pub mod providers;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod retry;
pub mod uploads;

pub use manager::ResourceManager;
pub use providers::ProviderSet;
pub use registry::{DefinitionChain, DefinitionRegistry};
pub use resolver::{MultipartInit, ResolveOptions, ResolvedPath, ResolverSettings, UrlResolver};
pub use uploads::{MemoryUploadStore, ProviderCleanup, UploadManager, UploadStore};
