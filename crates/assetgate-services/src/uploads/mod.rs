//! Upload tracking: records, their store and cleanup of superseded objects.

pub mod cleanup;
pub mod manager;
pub mod store;

pub use cleanup::ProviderCleanup;
pub use manager::UploadManager;
pub use store::{MemoryUploadStore, ReferenceKey, UploadChange, UploadStore};
