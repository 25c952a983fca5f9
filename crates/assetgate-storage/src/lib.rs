//! Assetgate Storage Library
//!
//! Provider adapters turn a rendered object path into provider-specific
//! operations: signed URLs, multipart session primitives, listing, metadata
//! and deletion. Every adapter implements [`ProviderAdapter`] and reports a
//! [`Capabilities`](assetgate_core::Capabilities) value; operations outside
//! that set fail fast with [`StorageError::Unsupported`].
//!
//! # Key format
//!
//! Object keys are the paths rendered from path definitions. Keys must be
//! non-empty, must not start with `/` and must not contain `..` segments.
//! Validation is centralized in the `keys` module.

pub(crate) mod call;
pub mod cdn;
pub mod factory;
pub mod gcs;
pub(crate) mod keys;
pub mod memory;
pub mod r2;
pub mod traits;

// Re-export commonly used types
pub use cdn::CdnProvider;
pub use factory::create_providers;
pub use gcs::GcsProvider;
pub use memory::MemoryProvider;
pub use r2::R2Provider;
pub use traits::{ProviderAdapter, SignRequest, StorageError, StorageResult};
