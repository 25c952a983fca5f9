//! Assetgate Core Library
//!
//! This crate provides the domain models, error types and configuration
//! shared by every assetgate component: path definitions, scopes, provider
//! capabilities, signed URLs and tracked uploads.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{
    BaseConfig, BrokerConfig, CdnConfig, CleanupConfig, Config, GcsConfig, R2Config, ScopeNames,
    UploadConfig,
};
pub use error::{AppError, AppResult, ErrorMetadata, LogLevel};
pub use models::{
    Capabilities, ChecksumAlgorithm, HttpMethod, MultipartLimits, ObjectMetadata, ObjectUrl,
    Operation, ProviderName, ScopeType,
};
