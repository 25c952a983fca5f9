//! Shared limits and defaults.

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;
pub const TIB: u64 = 1024 * GIB;

/// Shortest signed URL lifetime any provider accepts
pub const MIN_URL_EXPIRY_SECS: u64 = 1;
/// SigV4-style presigned URLs are capped at seven days
pub const MAX_URL_EXPIRY_SECS: u64 = 604_800;
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 900;

pub const DEFAULT_LIST_MAX_KEYS: u32 = 1000;

pub const UPLOAD_ID_PREFIX: &str = "upl_";
/// A confirmation may arrive this long after the upload's URL expired
pub const UPLOAD_CONFIRM_GRACE_SECS: i64 = 300;
