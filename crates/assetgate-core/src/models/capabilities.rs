use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::constants::{MAX_URL_EXPIRY_SECS, MIN_URL_EXPIRY_SECS};

/// Checksum algorithms a provider can verify on upload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Crc32,
    Crc32c,
    Sha1,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Crc32c => "crc32c",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "crc32" => Some(ChecksumAlgorithm::Crc32),
            "crc32c" => Some(ChecksumAlgorithm::Crc32c),
            "sha1" => Some(ChecksumAlgorithm::Sha1),
            "sha256" => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }
}

impl Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Operations gated by a provider's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Delete,
    List,
    Metadata,
    Multipart,
    ResumableUpload,
    SignedUrl,
    ResponseOverrides,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::List => "list",
            Operation::Metadata => "metadata",
            Operation::Multipart => "multipart",
            Operation::ResumableUpload => "resumable_upload",
            Operation::SignedUrl => "signed_url",
            Operation::ResponseOverrides => "response_overrides",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// Part size and count limits for multipart uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartLimits {
    pub min_part_size: u64,
    pub max_part_size: u64,
    pub max_parts: u32,
    /// Every part except the last must be a multiple of this many bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_alignment: Option<u64>,
}

impl MultipartLimits {
    pub fn new(min_part_size: u64, max_part_size: u64, max_parts: u32) -> Self {
        Self {
            min_part_size,
            max_part_size,
            max_parts,
            part_alignment: None,
        }
    }

    pub fn with_part_alignment(mut self, bytes: u64) -> Self {
        self.part_alignment = Some(bytes);
        self
    }
}

/// Static declaration of what a provider adapter supports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub supports_read: bool,
    pub supports_write: bool,
    pub supports_delete: bool,
    pub supports_list: bool,
    pub supports_metadata: bool,
    pub supports_multipart: bool,
    pub supports_resumable_uploads: bool,
    pub supports_signed_urls: bool,
    pub supports_response_overrides: bool,
    /// Objects are readable without a signature through a public base URL
    pub public_read: bool,
    pub checksum_algorithms: Vec<ChecksumAlgorithm>,
    pub max_single_upload_size: u64,
    pub min_url_expiry_secs: u64,
    pub max_url_expiry_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multipart: Option<MultipartLimits>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supports_read: false,
            supports_write: false,
            supports_delete: false,
            supports_list: false,
            supports_metadata: false,
            supports_multipart: false,
            supports_resumable_uploads: false,
            supports_signed_urls: false,
            supports_response_overrides: false,
            public_read: false,
            checksum_algorithms: Vec::new(),
            max_single_upload_size: 0,
            min_url_expiry_secs: MIN_URL_EXPIRY_SECS,
            max_url_expiry_secs: MAX_URL_EXPIRY_SECS,
            multipart: None,
        }
    }
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read(mut self) -> Self {
        self.supports_read = true;
        self
    }

    pub fn with_write(mut self) -> Self {
        self.supports_write = true;
        self
    }

    pub fn with_delete(mut self) -> Self {
        self.supports_delete = true;
        self
    }

    pub fn with_list(mut self) -> Self {
        self.supports_list = true;
        self
    }

    pub fn with_metadata(mut self) -> Self {
        self.supports_metadata = true;
        self
    }

    pub fn with_signed_urls(mut self) -> Self {
        self.supports_signed_urls = true;
        self
    }

    pub fn with_response_overrides(mut self) -> Self {
        self.supports_response_overrides = true;
        self
    }

    pub fn with_resumable_uploads(mut self) -> Self {
        self.supports_resumable_uploads = true;
        self
    }

    pub fn with_public_read(mut self) -> Self {
        self.public_read = true;
        self
    }

    pub fn with_multipart(mut self, limits: MultipartLimits) -> Self {
        self.supports_multipart = true;
        self.multipart = Some(limits);
        self
    }

    pub fn with_checksums(mut self, algorithms: &[ChecksumAlgorithm]) -> Self {
        self.checksum_algorithms = algorithms.to_vec();
        self.checksum_algorithms.sort();
        self.checksum_algorithms.dedup();
        self
    }

    pub fn with_max_single_upload_size(mut self, bytes: u64) -> Self {
        self.max_single_upload_size = bytes;
        self
    }

    pub fn with_url_expiry(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.min_url_expiry_secs = min_secs;
        self.max_url_expiry_secs = max_secs;
        self
    }

    pub fn supports(&self, operation: Operation) -> bool {
        match operation {
            Operation::Read => self.supports_read,
            Operation::Write => self.supports_write,
            Operation::Delete => self.supports_delete,
            Operation::List => self.supports_list,
            Operation::Metadata => self.supports_metadata,
            Operation::Multipart => self.supports_multipart && self.multipart.is_some(),
            Operation::ResumableUpload => self.supports_resumable_uploads,
            Operation::SignedUrl => self.supports_signed_urls,
            Operation::ResponseOverrides => self.supports_response_overrides,
        }
    }

    pub fn supports_checksum(&self, algorithm: ChecksumAlgorithm) -> bool {
        self.checksum_algorithms.contains(&algorithm)
    }

    pub fn expiry_in_range(&self, secs: u64) -> bool {
        secs >= self.min_url_expiry_secs && secs <= self.max_url_expiry_secs
    }
}
