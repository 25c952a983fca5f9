use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::{ChecksumAlgorithm, HttpMethod};

/// A concrete, credential-free URL for one HTTP operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUrl {
    pub url: String,
    pub method: HttpMethod,
    /// Headers the client must send exactly as given
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ObjectUrl {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            expires_at: None,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// A checksum reported by the provider for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ObjectChecksum {
    pub algorithm: ChecksumAlgorithm,
    pub value: String,
}

/// Metadata of a stored object, as reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub etag: Option<String>,
    #[serde(default)]
    pub checksums: Vec<ObjectChecksum>,
    pub storage_class: Option<String>,
    pub acl: Option<String>,
    /// User-defined metadata (without the provider's header prefix)
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Changes applied by an update-metadata call. Unset fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[validate(length(min = 1, max = 255, message = "Content type must be between 1 and 255 characters"))]
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Replaces the object's custom metadata when present
    pub custom_metadata: Option<BTreeMap<String, String>>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.content_type.is_none()
            && self.content_encoding.is_none()
            && self.content_language.is_none()
            && self.content_disposition.is_none()
            && self.cache_control.is_none()
            && self.custom_metadata.is_none()
    }

    /// Apply the patch on top of existing metadata.
    pub fn apply_to(&self, metadata: &mut ObjectMetadata) {
        if let Some(v) = &self.content_type {
            metadata.content_type = Some(v.clone());
        }
        if let Some(v) = &self.content_encoding {
            metadata.content_encoding = Some(v.clone());
        }
        if let Some(v) = &self.content_language {
            metadata.content_language = Some(v.clone());
        }
        if let Some(v) = &self.content_disposition {
            metadata.content_disposition = Some(v.clone());
        }
        if let Some(v) = &self.cache_control {
            metadata.cache_control = Some(v.clone());
        }
        if let Some(custom) = &self.custom_metadata {
            metadata.custom_metadata = custom.clone();
        }
    }
}

/// Response headers a download URL asks the provider to override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOverrides {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    pub content_language: Option<String>,
    pub content_encoding: Option<String>,
}

impl ResponseOverrides {
    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }

    /// Query parameters understood by S3-compatible and GCS XML endpoints.
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("response-cache-control", &self.cache_control),
            ("response-content-disposition", &self.content_disposition),
            ("response-content-encoding", &self.content_encoding),
            ("response-content-language", &self.content_language),
            ("response-content-type", &self.content_type),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

/// One object in a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
}

/// A page of objects under a prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

/// Listing request passed to a provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub prefix: String,
    pub max_keys: u32,
    pub continuation_token: Option<String>,
}

/// A part the client intends to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartRequest {
    pub part_number: u32,
    /// Base64 MD5 of the part, signed into the part URL when present
    #[serde(default)]
    pub checksum: Option<String>,
    /// Declared size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

impl PartRequest {
    pub fn new(part_number: u32) -> Self {
        Self {
            part_number,
            checksum: None,
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }
}

/// Signed URL for a single part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartUrl {
    pub part_number: u32,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// Everything a client needs to drive a multipart upload directly against the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUrls {
    pub parts: Vec<PartUrl>,
    pub complete: ObjectUrl,
    pub abort: ObjectUrl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_overrides_are_sorted_query_pairs() {
        let overrides = ResponseOverrides {
            content_type: Some("image/png".to_string()),
            content_disposition: Some("attachment".to_string()),
            ..Default::default()
        };
        assert_eq!(
            overrides.query_pairs(),
            vec![
                ("response-content-disposition", "attachment"),
                ("response-content-type", "image/png"),
            ]
        );
        assert!(ResponseOverrides::default().is_empty());
    }

    #[test]
    fn metadata_patch_replaces_custom_metadata() {
        let mut metadata = ObjectMetadata {
            key: "a.png".to_string(),
            content_type: Some("image/jpeg".to_string()),
            custom_metadata: BTreeMap::from([("old".to_string(), "1".to_string())]),
            ..Default::default()
        };
        let patch = MetadataPatch {
            content_type: Some("image/png".to_string()),
            custom_metadata: Some(BTreeMap::from([("new".to_string(), "2".to_string())])),
            ..Default::default()
        };
        patch.apply_to(&mut metadata);
        assert_eq!(metadata.content_type.as_deref(), Some("image/png"));
        assert_eq!(metadata.custom_metadata.len(), 1);
        assert_eq!(metadata.custom_metadata["new"], "2");
    }
}
