use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{MultipartLimits, ProviderName, ScopeType};
use crate::constants::UPLOAD_ID_PREFIX;
use crate::error::{AppError, AppResult};

/// Opaque upload identifier, `upl_` followed by a v4 UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn new() -> Self {
        UploadId(format!("{}{}", UPLOAD_ID_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for UploadId {
    fn from(value: String) -> Self {
        UploadId(value)
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        UploadId(value.to_string())
    }
}

impl Display for UploadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    #[default]
    Simple,
    Multipart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Initiated,
    Confirmed,
    Failed,
    Aborted,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UploadStatus::Initiated)
    }

    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (
                UploadStatus::Initiated,
                UploadStatus::Confirmed | UploadStatus::Failed | UploadStatus::Aborted
            )
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Initiated => "initiated",
            UploadStatus::Confirmed => "confirmed",
            UploadStatus::Failed => "failed",
            UploadStatus::Aborted => "aborted",
        }
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// The application record field an upload populates, e.g. an achievement's icon.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, Validate)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64, message = "Resource type must be between 1 and 64 characters"))]
    pub resource_type: String,
    #[serde(rename = "id")]
    #[validate(length(min = 1, max = 128, message = "Resource id must be between 1 and 128 characters"))]
    pub resource_id: String,
    #[validate(length(min = 1, max = 64, message = "Field must be between 1 and 64 characters"))]
    pub field: String,
}

impl ResourceRef {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            field: field.into(),
        }
    }
}

/// One part of a multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    pub part_number: u32,
    pub checksum: Option<String>,
    pub size: Option<u64>,
    /// Filled in on confirmation
    pub etag: Option<String>,
}

/// Provider-side multipart session owned by an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartSession {
    pub provider_upload_id: String,
    pub path: String,
    /// Ordered by part number
    pub parts: Vec<PartRecord>,
    /// Limits captured at initiation
    pub limits: MultipartLimits,
}

impl MultipartSession {
    pub fn new(provider_upload_id: String, path: String, limits: MultipartLimits) -> Self {
        Self {
            provider_upload_id,
            path,
            parts: Vec::new(),
            limits,
        }
    }

    /// Insert or replace a part record, keeping the list ordered.
    pub fn upsert_part(&mut self, record: PartRecord) {
        match self
            .parts
            .binary_search_by_key(&record.part_number, |p| p.part_number)
        {
            Ok(idx) => self.parts[idx] = record,
            Err(idx) => self.parts.insert(idx, record),
        }
    }
}

/// A tracked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: UploadId,
    pub definition: String,
    pub resource: ResourceRef,
    pub provider: ProviderName,
    pub scope: ScopeType,
    pub upload_type: UploadType,
    pub status: UploadStatus,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub previous_path: Option<String>,
    pub error_message: Option<String>,
    pub etag: Option<String>,
    pub multipart: Option<MultipartSession>,
}

impl Upload {
    /// Move to `next`, leaving the record untouched if the transition is not allowed.
    pub fn transition(&mut self, next: UploadStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition {
                upload_id: self.id.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Fail with `UploadExpired` once a pending upload is more than `grace` past `expires_at`.
    pub fn ensure_unexpired(&self, now: DateTime<Utc>, grace: chrono::Duration) -> AppResult<()> {
        if self.status == UploadStatus::Initiated && now > self.expires_at + grace {
            return Err(AppError::UploadExpired {
                upload_id: self.id.to_string(),
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Whether the store may drop this record: finished before `cutoff`, or
    /// still pending with an expiry before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            self.updated_at < cutoff
        } else {
            self.expires_at < cutoff
        }
    }

    pub fn ensure_initiated(&self, attempted: UploadStatus) -> AppResult<()> {
        if self.status.can_transition_to(attempted) {
            Ok(())
        } else {
            Err(AppError::InvalidStateTransition {
                upload_id: self.id.to_string(),
                from: self.status,
                to: attempted,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartETag {
    pub part_number: u32,
    pub etag: String,
}

/// Provider receipt reported back on confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Confirmation {
    Simple {
        #[serde(default)]
        etag: Option<String>,
    },
    Multipart { parts: Vec<PartETag> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfirmation {
    pub success: bool,
    #[serde(default)]
    #[validate(length(max = 1024, message = "Error message must be at most 1024 characters"))]
    pub error_msg: Option<String>,
    #[serde(default)]
    pub receipt: Option<Confirmation>,
}

impl UploadConfirmation {
    pub fn succeeded(receipt: Confirmation) -> Self {
        Self {
            success: true,
            error_msg: None,
            receipt: Some(receipt),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_msg: Some(message.into()),
            receipt: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_initiated_can_transition() {
        for next in [
            UploadStatus::Confirmed,
            UploadStatus::Failed,
            UploadStatus::Aborted,
        ] {
            assert!(UploadStatus::Initiated.can_transition_to(next));
            for terminal in [
                UploadStatus::Confirmed,
                UploadStatus::Failed,
                UploadStatus::Aborted,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!UploadStatus::Initiated.can_transition_to(UploadStatus::Initiated));
    }

    #[test]
    fn confirmation_is_tagged() {
        let simple: Confirmation =
            serde_json::from_str(r#"{"type":"simple","etag":"\"abc\""}"#).unwrap();
        assert_eq!(
            simple,
            Confirmation::Simple {
                etag: Some("\"abc\"".to_string())
            }
        );

        let multipart: Confirmation = serde_json::from_str(
            r#"{"type":"multipart","parts":[{"partNumber":1,"etag":"e1"}]}"#,
        )
        .unwrap();
        assert!(matches!(multipart, Confirmation::Multipart { ref parts } if parts.len() == 1));
    }

    #[test]
    fn upload_ids_are_prefixed() {
        let id = UploadId::new();
        assert!(id.as_str().starts_with("upl_"));
        assert_eq!(id.as_str().len(), 36);
    }

    #[test]
    fn session_parts_stay_ordered() {
        let mut session =
            MultipartSession::new("u".into(), "p".into(), MultipartLimits::new(1, 10, 5));
        for n in [3, 1, 2, 1] {
            session.upsert_part(PartRecord {
                part_number: n,
                checksum: None,
                size: None,
                etag: Some(format!("e{}", n)),
            });
        }
        let numbers: Vec<u32> = session.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    fn pending(expires_at: DateTime<Utc>) -> Upload {
        let now = Utc::now();
        Upload {
            id: UploadId::new(),
            definition: "achievement".to_string(),
            resource: ResourceRef::new("achievement", "42", "icon"),
            provider: ProviderName::R2,
            scope: ScopeType::Global,
            upload_type: UploadType::Simple,
            status: UploadStatus::Initiated,
            path: "a/b.png".to_string(),
            created_at: now,
            updated_at: now,
            expires_at,
            previous_path: None,
            error_message: None,
            etag: None,
            multipart: None,
        }
    }

    #[test]
    fn expiry_applies_to_pending_uploads_only() {
        let now = Utc::now();
        let grace = chrono::Duration::seconds(60);
        let mut upload = pending(now - chrono::Duration::seconds(30));

        assert!(upload.ensure_unexpired(now, grace).is_ok());
        let err = upload
            .ensure_unexpired(now, chrono::Duration::zero())
            .unwrap_err();
        assert!(matches!(err, AppError::UploadExpired { .. }));
        assert_eq!(crate::ErrorMetadata::http_status_code(&err), 410);

        upload.transition(UploadStatus::Confirmed).unwrap();
        assert!(upload.ensure_unexpired(now, chrono::Duration::zero()).is_ok());
    }

    #[test]
    fn staleness_follows_status() {
        let now = Utc::now();
        let hour = chrono::Duration::hours(1);

        let mut upload = pending(now - hour);
        assert!(upload.is_stale(now));
        assert!(!upload.is_stale(now - hour * 2));

        upload.expires_at = now + hour;
        upload.transition(UploadStatus::Aborted).unwrap();
        // Terminal records age from their last change, not their expiry
        assert!(!upload.is_stale(now - hour));
        assert!(upload.is_stale(now + chrono::Duration::seconds(1)));
    }
}
