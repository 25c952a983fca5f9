//! Upload manager
//!
//! Tracks uploads from initiation to a terminal state. Each mutation runs
//! under the record's lock, so a confirm racing an abort sees a consistent
//! status. Confirming an upload that replaces an earlier object schedules
//! deletion of the old object on the cleanup queue; that never fails the
//! confirming call.
//!
//! A pending upload past its `expires_at` can only be aborted or reported as
//! failed. [`UploadManager::sweep`] evicts finished and expired records.

use std::sync::Arc;
use std::time::Duration;

use assetgate_core::constants::{MAX_URL_EXPIRY_SECS, UPLOAD_CONFIRM_GRACE_SECS};
use assetgate_core::models::requests::{
    InitiateUploadRequest, RenewUploadRequest, UploadPartsRequest, UploadResponse,
};
use assetgate_core::models::{
    Confirmation, MultipartSession, MultipartUrls, PartRecord, Upload, UploadConfirmation,
    UploadId, UploadStatus, UploadType,
};
use assetgate_core::{AppError, AppResult, ProviderName};
use assetgate_worker::{CleanupJob, CleanupQueue, CleanupStats};
use chrono::{DateTime, Utc};

use super::store::{ReferenceKey, UploadStore};
use crate::multipart::validate_part_etags;
use crate::resolver::{ResolveOptions, UrlResolver};

pub struct UploadManager {
    resolver: Arc<UrlResolver>,
    store: Arc<dyn UploadStore>,
    cleanup: CleanupQueue,
}

impl UploadManager {
    pub fn new(
        resolver: Arc<UrlResolver>,
        store: Arc<dyn UploadStore>,
        cleanup: CleanupQueue,
    ) -> Self {
        Self {
            resolver,
            store,
            cleanup,
        }
    }

    pub fn cleanup_stats(&self) -> CleanupStats {
        self.cleanup.stats()
    }

    #[tracing::instrument(
        skip(self, request),
        fields(definition = %request.definition_name, provider = %request.provider)
    )]
    pub async fn initiate(&self, request: InitiateUploadRequest) -> AppResult<UploadResponse> {
        let provider: ProviderName = request.provider.parse()?;
        let options = ResolveOptions {
            scope: request.scope,
            scope_value: request.scope_value,
            parameters: request.parameters,
            expiry: request.expiry,
            metadata: request.metadata,
        };

        let now = Utc::now();
        let default_expiry = expiry_after(
            now,
            options
                .expiry
                .unwrap_or(self.resolver.settings().default_expiry_secs),
        );

        let (path, url, multipart, expires_at) = match request.upload_type {
            UploadType::Simple => {
                let resolved = self
                    .resolver
                    .resolve_upload_url(&request.definition_name, provider, &options)
                    .await?;
                let expires_at = resolved.url.expires_at.unwrap_or(default_expiry);
                (resolved.path, Some(resolved.url), None, expires_at)
            }
            UploadType::Multipart => {
                let init = self
                    .resolver
                    .init_multipart(&request.definition_name, provider, &options)
                    .await?;
                let session =
                    MultipartSession::new(init.provider_upload_id, init.path.clone(), init.limits);
                (init.path, None, Some(session), default_expiry)
            }
        };

        let previous_path = request
            .previous_path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        let upload = Upload {
            id: UploadId::new(),
            definition: request.definition_name,
            resource: request.resource,
            provider,
            scope: options.scope,
            upload_type: request.upload_type,
            status: UploadStatus::Initiated,
            path,
            created_at: now,
            updated_at: now,
            expires_at,
            previous_path,
            error_message: None,
            etag: None,
            multipart,
        };
        self.store.insert(upload.clone()).await?;

        tracing::info!(
            upload_id = %upload.id,
            path = %upload.path,
            upload_type = upload_type_name(upload.upload_type),
            "Upload initiated"
        );

        Ok(UploadResponse { upload, url })
    }

    pub async fn get(&self, id: &UploadId) -> AppResult<Upload> {
        self.store.get(id).await
    }

    /// Move an upload to `Confirmed` or `Failed` from a client report.
    #[tracing::instrument(skip(self, confirmation), fields(upload_id = %id, success = confirmation.success))]
    pub async fn confirm(
        &self,
        id: &UploadId,
        confirmation: UploadConfirmation,
    ) -> AppResult<Upload> {
        let UploadConfirmation {
            success,
            error_msg,
            receipt,
        } = confirmation;
        let target = if success {
            UploadStatus::Confirmed
        } else {
            UploadStatus::Failed
        };

        let upload = self
            .store
            .update(
                id,
                Box::new(move |upload: &mut Upload| {
                    upload.ensure_initiated(target)?;
                    if success {
                        upload.ensure_unexpired(
                            Utc::now(),
                            chrono::Duration::seconds(UPLOAD_CONFIRM_GRACE_SECS),
                        )?;
                        apply_receipt(upload, receipt)?;
                    } else {
                        upload.error_message = Some(
                            error_msg
                                .filter(|m| !m.trim().is_empty())
                                .unwrap_or_else(|| "upload reported as failed".to_string()),
                        );
                    }
                    upload.transition(target)
                }),
            )
            .await?;

        if upload.status == UploadStatus::Confirmed {
            tracing::info!(path = %upload.path, "Upload confirmed");
            self.schedule_superseded_cleanup(&upload).await;
        } else {
            tracing::warn!(
                path = %upload.path,
                error = upload.error_message.as_deref().unwrap_or_default(),
                "Upload reported as failed"
            );
        }

        Ok(upload)
    }

    /// Cancel an upload before confirmation. Multipart sessions are aborted
    /// at the provider on a best-effort basis.
    #[tracing::instrument(skip(self), fields(upload_id = %id))]
    pub async fn abort(&self, id: &UploadId) -> AppResult<Upload> {
        let upload = self
            .store
            .update(
                id,
                Box::new(|upload: &mut Upload| upload.transition(UploadStatus::Aborted)),
            )
            .await?;

        if let Some(session) = &upload.multipart {
            if let Err(e) = self
                .resolver
                .abort_multipart(upload.provider, &session.path, &session.provider_upload_id)
                .await
            {
                tracing::warn!(
                    error = %e,
                    provider_upload_id = %session.provider_upload_id,
                    "Failed to abort provider multipart session"
                );
            }
        }

        tracing::info!(path = %upload.path, "Upload aborted");
        Ok(upload)
    }

    /// Re-sign the write URL of a pending simple upload.
    #[tracing::instrument(skip(self, request), fields(upload_id = %id))]
    pub async fn renew(&self, id: &UploadId, request: RenewUploadRequest) -> AppResult<UploadResponse> {
        let upload = self.store.get(id).await?;
        ensure_open(&upload)?;
        upload.ensure_unexpired(Utc::now(), chrono::Duration::zero())?;
        if upload.upload_type != UploadType::Simple {
            return Err(AppError::InvalidParameter {
                parameter: "uploadType".to_string(),
                reason: "only simple uploads have a renewable URL".to_string(),
            });
        }

        let adapter = self.resolver.providers().get(upload.provider)?;
        let chain = self.resolver.registry().lookup(&upload.definition)?;
        let url = self
            .resolver
            .sign_upload(
                adapter.as_ref(),
                chain.storage_metadata(),
                &upload.path,
                request.expiry,
                request.metadata.as_ref(),
            )
            .await?;

        let now = Utc::now();
        let expires_at = url.expires_at.unwrap_or_else(|| {
            expiry_after(
                now,
                request
                    .expiry
                    .unwrap_or(self.resolver.settings().default_expiry_secs),
            )
        });
        let upload = self
            .store
            .update(
                id,
                Box::new(move |upload: &mut Upload| {
                    ensure_open(upload)?;
                    upload.ensure_unexpired(now, chrono::Duration::zero())?;
                    upload.expires_at = expires_at;
                    upload.updated_at = now;
                    Ok(())
                }),
            )
            .await?;

        tracing::debug!(expires_at = %upload.expires_at, "Upload URL renewed");
        Ok(UploadResponse {
            upload,
            url: Some(url),
        })
    }

    /// Part URLs for a pending multipart upload, validated against the limits
    /// captured when the session was created.
    #[tracing::instrument(skip(self, request), fields(upload_id = %id, parts = request.parts.len()))]
    pub async fn part_urls(
        &self,
        id: &UploadId,
        request: UploadPartsRequest,
    ) -> AppResult<MultipartUrls> {
        let upload = self.store.get(id).await?;
        ensure_open(&upload)?;
        upload.ensure_unexpired(Utc::now(), chrono::Duration::zero())?;
        let Some(session) = upload.multipart.as_ref() else {
            return Err(AppError::InvalidParameter {
                parameter: "uploadType".to_string(),
                reason: "only multipart uploads have part URLs".to_string(),
            });
        };

        let urls = self
            .resolver
            .part_urls_within(
                upload.provider,
                &session.limits,
                &session.path,
                &session.provider_upload_id,
                &request.parts,
                request.expiry,
            )
            .await?;

        // The session stays live for as long as its newest part URLs.
        let now = Utc::now();
        let urls_expire_at = urls.complete.expires_at.unwrap_or_else(|| {
            expiry_after(
                now,
                request
                    .expiry
                    .unwrap_or(self.resolver.settings().default_expiry_secs),
            )
        });
        let parts = request.parts;
        self.store
            .update(
                id,
                Box::new(move |upload: &mut Upload| {
                    ensure_open(upload)?;
                    upload.ensure_unexpired(now, chrono::Duration::zero())?;
                    upload.expires_at = upload.expires_at.max(urls_expire_at);
                    upload.updated_at = now;
                    if let Some(session) = upload.multipart.as_mut() {
                        for part in parts {
                            session.upsert_part(PartRecord {
                                part_number: part.part_number,
                                checksum: part.checksum,
                                size: part.size,
                                etag: None,
                            });
                        }
                    }
                    Ok(())
                }),
            )
            .await?;

        Ok(urls)
    }

    /// Evict records finished, or pending and expired, more than `retention`
    /// ago. Provider sessions of evicted multipart uploads are aborted on a
    /// best-effort basis. Returns the number of evicted records.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let evicted = self.store.evict(cutoff).await;

        for upload in evicted.iter().filter(|u| !u.status.is_terminal()) {
            let Some(session) = &upload.multipart else {
                continue;
            };
            if let Err(e) = self
                .resolver
                .abort_multipart(upload.provider, &session.path, &session.provider_upload_id)
                .await
            {
                tracing::warn!(
                    error = %e,
                    upload_id = %upload.id,
                    provider_upload_id = %session.provider_upload_id,
                    "Failed to abort expired multipart session"
                );
            }
        }

        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), cutoff = %cutoff, "Upload records evicted");
        }
        evicted.len()
    }

    async fn schedule_superseded_cleanup(&self, upload: &Upload) {
        let replaced = self
            .store
            .swap_confirmed_path(ReferenceKey::of(upload), upload.path.clone())
            .await;

        for old_path in superseded_paths(&upload.path, upload.previous_path.as_deref(), replaced) {
            let job = CleanupJob::new(
                upload.provider,
                old_path.clone(),
                format!("superseded by upload {}", upload.id),
            );
            if self.cleanup.schedule(job) {
                tracing::info!(old_path = %old_path, "Superseded object scheduled for deletion");
            } else {
                tracing::warn!(old_path = %old_path, "Superseded object left in place");
            }
        }
    }
}

/// Paths replaced by a confirmed object at `path`: the caller's explicit
/// previous path and the last confirmed path for the same field, each once and
/// never `path` itself.
fn superseded_paths(path: &str, previous: Option<&str>, replaced: Option<String>) -> Vec<String> {
    let mut paths: Vec<String> = Vec::with_capacity(2);
    for candidate in previous.map(str::to_string).into_iter().chain(replaced) {
        if candidate != path && !paths.contains(&candidate) {
            paths.push(candidate);
        }
    }
    paths
}

fn upload_type_name(upload_type: UploadType) -> &'static str {
    match upload_type {
        UploadType::Simple => "simple",
        UploadType::Multipart => "multipart",
    }
}

fn expiry_after(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    now + chrono::Duration::seconds(secs.min(MAX_URL_EXPIRY_SECS) as i64)
}

/// Renew and part-URL calls need an upload that has not reached a terminal state.
fn ensure_open(upload: &Upload) -> AppResult<()> {
    if upload.status.is_terminal() {
        return Err(AppError::InvalidStateTransition {
            upload_id: upload.id.to_string(),
            from: upload.status,
            to: UploadStatus::Initiated,
        });
    }
    Ok(())
}

fn apply_receipt(upload: &mut Upload, receipt: Option<Confirmation>) -> AppResult<()> {
    match (upload.upload_type, receipt) {
        (UploadType::Simple, None) => Ok(()),
        (UploadType::Simple, Some(Confirmation::Simple { etag })) => {
            upload.etag = etag;
            Ok(())
        }
        (UploadType::Multipart, Some(Confirmation::Multipart { parts })) => {
            let upload_id = upload.id.to_string();
            let session = upload.multipart.as_mut().ok_or_else(|| {
                AppError::Internal(format!("multipart upload {} has no session", upload_id))
            })?;
            validate_part_etags(&session.limits, &parts)?;

            for part in parts {
                let known = session
                    .parts
                    .iter()
                    .find(|p| p.part_number == part.part_number)
                    .cloned();
                session.upsert_part(PartRecord {
                    part_number: part.part_number,
                    checksum: known.as_ref().and_then(|p| p.checksum.clone()),
                    size: known.and_then(|p| p.size),
                    etag: Some(part.etag),
                });
            }
            Ok(())
        }
        (UploadType::Multipart, None) => Err(AppError::MissingParameter {
            parameter: "receipt".to_string(),
            details: "multipart confirmation needs the uploaded part ETags".to_string(),
        }),
        (upload_type, Some(_)) => Err(AppError::InvalidParameter {
            parameter: "receipt".to_string(),
            reason: format!(
                "receipt does not match a {} upload",
                upload_type_name(upload_type)
            ),
        }),
    }
}
