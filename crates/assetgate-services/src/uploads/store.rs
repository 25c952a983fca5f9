use std::collections::HashMap;
use std::sync::Arc;

use assetgate_core::models::{ResourceRef, Upload, UploadId};
use assetgate_core::{AppError, AppResult, ProviderName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

/// Check-then-modify step applied to one upload under its record lock.
pub type UploadChange = Box<dyn FnOnce(&mut Upload) -> AppResult<()> + Send>;

/// The application field an object is referenced from, per provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceKey {
    pub provider: ProviderName,
    pub resource: ResourceRef,
}

impl ReferenceKey {
    pub fn of(upload: &Upload) -> Self {
        Self {
            provider: upload.provider,
            resource: upload.resource.clone(),
        }
    }
}

/// Persistence for tracked uploads.
#[async_trait]
pub trait UploadStore: Send + Sync {
    async fn insert(&self, upload: Upload) -> AppResult<()>;

    async fn get(&self, id: &UploadId) -> AppResult<Upload>;

    /// Apply `change` atomically with respect to other changes of the same
    /// upload. When `change` fails the stored record is left untouched.
    async fn update(&self, id: &UploadId, change: UploadChange) -> AppResult<Upload>;

    /// Record `path` as the confirmed object for `key`, returning the path it replaces.
    async fn swap_confirmed_path(&self, key: ReferenceKey, path: String) -> Option<String>;

    /// Remove every record that [`Upload::is_stale`] at `cutoff`, returning them.
    async fn evict(&self, cutoff: DateTime<Utc>) -> Vec<Upload>;
}

/// In-process upload store with one lock per record.
#[derive(Default)]
pub struct MemoryUploadStore {
    records: RwLock<HashMap<UploadId, Arc<Mutex<Upload>>>>,
    references: Mutex<HashMap<ReferenceKey, String>>,
}

impl MemoryUploadStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn record(&self, id: &UploadId) -> AppResult<Arc<Mutex<Upload>>> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::UploadNotFound(id.to_string()))
    }
}

#[async_trait]
impl UploadStore for MemoryUploadStore {
    async fn insert(&self, upload: Upload) -> AppResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&upload.id) {
            return Err(AppError::Internal(format!(
                "upload {} already exists",
                upload.id
            )));
        }
        records.insert(upload.id.clone(), Arc::new(Mutex::new(upload)));
        Ok(())
    }

    async fn get(&self, id: &UploadId) -> AppResult<Upload> {
        let record = self.record(id).await?;
        let upload = record.lock().await.clone();
        Ok(upload)
    }

    async fn update(&self, id: &UploadId, change: UploadChange) -> AppResult<Upload> {
        let record = self.record(id).await?;
        let mut stored = record.lock().await;

        let mut draft = stored.clone();
        change(&mut draft)?;
        *stored = draft;
        Ok(stored.clone())
    }

    async fn swap_confirmed_path(&self, key: ReferenceKey, path: String) -> Option<String> {
        self.references.lock().await.insert(key, path)
    }

    async fn evict(&self, cutoff: DateTime<Utc>) -> Vec<Upload> {
        let mut records = self.records.write().await;
        let mut evicted = Vec::new();
        let mut keep = HashMap::with_capacity(records.len());
        for (id, record) in records.drain() {
            // A record locked by an in-flight change is revisited next sweep.
            let stale = match record.try_lock() {
                Ok(upload) if upload.is_stale(cutoff) => Some(upload.clone()),
                _ => None,
            };
            match stale {
                Some(upload) => evicted.push(upload),
                None => {
                    keep.insert(id, record);
                }
            }
        }
        *records = keep;
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetgate_core::models::{UploadStatus, UploadType};
    use assetgate_core::ScopeType;
    use chrono::Utc;

    fn upload() -> Upload {
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
            expires_at: now,
            previous_path: None,
            error_message: None,
            etag: None,
            multipart: None,
        }
    }

    #[tokio::test]
    async fn failed_change_leaves_record_untouched() {
        let store = MemoryUploadStore::new();
        let original = upload();
        let id = original.id.clone();
        store.insert(original.clone()).await.unwrap();

        let result = store
            .update(
                &id,
                Box::new(|upload: &mut Upload| {
                    upload.etag = Some("partial".to_string());
                    Err(AppError::InvalidInput("nope".to_string()))
                }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(&id).await.unwrap(), original);
    }

    #[tokio::test]
    async fn concurrent_terminal_transitions_serialize() {
        let store = Arc::new(MemoryUploadStore::new());
        let original = upload();
        let id = original.id.clone();
        store.insert(original).await.unwrap();

        let mut handles = Vec::new();
        for next in [UploadStatus::Confirmed, UploadStatus::Aborted] {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&id, Box::new(move |upload: &mut Upload| upload.transition(next)))
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
        assert!(store.get(&id).await.unwrap().status.is_terminal());
    }

    #[tokio::test]
    async fn swap_returns_previous_path() {
        let store = MemoryUploadStore::new();
        let key = ReferenceKey::of(&upload());
        assert_eq!(store.swap_confirmed_path(key.clone(), "a".into()).await, None);
        assert_eq!(
            store.swap_confirmed_path(key.clone(), "b".into()).await,
            Some("a".to_string())
        );
        assert_eq!(
            store.swap_confirmed_path(key, "c".into()).await,
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn evict_drops_only_stale_records() {
        let store = MemoryUploadStore::new();
        let now = Utc::now();
        let hour = chrono::Duration::hours(1);

        let mut expired = upload();
        expired.expires_at = now - hour;
        let mut pending = upload();
        pending.expires_at = now + hour;
        let mut finished = upload();
        finished.status = UploadStatus::Confirmed;
        finished.updated_at = now - hour;
        for record in [&expired, &pending, &finished] {
            store.insert(record.clone()).await.unwrap();
        }

        let mut evicted: Vec<UploadId> = store
            .evict(now)
            .await
            .into_iter()
            .map(|u| u.id)
            .collect();
        evicted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let mut expected = vec![expired.id.clone(), finished.id.clone()];
        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(evicted, expected);

        assert!(store.get(&pending.id).await.is_ok());
        for gone in [&expired.id, &finished.id] {
            assert!(matches!(
                store.get(gone).await,
                Err(AppError::UploadNotFound(_))
            ));
        }
        assert!(store.evict(now).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_upload_is_not_found() {
        let store = MemoryUploadStore::new();
        assert!(matches!(
            store.get(&UploadId::from("upl_missing")).await,
            Err(AppError::UploadNotFound(_))
        ));
    }
}
