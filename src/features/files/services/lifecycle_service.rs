use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{metadata_call, storage_call};
use crate::core::config::UploadConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::models::{normalize_tags, FileChanges, FileRecord};
use crate::features::files::store::MetadataStore;
use crate::modules::storage::{DeleteOutcome, StorageAdapter};

/// Metadata updates and deletes that keep storage and metadata in step
pub struct LifecycleService {
    storage: Arc<dyn StorageAdapter>,
    store: Arc<dyn MetadataStore>,
    storage_timeout: Duration,
    metadata_timeout: Duration,
}

impl LifecycleService {
    pub fn new(
        config: &UploadConfig,
        storage: Arc<dyn StorageAdapter>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            storage,
            store,
            storage_timeout: config.storage_timeout,
            metadata_timeout: config.metadata_timeout,
        }
    }

    /// Update the mutable fields of a file
    #[instrument(skip(self, changes))]
    pub async fn update(&self, id: Uuid, mut changes: FileChanges) -> Result<FileRecord> {
        if changes.is_empty() {
            return Err(AppError::Validation(
                "No updatable fields provided".to_string(),
            ));
        }
        if let Some(tags) = changes.tags.take() {
            changes.tags = Some(normalize_tags(tags).map_err(AppError::Validation)?);
        }

        let file = metadata_call(
            self.metadata_timeout,
            "update",
            self.store.update(id, &changes),
        )
        .await?;

        info!("File updated: id={}", file.id);
        Ok(file)
    }

    /// Delete the stored object, then the record.
    ///
    /// The record is kept when the object could not be removed. When the
    /// object is gone but the record delete fails, `PARTIAL_DELETE` is
    /// returned.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<FileRecord> {
        let file = metadata_call(self.metadata_timeout, "get", self.store.get(id)).await?;

        let outcome = storage_call(
            self.storage_timeout,
            "delete",
            self.storage.delete(&file.storage_ref),
        )
        .await
        .map_err(|e| {
            warn!(
                file_id = %file.id,
                storage_ref = %file.storage_ref,
                "Storage delete failed, keeping metadata: {}",
                e
            );
            e
        })?;

        if outcome == DeleteOutcome::NotFound {
            warn!(
                file_id = %file.id,
                storage_ref = %file.storage_ref,
                "Stored object was already gone"
            );
        }

        match metadata_call(self.metadata_timeout, "delete", self.store.delete(id)).await {
            // Already removed by a concurrent delete
            Ok(()) | Err(AppError::NotFound(_)) => {
                info!("File deleted: id={}, key={}", file.id, file.storage_ref);
                Ok(file)
            }
            Err(e) => {
                error!(
                    file_id = %file.id,
                    storage_ref = %file.storage_ref,
                    "Object deleted but metadata delete failed: {}",
                    e
                );
                Err(AppError::PartialDelete {
                    id: file.id,
                    storage_ref: file.storage_ref,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::features::files::models::MetadataValue;
    use crate::features::files::services::test_support::{harness, text_upload};

    #[tokio::test]
    async fn test_update_visibility_keeps_content_fields() {
        let h = harness();
        let file = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap();

        let updated = h
            .lifecycle
            .update(
                file.id,
                FileChanges {
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(updated.is_public);
        assert_eq!(updated.size_bytes, file.size_bytes);
        assert_eq!(updated.mime_type, file.mime_type);
        assert_eq!(updated.storage_ref, file.storage_ref);
        assert_eq!(updated.created_at, file.created_at);
        assert!(updated.updated_at >= file.updated_at);
    }

    #[tokio::test]
    async fn test_update_normalizes_tags_and_merges_metadata() {
        let h = harness();
        let mut request = text_upload("a.txt", "abc");
        request.metadata =
            BTreeMap::from([("title".to_string(), MetadataValue::String("Old".into()))]);
        let file = h.upload.upload(request).await.unwrap();

        let updated = h
            .lifecycle
            .update(
                file.id,
                FileChanges {
                    tags: Some(vec![" b ".into(), "a".into(), "b".into()]),
                    metadata: Some(BTreeMap::from([
                        ("title".to_string(), None),
                        ("pages".to_string(), Some(MetadataValue::Integer(4))),
                    ])),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.tags, vec!["b", "a"]);
        assert!(!updated.metadata.contains_key("title"));
        assert_eq!(updated.metadata["pages"], MetadataValue::Integer(4));
    }

    #[tokio::test]
    async fn test_update_errors() {
        let h = harness();
        let err = h
            .lifecycle
            .update(Uuid::now_v7(), FileChanges::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = h
            .lifecycle
            .update(
                Uuid::now_v7(),
                FileChanges {
                    is_public: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_removes_object_and_record() {
        let h = harness();
        let file = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap();

        let deleted = h.lifecycle.delete(file.id).await.unwrap();

        assert_eq!(deleted.id, file.id);
        assert!(!h.storage.contains(&file.storage_ref));
        assert_eq!(h.store.len(), 0);

        let err = h.lifecycle.delete(file.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_keeps_record_when_storage_unavailable() {
        let h = harness();
        let file = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap();
        h.storage.set_deletes_unavailable(true);

        let err = h.lifecycle.delete(file.id).await.unwrap_err();

        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
        assert!(h.storage.contains(&file.storage_ref));
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_with_missing_object_still_removes_record() {
        let h = harness();
        let file = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap();
        h.storage.delete(&file.storage_ref).await.unwrap();

        h.lifecycle.delete(file.id).await.unwrap();
        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_after_object_delete_is_partial() {
        let h = harness();
        let file = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap();
        h.store.set_deletes_failing(true);

        let err = h.lifecycle.delete(file.id).await.unwrap_err();

        assert_eq!(err.code(), "PARTIAL_DELETE");
        assert_eq!(err.status(), axum::http::StatusCode::MULTI_STATUS);
        assert!(!h.storage.contains(&file.storage_ref));
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_delete_is_idempotent() {
        let h = harness();
        let file = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap();

        assert_eq!(
            h.storage.delete(&file.storage_ref).await.unwrap(),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            h.storage.delete(&file.storage_ref).await.unwrap(),
            DeleteOutcome::NotFound
        );
    }
}
