use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{metadata_call, storage_call};
use crate::core::config::UploadConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::models::{normalize_tags, validate_metadata, FileMetadata, FileRecord};
use crate::features::files::store::MetadataStore;
use crate::features::files::validator::UploadPolicy;
use crate::modules::storage::{StorageAdapter, UploadContent};

/// One file to upload together with its client supplied attributes
#[derive(Debug)]
pub struct UploadRequest {
    pub content: UploadContent,
    /// Raw name as sent by the client
    pub file_name: String,
    /// Declared MIME type
    pub mime_type: String,
    pub uploaded_by: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub metadata: FileMetadata,
}

/// Outcome of one file in a batch, in request order
#[derive(Debug)]
pub struct BatchOutcome {
    pub file_name: String,
    pub result: Result<FileRecord>,
}

/// Coordinates validation, the storage write and the metadata write
pub struct UploadService {
    policy: UploadPolicy,
    storage: Arc<dyn StorageAdapter>,
    store: Arc<dyn MetadataStore>,
    storage_timeout: Duration,
    metadata_timeout: Duration,
    max_batch_files: usize,
    batch_concurrency: usize,
}

impl UploadService {
    pub fn new(
        config: &UploadConfig,
        storage: Arc<dyn StorageAdapter>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            policy: UploadPolicy::from_config(config),
            storage,
            store,
            storage_timeout: config.storage_timeout,
            metadata_timeout: config.metadata_timeout,
            max_batch_files: config.max_batch_files,
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn max_batch_files(&self) -> usize {
        self.max_batch_files
    }

    /// Upload a single file.
    ///
    /// Nothing is written when validation fails. When the metadata write
    /// fails after the object was stored, the object is deleted again; if
    /// that cleanup fails too the orphan is reported as `ORPHANED_OBJECT`.
    #[instrument(skip(self, request), fields(file_name = %request.file_name))]
    pub async fn upload(&self, request: UploadRequest) -> Result<FileRecord> {
        let UploadRequest {
            content,
            file_name,
            mime_type,
            uploaded_by,
            tags,
            is_public,
            metadata,
        } = request;

        let validated = self
            .policy
            .validate(&file_name, &mime_type, content.size_bytes())?;
        let tags = normalize_tags(tags).map_err(AppError::Validation)?;
        validate_metadata(&metadata).map_err(AppError::Validation)?;
        let uploaded_by = uploaded_by
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let size_bytes = i64::try_from(validated.size_bytes).map_err(|_| {
            AppError::Validation(format!("File size {} is out of range", validated.size_bytes))
        })?;
        let checksum_sha256 = content.checksum_sha256().to_string();

        let stored = storage_call(
            self.storage_timeout,
            "put",
            self.storage
                .put(content, &validated.sanitized_name, &validated.mime_type),
        )
        .await?;

        let now = Utc::now();
        let record = FileRecord {
            id: Uuid::now_v7(),
            storage_ref: stored.storage_ref,
            url: stored.url,
            secure_url: stored.secure_url,
            original_name: validated.original_name,
            sanitized_name: validated.sanitized_name,
            mime_type: validated.mime_type,
            size_bytes,
            checksum_sha256,
            uploaded_by,
            tags,
            is_public,
            metadata,
            created_at: now,
            updated_at: now,
        };

        match metadata_call(self.metadata_timeout, "create", self.store.create(&record)).await {
            Ok(file) => {
                info!(
                    "File uploaded: id={}, key={}, size={}",
                    file.id, file.storage_ref, file.size_bytes
                );
                Ok(file)
            }
            Err(e) => Err(self.compensate(&record, e).await),
        }
    }

    /// Undo an upload whose metadata record could not be confirmed.
    ///
    /// The object is deleted. When the store was unavailable the insert may
    /// still land later, so the record is deleted too.
    async fn compensate(&self, record: &FileRecord, cause: AppError) -> AppError {
        let storage_ref = record.storage_ref.as_str();
        warn!(
            file_id = %record.id,
            storage_ref = %storage_ref,
            "Metadata write failed after upload, deleting stored object: {}",
            cause
        );

        if let Err(cleanup) =
            storage_call(self.storage_timeout, "delete", self.storage.delete(storage_ref)).await
        {
            error!(
                file_id = %record.id,
                storage_ref = %storage_ref,
                "Compensating delete failed, object is orphaned: {}",
                cleanup
            );
            return AppError::OrphanedObject {
                storage_ref: storage_ref.to_string(),
                reason: format!("{}; cleanup failed: {}", cause, cleanup),
            };
        }

        let AppError::MetadataUnavailable(detail) = cause else {
            return cause;
        };

        match metadata_call(self.metadata_timeout, "delete", self.store.delete(record.id)).await {
            Ok(()) => {
                warn!(file_id = %record.id, "Removed record that landed after a failed create");
                AppError::MetadataUnavailable(detail)
            }
            Err(AppError::NotFound(_)) => AppError::MetadataUnavailable(detail),
            Err(cleanup) => {
                error!(
                    file_id = %record.id,
                    storage_ref = %storage_ref,
                    "Record cleanup failed, a late insert may leave a record without content: {}",
                    cleanup
                );
                AppError::MetadataUnavailable(format!(
                    "{}; record cleanup failed: {}",
                    detail, cleanup
                ))
            }
        }
    }

    /// Upload several files independently with bounded concurrency.
    ///
    /// One outcome per request, in request order.
    pub async fn upload_many(&self, requests: Vec<UploadRequest>) -> Result<Vec<BatchOutcome>> {
        if requests.is_empty() {
            return Err(AppError::Validation(
                "At least one file is required".to_string(),
            ));
        }
        if requests.len() > self.max_batch_files {
            return Err(AppError::Validation(format!(
                "Too many files. Maximum is {} per batch",
                self.max_batch_files
            )));
        }

        let outcomes: Vec<BatchOutcome> = stream::iter(requests)
            .map(|request| async move {
                let file_name = request.file_name.clone();
                BatchOutcome {
                    file_name,
                    result: self.upload(request).await,
                }
            })
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            "Batch upload finished: total={}, failed={}",
            outcomes.len(),
            failed
        );

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::features::files::services::test_support::{harness, text_upload};
    use crate::features::files::store::{FileQuery, MetadataStore};
    use crate::features::files::validator::RejectionReason;
    use crate::modules::storage::UploadContent;

    #[tokio::test]
    async fn test_upload_creates_object_and_record() {
        let h = harness();
        let mut request = text_upload("notes.txt", "hello");
        request.uploaded_by = Some("alice".into());
        request.tags = vec!["work".into(), " work ".into()];

        let file = h.upload.upload(request).await.unwrap();

        assert_eq!(file.size_bytes, 5);
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.tags, vec!["work"]);
        assert_eq!(
            file.checksum_sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(h.storage.contains(&file.storage_ref));
        assert_eq!(h.storage.object(&file.storage_ref).unwrap(), b"hello");
        assert_eq!(h.store.get(file.id).await.unwrap(), file);
    }

    #[tokio::test]
    async fn test_rejected_uploads_write_nothing() {
        let h = harness();

        let empty = text_upload("empty.txt", "");
        let mut oversized = text_upload("big.txt", "");
        oversized.content = UploadContent::from_bytes(vec![b'x'; 2048]);
        let mut wrong_type = text_upload("run.exe", "MZ");
        wrong_type.mime_type = "application/x-msdownload".into();

        let cases = [
            (empty, RejectionReason::EmptyFile),
            (oversized, RejectionReason::Oversized),
            (wrong_type, RejectionReason::UnsupportedType),
        ];

        for (request, expected) in cases {
            match h.upload.upload(request).await {
                Err(crate::core::error::AppError::Rejected { reason, .. }) => {
                    assert_eq!(reason, expected)
                }
                other => panic!("expected rejection, got {:?}", other),
            }
        }

        assert_eq!(h.storage.object_count(), 0);
        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_deletes_stored_object() {
        let h = harness();
        h.store.set_creates_failing(true);

        let err = h
            .upload
            .upload(text_upload("a.txt", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "METADATA_UNAVAILABLE");
        assert_eq!(h.storage.object_count(), 0);
        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn test_metadata_timeout_triggers_compensation() {
        let h = harness();
        h.store.set_create_delay(Some(Duration::from_secs(5)));

        let err = h
            .upload
            .upload(text_upload("slow.txt", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "METADATA_UNAVAILABLE");
        assert_eq!(h.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn test_compensation_removes_late_committed_record() {
        let h = harness();
        h.store.set_creates_land_early(true);
        h.store.set_create_delay(Some(Duration::from_secs(5)));

        let err = h
            .upload
            .upload(text_upload("late.txt", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "METADATA_UNAVAILABLE");
        assert_eq!(h.storage.object_count(), 0);
        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_record_cleanup_is_reported() {
        let h = harness();
        h.store.set_creates_land_early(true);
        h.store.set_create_delay(Some(Duration::from_secs(5)));
        h.store.set_deletes_failing(true);

        let err = h
            .upload
            .upload(text_upload("late.txt", "abc"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "METADATA_UNAVAILABLE");
        assert!(err.details().unwrap().contains("record cleanup failed"));
        assert_eq!(h.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_compensation_surfaces_orphan() {
        let h = harness();
        h.store.set_creates_failing(true);
        h.storage.set_deletes_unavailable(true);

        let err = h
            .upload
            .upload(text_upload("a.txt", "abc"))
            .await
            .unwrap_err();

        match &err {
            crate::core::error::AppError::OrphanedObject { storage_ref, .. } => {
                assert!(h.storage.contains(storage_ref));
            }
            other => panic!("expected orphan, got {:?}", other),
        }
        assert_eq!(err.code(), "ORPHANED_OBJECT");
    }

    #[tokio::test]
    async fn test_storage_failures_create_no_record() {
        let h = harness();
        h.storage.set_puts_rejected(true);
        let err = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_REJECTED");

        h.storage.set_puts_rejected(false);
        h.storage.set_put_delay(Some(Duration::from_secs(5)));
        let err = h.upload.upload(text_upload("a.txt", "abc")).await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");

        assert_eq!(h.store.len(), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_keeps_order() {
        let h = harness();
        let mut bad = text_upload("second.exe", "MZ");
        bad.mime_type = "application/x-msdownload".into();

        let outcomes = h
            .upload
            .upload_many(vec![
                text_upload("first.txt", "one"),
                bad,
                text_upload("third.txt", "three"),
            ])
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].file_name, "first.txt");
        assert_eq!(outcomes[1].file_name, "second.exe");
        assert_eq!(outcomes[2].file_name, "third.txt");
        assert!(outcomes[0].result.is_ok());
        assert_eq!(
            outcomes[1].result.as_ref().unwrap_err().code(),
            "UNSUPPORTED_TYPE"
        );
        assert_eq!(
            outcomes[2].result.as_ref().unwrap().original_name,
            "third.txt"
        );

        let (_, total) = h.store.query(&FileQuery::default()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(h.storage.object_count(), 2);
    }

    #[tokio::test]
    async fn test_batch_order_survives_out_of_order_completion() {
        let h = harness();
        h.storage.set_put_delay_for("slow.txt", Duration::from_millis(100));

        let outcomes = h
            .upload
            .upload_many(vec![
                text_upload("slow.txt", "one"),
                text_upload("fast.txt", "two"),
                text_upload("quick.txt", "three"),
            ])
            .await
            .unwrap();

        let names: Vec<_> = outcomes.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, vec!["slow.txt", "fast.txt", "quick.txt"]);

        let slow = outcomes[0].result.as_ref().unwrap();
        let quick = outcomes[2].result.as_ref().unwrap();
        assert_eq!(slow.original_name, "slow.txt");
        assert!(slow.created_at > quick.created_at);
    }

    #[tokio::test]
    async fn test_batch_limits() {
        let h = harness();
        let err = h.upload.upload_many(Vec::new()).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let too_many = (0..=h.upload.max_batch_files())
            .map(|i| text_upload(&format!("f{}.txt", i), "x"))
            .collect();
        let err = h.upload.upload_many(too_many).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(h.storage.object_count(), 0);
    }
}
