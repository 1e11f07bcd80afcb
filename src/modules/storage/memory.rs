//! In-memory storage provider
//!
//! Used when `STORAGE_BACKEND=memory` and by tests. Failure switches let
//! callers simulate an unavailable provider for each operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;
use uuid::Uuid;

use super::{
    encode_key, DeleteOutcome, StorageAdapter, StorageError, StoredObject, UploadContent,
};

/// Process-local object store keyed by storage reference
pub struct InMemoryStorage {
    base_url: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts_unavailable: AtomicBool,
    puts_rejected: AtomicBool,
    deletes_unavailable: AtomicBool,
    signing_unavailable: AtomicBool,
    put_delay: Mutex<Option<Duration>>,
    name_delays: Mutex<HashMap<String, Duration>>,
}

impl InMemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(HashMap::new()),
            puts_unavailable: AtomicBool::new(false),
            puts_rejected: AtomicBool::new(false),
            deletes_unavailable: AtomicBool::new(false),
            signing_unavailable: AtomicBool::new(false),
            put_delay: Mutex::new(None),
            name_delays: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map is still structurally valid
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn delay_for(&self, sanitized_name: &str) -> Option<Duration> {
        let by_name = self
            .name_delays
            .lock()
            .ok()
            .and_then(|delays| delays.get(sanitized_name).copied());
        by_name.or_else(|| self.put_delay.lock().ok().and_then(|guard| *guard))
    }

    fn object_url(&self, storage_ref: &str) -> String {
        format!("{}/{}", self.base_url, encode_key(storage_ref))
    }
}

/// Inspection and failure injection, for tests
#[cfg(test)]
impl InMemoryStorage {
    pub fn object_count(&self) -> usize {
        self.lock().len()
    }

    pub fn contains(&self, storage_ref: &str) -> bool {
        self.lock().contains_key(storage_ref)
    }

    pub fn object(&self, storage_ref: &str) -> Option<Vec<u8>> {
        self.lock().get(storage_ref).cloned()
    }

    /// Make every operation fail with `StorageError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.puts_unavailable.store(unavailable, Ordering::SeqCst);
        self.deletes_unavailable.store(unavailable, Ordering::SeqCst);
        self.signing_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_signing_unavailable(&self, unavailable: bool) {
        self.signing_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_deletes_unavailable(&self, unavailable: bool) {
        self.deletes_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_puts_rejected(&self, rejected: bool) {
        self.puts_rejected.store(rejected, Ordering::SeqCst);
    }

    /// Sleep before each `put` completes
    pub fn set_put_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.put_delay.lock() {
            *guard = delay;
        }
    }

    /// Sleep before the `put` of one file name, overriding the shared delay
    pub fn set_put_delay_for(&self, sanitized_name: &str, delay: Duration) {
        if let Ok(mut delays) = self.name_delays.lock() {
            delays.insert(sanitized_name.to_string(), delay);
        }
    }
}

#[async_trait]
impl StorageAdapter for InMemoryStorage {
    async fn put(
        &self,
        content: UploadContent,
        sanitized_name: &str,
        mime_type: &str,
    ) -> Result<StoredObject, StorageError> {
        if let Some(delay) = self.delay_for(sanitized_name) {
            tokio::time::sleep(delay).await;
        }

        if self.puts_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory storage switched off".to_string(),
            ));
        }
        if self.puts_rejected.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected(
                "in-memory storage refused the object".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(content.size_bytes() as usize);
        content
            .into_reader()
            .read_to_end(&mut data)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to read content: {}", e)))?;

        let storage_ref = format!("files/{}/{}", Uuid::now_v7(), sanitized_name);
        self.lock().insert(storage_ref.clone(), data);

        debug!("Stored in-memory object '{}' ({})", storage_ref, mime_type);

        let url = self.object_url(&storage_ref);
        Ok(StoredObject {
            storage_ref,
            secure_url: url.replacen("http://", "https://", 1),
            url,
        })
    }

    async fn delete(&self, storage_ref: &str) -> Result<DeleteOutcome, StorageError> {
        if self.deletes_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory storage switched off".to_string(),
            ));
        }

        match self.lock().remove(storage_ref) {
            Some(_) => {
                debug!("Deleted in-memory object '{}'", storage_ref);
                Ok(DeleteOutcome::Deleted)
            }
            None => Ok(DeleteOutcome::NotFound),
        }
    }

    async fn signed_url(&self, storage_ref: &str, ttl: Duration) -> Result<String, StorageError> {
        if self.signing_unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "in-memory storage switched off".to_string(),
            ));
        }

        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = hex::encode(Sha256::digest(format!("{}:{}", storage_ref, expires)));

        Ok(format!(
            "{}?expires={}&signature={}",
            self.object_url(storage_ref),
            expires,
            signature
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> InMemoryStorage {
        InMemoryStorage::new("http://localhost:9000/filevault")
    }

    #[tokio::test]
    async fn test_put_stores_content() {
        let storage = storage();
        let stored = storage
            .put(
                UploadContent::from_bytes(b"abc".to_vec()),
                "notes.txt",
                "text/plain",
            )
            .await
            .unwrap();

        assert!(stored.storage_ref.ends_with("/notes.txt"));
        assert!(stored.url.starts_with("http://localhost:9000/filevault/files/"));
        assert!(stored.secure_url.starts_with("https://"));
        assert_eq!(storage.object(&stored.storage_ref).unwrap(), b"abc");
        assert!(storage.contains(&stored.storage_ref));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = storage();
        let stored = storage
            .put(UploadContent::from_bytes(b"abc".to_vec()), "a.txt", "text/plain")
            .await
            .unwrap();

        let first = storage.delete(&stored.storage_ref).await.unwrap();
        let second = storage.delete(&stored.storage_ref).await.unwrap();

        assert_eq!(first, DeleteOutcome::Deleted);
        assert_eq!(second, DeleteOutcome::NotFound);
        assert_eq!(storage.object_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let storage = storage();
        storage.set_unavailable(true);
        let err = storage
            .put(UploadContent::from_bytes(b"abc".to_vec()), "a.txt", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(storage.delete("files/x/a.txt").await.is_err());

        storage.set_unavailable(false);
        storage.set_puts_rejected(true);
        let err = storage
            .put(UploadContent::from_bytes(b"abc".to_vec()), "a.txt", "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_signed_url_carries_expiry() {
        let url = storage()
            .signed_url("files/x/a.txt", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.contains("files/x/a.txt?expires="));
        assert!(url.contains("&signature="));
    }

    #[tokio::test]
    async fn test_signing_fails_independently_of_puts() {
        let storage = storage();
        storage.set_signing_unavailable(true);

        let err = storage
            .signed_url("files/x/a.txt", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(storage
            .put(UploadContent::from_bytes(b"abc".to_vec()), "a.txt", "text/plain")
            .await
            .is_ok());

        storage.set_signing_unavailable(false);
        storage.set_unavailable(true);
        assert!(storage
            .signed_url("files/x/a.txt", Duration::from_secs(60))
            .await
            .is_err());
    }
}
