//! Storage module for file content
//!
//! The rest of the service only sees [`StorageAdapter`]: put a stream,
//! delete by reference, sign a URL. Providers live behind it (MinIO/S3 for
//! deployments, an in-memory store for development and tests).

mod memory;
mod minio_client;

use std::fmt;
use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::core::error::AppError;

pub use memory::InMemoryStorage;
pub use minio_client::MinIOClient;

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Opaque handle identifying the object in the provider
    pub storage_ref: String,
    pub url: String,
    pub secure_url: String,
}

/// What a delete found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing was stored under the reference, which is still a success
    NotFound,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage rejected the request: {0}")]
    Rejected(String),
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::Unavailable(msg) => AppError::StorageUnavailable(msg),
            StorageError::Rejected(msg) => AppError::StorageRejected(msg),
        }
    }
}

/// File content handed to a storage provider as a stream
pub struct UploadContent {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    size_bytes: u64,
    checksum_sha256: String,
}

impl UploadContent {
    /// Wrap content already in memory
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let checksum_sha256 = hex::encode(Sha256::digest(&data));
        let size_bytes = data.len() as u64;

        Self {
            reader: Box::new(Cursor::new(data)),
            size_bytes,
            checksum_sha256,
        }
    }

    /// Wrap a reader whose size and checksum were measured while it was produced
    pub fn from_reader(
        reader: impl AsyncRead + Send + Unpin + 'static,
        size_bytes: u64,
        checksum_sha256: String,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            size_bytes,
            checksum_sha256,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn checksum_sha256(&self) -> &str {
        &self.checksum_sha256
    }

    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}

impl fmt::Debug for UploadContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadContent")
            .field("size_bytes", &self.size_bytes)
            .field("checksum_sha256", &self.checksum_sha256)
            .finish_non_exhaustive()
    }
}

/// Capability interface over an object store / CDN
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Stream `content` to durable storage
    async fn put(
        &self,
        content: UploadContent,
        sanitized_name: &str,
        mime_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Idempotent: an absent object yields `DeleteOutcome::NotFound`, not an error
    async fn delete(&self, storage_ref: &str) -> Result<DeleteOutcome, StorageError>;

    /// Time-limited access URL for private content
    async fn signed_url(&self, storage_ref: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Percent-encode each segment of an object key for use in a URL path
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_upload_content_from_bytes() {
        let content = UploadContent::from_bytes(b"hello".to_vec());
        assert_eq!(content.size_bytes(), 5);
        assert_eq!(
            content.checksum_sha256(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let mut reader = content.into_reader();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("files/abc/my file.png"), "files/abc/my%20file.png");
    }

    #[test]
    fn test_storage_error_maps_to_app_error() {
        let err: AppError = StorageError::Rejected("bad request".into()).into();
        assert_eq!(err.code(), "STORAGE_REJECTED");
        let err: AppError = StorageError::Unavailable("timeout".into()).into();
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");
    }
}
