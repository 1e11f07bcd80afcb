//! MinIO/S3-compatible storage client
//!
//! Streams uploads into a single bucket, deletes idempotently and signs
//! download URLs for MinIO or any S3-compatible storage service.
//!
//! Uses rust-s3 crate for lightweight S3 operations.

use std::time::Duration;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{encode_key, DeleteOutcome, StorageAdapter, StorageError, StoredObject, UploadContent};
use crate::core::config::MinIOConfig;

/// MinIO/S3-compatible storage client
pub struct MinIOClient {
    bucket: Box<Bucket>,
    region: Region,
    credentials: Credentials,
    endpoint: String,
    public_endpoint: String,
    key_prefix: String,
}

impl MinIOClient {
    /// Create a new MinIO client from configuration and make sure the bucket exists
    pub async fn new(config: MinIOConfig) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| {
            StorageError::Unavailable(format!("Failed to create MinIO credentials: {}", e))
        })?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };

        let mut bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| {
                StorageError::Unavailable(format!("Failed to create MinIO bucket handle: {}", e))
            })?;

        // Use path-style URLs for MinIO (http://endpoint/bucket instead of http://bucket.endpoint)
        bucket.set_path_style();

        let client = Self {
            bucket,
            region,
            credentials,
            endpoint: config.endpoint,
            public_endpoint: config.public_endpoint,
            key_prefix: config.key_prefix,
        };

        client.ensure_bucket_exists().await;

        info!(
            "MinIO client initialized for endpoint: {}, bucket: {}, key_prefix: {}",
            client.endpoint,
            client.bucket.name(),
            client.key_prefix
        );

        Ok(client)
    }

    /// Ensure the bucket exists, create if not
    async fn ensure_bucket_exists(&self) {
        // Try to create bucket - if it already exists, MinIO will return an error
        // which we can safely ignore
        match Bucket::create_with_path_style(
            &self.bucket.name(),
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        {
            Ok(_) => info!("Bucket '{}' created successfully", self.bucket.name()),
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("BucketAlreadyOwnedByYou")
                    || error_str.contains("BucketAlreadyExists")
                    || error_str.contains("already own it")
                {
                    debug!("Bucket '{}' already exists", self.bucket.name());
                } else {
                    // Bucket might exist with different error, the first put will tell
                    warn!(
                        "Could not create bucket '{}': {}. Assuming it exists.",
                        self.bucket.name(),
                        e
                    );
                }
            }
        }
    }

    pub fn bucket_name(&self) -> String {
        self.bucket.name()
    }

    /// Generate an object key: `{prefix}/{uuid}/{sanitized_name}`
    pub fn generate_key(&self, sanitized_name: &str) -> String {
        let object_id = Uuid::now_v7();
        if self.key_prefix.is_empty() {
            format!("{}/{}", object_id, sanitized_name)
        } else {
            format!("{}/{}/{}", self.key_prefix, object_id, sanitized_name)
        }
    }

    /// Direct URL on the internal endpoint
    pub fn get_file_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint,
            self.bucket.name(),
            encode_key(key)
        )
    }

    /// URL on the public (CDN) endpoint
    pub fn get_public_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_endpoint,
            self.bucket.name(),
            encode_key(key)
        )
    }

    /// Check if an object exists in the storage
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let context = format!("head '{}'", key);
        match self.bucket.head_object(key).await {
            Ok((_, status)) => exists_from_status(&context, status),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(map_s3_error(&context, e)),
        }
    }
}

/// Non-2xx answers arrive as `Ok` with their status, 404 means absent
fn exists_from_status(context: &str, status: u16) -> Result<bool, StorageError> {
    match status {
        200..=299 => Ok(true),
        404 => Ok(false),
        _ => Err(classify_status(context, status, "")),
    }
}

/// Provider 4xx means the request itself was refused, anything else is retryable
fn map_s3_error(context: &str, error: S3Error) -> StorageError {
    match error {
        S3Error::HttpFailWithBody(status, body) => classify_status(context, status, &body),
        other => StorageError::Unavailable(format!("{}: {}", context, other)),
    }
}

fn classify_status(context: &str, status: u16, body: &str) -> StorageError {
    let message = format!("{}: HTTP {} {}", context, status, body);
    match status {
        408 | 429 => StorageError::Unavailable(message),
        400..=499 => StorageError::Rejected(message),
        _ => StorageError::Unavailable(message),
    }
}

#[async_trait]
impl StorageAdapter for MinIOClient {
    async fn put(
        &self,
        content: UploadContent,
        sanitized_name: &str,
        mime_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = self.generate_key(sanitized_name);
        let size_bytes = content.size_bytes();
        let mut reader = content.into_reader();

        let response = self
            .bucket
            .put_object_stream_with_content_type(&mut reader, &key, mime_type)
            .await
            .map_err(|e| map_s3_error(&format!("upload '{}'", key), e))?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(classify_status(&format!("upload '{}'", key), status, ""));
        }

        debug!(
            "Uploaded file '{}' ({} bytes) to bucket '{}'",
            key,
            size_bytes,
            self.bucket.name()
        );

        Ok(StoredObject {
            url: self.get_file_url(&key),
            secure_url: self.get_public_url(&key),
            storage_ref: key,
        })
    }

    async fn delete(&self, storage_ref: &str) -> Result<DeleteOutcome, StorageError> {
        // S3 answers 204 for absent keys too, so ask first to report NotFound
        if !self.exists(storage_ref).await? {
            debug!("File '{}' already absent from bucket", storage_ref);
            return Ok(DeleteOutcome::NotFound);
        }

        let response = self
            .bucket
            .delete_object(storage_ref)
            .await
            .map_err(|e| map_s3_error(&format!("delete '{}'", storage_ref), e))?;

        let status = response.status_code();
        if status == 404 {
            return Ok(DeleteOutcome::NotFound);
        }
        if !(200..300).contains(&status) {
            return Err(classify_status(
                &format!("delete '{}'", storage_ref),
                status,
                "",
            ));
        }

        debug!(
            "Deleted file '{}' from bucket '{}'",
            storage_ref,
            self.bucket.name()
        );
        Ok(DeleteOutcome::Deleted)
    }

    async fn signed_url(&self, storage_ref: &str, ttl: Duration) -> Result<String, StorageError> {
        let expiry_secs = u32::try_from(ttl.as_secs()).unwrap_or(u32::MAX).max(1);

        self.bucket
            .presign_get(storage_ref, expiry_secs, None)
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!(
                    "Failed to generate presigned URL for '{}': {}",
                    storage_ref, e
                ))
            })
    }
}
