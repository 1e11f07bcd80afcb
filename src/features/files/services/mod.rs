mod lifecycle_service;
mod query_service;
mod upload_service;

use std::future::Future;
use std::time::Duration;

pub use lifecycle_service::LifecycleService;
pub use query_service::QueryService;
pub use upload_service::{UploadRequest, UploadService};

use crate::core::error::{AppError, Result};
use crate::features::files::store::MetadataError;
use crate::modules::storage::StorageError;

/// Bound a storage call, a timeout counts as the provider being unavailable
async fn storage_call<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = std::result::Result<T, StorageError>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::StorageUnavailable(format!(
            "storage {} timed out after {}s",
            operation,
            limit.as_secs_f64()
        ))),
    }
}

/// Bound a metadata store call, a timeout counts as the store being unavailable
async fn metadata_call<T>(
    limit: Duration,
    operation: &str,
    call: impl Future<Output = std::result::Result<T, MetadataError>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::MetadataUnavailable(format!(
            "metadata {} timed out after {}s",
            operation,
            limit.as_secs_f64()
        ))),
    }
}
