//! Metadata persistence for uploaded files
//!
//! Services depend on [`MetadataStore`] only. `PgMetadataStore` backs real
//! deployments; `InMemoryMetadataStore` serves local development and tests.

mod memory;
mod postgres;

use std::str::FromStr;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::error::AppError;
use crate::features::files::models::{FileChanges, FileRecord};

pub use memory::InMemoryMetadataStore;
pub use postgres::PgMetadataStore;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("file {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for MetadataError {
    fn from(error: sqlx::Error) -> Self {
        MetadataError::Unavailable(error.to_string())
    }
}

impl From<MetadataError> for AppError {
    fn from(error: MetadataError) -> Self {
        match error {
            MetadataError::NotFound(id) => AppError::NotFound(format!("File {} not found", id)),
            MetadataError::Validation(msg) => AppError::Validation(msg),
            MetadataError::Unavailable(msg) => AppError::MetadataUnavailable(msg),
        }
    }
}

/// Sortable fields for file listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    OriginalName,
    SizeBytes,
    MimeType,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::OriginalName => "original_name",
            SortField::SizeBytes => "size_bytes",
            SortField::MimeType => "mime_type",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "createdAt" | "created_at" => Ok(SortField::CreatedAt),
            "updatedAt" | "updated_at" => Ok(SortField::UpdatedAt),
            "originalName" | "original_name" => Ok(SortField::OriginalName),
            "sizeBytes" | "size_bytes" => Ok(SortField::SizeBytes),
            "mimeType" | "mime_type" => Ok(SortField::MimeType),
            other => Err(format!(
                "Invalid sortBy '{}'. Expected one of: createdAt, updatedAt, originalName, sizeBytes, mimeType",
                other
            )),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!(
                "Invalid sortOrder '{}'. Expected 'asc' or 'desc'",
                other
            )),
        }
    }
}

/// Validated listing query. `page` and `limit` are already clamped.
#[derive(Debug, Clone, PartialEq)]
pub struct FileQuery {
    pub search: Option<String>,
    pub uploaded_by: Option<String>,
    pub is_public: Option<bool>,
    pub mime_type: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: i64,
    pub limit: i64,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            search: None,
            uploaded_by: None,
            is_public: None,
            mime_type: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: crate::shared::constants::DEFAULT_PAGE_SIZE,
        }
    }
}

impl FileQuery {
    /// Saturates, so a page past the end is simply empty
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit.max(0))
    }
}

/// Raw aggregates taken from a single snapshot of the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_files: i64,
    pub total_bytes: i64,
    pub count_by_mime_type: Vec<(String, i64)>,
    pub count_by_uploader: Vec<(Option<String>, i64)>,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn create(&self, record: &FileRecord) -> Result<FileRecord, MetadataError>;

    async fn get(&self, id: Uuid) -> Result<FileRecord, MetadataError>;

    /// Apply `changes` atomically with respect to other updates of the same record
    async fn update(&self, id: Uuid, changes: &FileChanges) -> Result<FileRecord, MetadataError>;

    async fn delete(&self, id: Uuid) -> Result<(), MetadataError>;

    /// Matching page of records plus the total match count
    async fn query(&self, query: &FileQuery) -> Result<(Vec<FileRecord>, i64), MetadataError>;

    async fn stats(&self) -> Result<StatsSnapshot, MetadataError>;
}
