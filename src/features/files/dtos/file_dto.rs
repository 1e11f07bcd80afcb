use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::core::error::AppError;
use crate::features::files::models::{FileChanges, FileMetadata, FileRecord, MetadataValue};

/// Upload file request DTO for OpenAPI documentation
/// Note: This struct is for Swagger UI documentation only.
/// The actual handler uses axum's Multipart extractor directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
#[schema(rename_all = "camelCase")]
pub struct UploadFileDto {
    /// The file to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// Free-text identifier of the uploader
    #[schema(example = "alice")]
    pub uploaded_by: Option<String>,
    /// Comma-separated tags
    #[schema(example = "invoices,2024")]
    pub tags: Option<String>,
    /// Whether the file may be served from its public URL (default false)
    #[schema(example = "false")]
    pub is_public: Option<String>,
    /// Stored as `metadata.title`
    pub title: Option<String>,
    /// Stored as `metadata.description`
    pub description: Option<String>,
}

/// Batch upload request DTO for OpenAPI documentation
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
#[schema(rename_all = "camelCase")]
pub struct BatchUploadDto {
    /// Files to upload (field name `files` or `files[]`)
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub files: Vec<String>,
    pub uploaded_by: Option<String>,
    pub tags: Option<String>,
    pub is_public: Option<String>,
}

/// Response DTO for file operations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileResponseDto {
    pub id: Uuid,
    /// Opaque reference of the stored object
    pub storage_ref: String,
    pub url: String,
    pub secure_url: String,
    pub original_name: String,
    pub sanitized_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    /// Hex encoded SHA-256 of the content
    pub checksum_sha256: String,
    pub uploaded_by: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    #[schema(value_type = Object)]
    pub metadata: FileMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponseDto {
    fn from(file: FileRecord) -> Self {
        Self {
            id: file.id,
            storage_ref: file.storage_ref,
            url: file.url,
            secure_url: file.secure_url,
            original_name: file.original_name,
            sanitized_name: file.sanitized_name,
            mime_type: file.mime_type,
            size_bytes: file.size_bytes,
            checksum_sha256: file.checksum_sha256,
            uploaded_by: file.uploaded_by,
            tags: file.tags,
            is_public: file.is_public,
            metadata: file.metadata,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

/// Query params for listing files
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesQuery {
    /// Page number (1-indexed)
    #[param(minimum = 1)]
    pub page: Option<i64>,
    /// Items per page
    #[param(minimum = 1, maximum = 100)]
    pub limit: Option<i64>,
    /// Filter by uploader
    pub uploaded_by: Option<String>,
    /// Filter by visibility (`true` / `false`)
    pub is_public: Option<String>,
    /// Search in names, tags, title and description
    pub search: Option<String>,
    /// Filter by exact MIME type
    pub mime_type: Option<String>,
    /// createdAt (default), updatedAt, originalName, sizeBytes, mimeType
    pub sort_by: Option<String>,
    /// asc or desc (default)
    pub sort_order: Option<String>,
}

/// Fields a client may change. Everything else on a file is immutable.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateFileDto {
    /// Replaces the tag set
    #[validate(length(max = 32, message = "At most 32 tags are allowed"))]
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
    /// Merged into the existing metadata, `null` removes a key
    #[validate(length(max = 32, message = "At most 32 metadata keys may be changed at once"))]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<BTreeMap<String, Option<MetadataValue>>>,
}

const UPDATABLE_FIELDS: &[&str] = &["tags", "isPublic", "metadata"];

const IMMUTABLE_FIELDS: &[&str] = &[
    "id",
    "storageRef",
    "url",
    "secureUrl",
    "originalName",
    "sanitizedName",
    "mimeType",
    "sizeBytes",
    "checksumSha256",
    "uploadedBy",
    "createdAt",
    "updatedAt",
];

impl UpdateFileDto {
    /// Parse a raw JSON body, refusing immutable, unknown and empty updates
    pub fn from_json(body: Value) -> Result<Self, AppError> {
        let object = body
            .as_object()
            .ok_or_else(|| AppError::Validation("Request body must be a JSON object".to_string()))?;

        if let Some(field) = object.keys().find(|k| IMMUTABLE_FIELDS.contains(&k.as_str())) {
            return Err(AppError::Validation(format!(
                "Field '{}' is immutable",
                field
            )));
        }
        if let Some(field) = object.keys().find(|k| !UPDATABLE_FIELDS.contains(&k.as_str())) {
            return Err(AppError::Validation(format!(
                "Unknown field '{}'. Updatable fields: {}",
                field,
                UPDATABLE_FIELDS.join(", ")
            )));
        }
        if let Some(field) = object
            .iter()
            .find(|(k, v)| v.is_null() && k.as_str() != "metadata")
            .map(|(k, _)| k)
        {
            return Err(AppError::Validation(format!(
                "Field '{}' must not be null",
                field
            )));
        }

        let dto: UpdateFileDto = serde_json::from_value(body)
            .map_err(|e| AppError::Validation(format!("Invalid update: {}", e)))?;

        dto.validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if dto.tags.is_none() && dto.is_public.is_none() && dto.metadata.is_none() {
            return Err(AppError::Validation(
                "No updatable fields provided".to_string(),
            ));
        }

        Ok(dto)
    }
}

impl From<UpdateFileDto> for FileChanges {
    fn from(dto: UpdateFileDto) -> Self {
        Self {
            tags: dto.tags,
            is_public: dto.is_public,
            metadata: dto.metadata,
        }
    }
}

/// Per-file outcome in a batch upload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResultDto {
    /// Position of the file in the request
    pub index: usize,
    pub file_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<FileResponseDto>,
    /// Error code when the file failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Batch upload report
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponseDto {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BatchItemResultDto>,
}

impl BatchUploadResponseDto {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Aggregate statistics over all files
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStatsDto {
    pub total_files: i64,
    pub total_bytes: i64,
    /// image, document, text, archive, media, other
    pub count_by_mime_category: BTreeMap<String, i64>,
    /// Uploads without an uploader are counted under "anonymous"
    pub count_by_uploader: BTreeMap<String, i64>,
}

/// Response DTO for delete operations
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponseDto {
    pub id: Uuid,
    /// Confirmation that the file was deleted
    pub deleted: bool,
}
