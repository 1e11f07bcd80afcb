//! Multipart upload forms.
//!
//! File parts are spooled to an anonymous temporary file while they are
//! counted and hashed, so a request never holds a whole file in memory.

use std::io::SeekFrom;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::debug;

use crate::core::error::{AppError, Result};
use crate::features::files::models::{FileMetadata, MetadataValue};
use crate::features::files::services::UploadRequest;
use crate::features::files::validator::RejectionReason;
use crate::modules::storage::UploadContent;
use crate::shared::validation::parse_bool;

pub const SINGLE_FILE_FIELDS: &[&str] = &["file"];
pub const BATCH_FILE_FIELDS: &[&str] = &["files", "files[]"];

/// A file part written to local scratch space
#[derive(Debug)]
pub struct SpooledFile {
    pub file_name: String,
    pub mime_type: String,
    pub content: UploadContent,
}

/// Everything an upload form carries
#[derive(Debug, Default)]
pub struct UploadForm {
    pub files: Vec<SpooledFile>,
    pub uploaded_by: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub metadata: FileMetadata,
}

impl UploadForm {
    /// One request per file, sharing the form level attributes
    pub fn into_requests(self) -> Vec<UploadRequest> {
        let UploadForm {
            files,
            uploaded_by,
            tags,
            is_public,
            metadata,
        } = self;

        files
            .into_iter()
            .map(|file| UploadRequest {
                content: file.content,
                file_name: file.file_name,
                mime_type: file.mime_type,
                uploaded_by: uploaded_by.clone(),
                tags: tags.clone(),
                is_public,
                metadata: metadata.clone(),
            })
            .collect()
    }
}

fn multipart_error(error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::Rejected {
            reason: RejectionReason::Oversized,
            message: "Request body exceeds the upload size limit".to_string(),
        };
    }
    debug!("Failed to read multipart data: {}", error);
    AppError::BadRequest(format!("Failed to read multipart data: {}", error.body_text()))
}

fn spool_error(error: std::io::Error) -> AppError {
    AppError::Internal(format!("Failed to spool upload: {}", error))
}

/// Copy a file part to a temporary file.
///
/// Bytes past `max_size` are still read and counted but no longer written,
/// so the validator sees the real size and rejects the file.
pub async fn spool_field(mut field: Field<'_>, max_size: u64) -> Result<UploadContent> {
    let scratch = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(|e| AppError::Internal(format!("Spool task failed: {}", e)))?
        .map_err(spool_error)?;
    let mut file = tokio::fs::File::from_std(scratch);

    let mut hasher = Sha256::new();
    let mut size_bytes: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        let remaining = max_size.saturating_sub(size_bytes);
        size_bytes += chunk.len() as u64;
        if remaining == 0 {
            continue;
        }
        let keep = usize::try_from(remaining).unwrap_or(usize::MAX);
        let kept = &chunk[..chunk.len().min(keep)];
        hasher.update(kept);
        file.write_all(kept).await.map_err(spool_error)?;
    }

    file.flush().await.map_err(spool_error)?;
    file.seek(SeekFrom::Start(0)).await.map_err(spool_error)?;

    Ok(UploadContent::from_reader(
        BufReader::new(file),
        size_bytes,
        hex::encode(hasher.finalize()),
    ))
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String> {
    field.text().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            multipart_error(e)
        } else {
            AppError::BadRequest(format!("Failed to read {} field: {}", name, e.body_text()))
        }
    })
}

/// Read an upload form.
///
/// `file_fields` names the parts treated as files. More than `max_files`
/// file parts fail with `VALIDATION_ERROR` before anything is stored.
pub async fn read_upload_form(
    multipart: &mut Multipart,
    file_fields: &[&str],
    max_file_size: u64,
    max_files: usize,
) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        if file_fields.contains(&field_name.as_str()) {
            if form.files.len() >= max_files {
                return Err(AppError::Validation(format!(
                    "Too many files. Maximum is {}",
                    max_files
                )));
            }

            let file_name = field.file_name().unwrap_or_default().to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let content = spool_field(field, max_file_size).await?;

            debug!(
                "Spooled file part: name={}, size={}",
                file_name,
                content.size_bytes()
            );
            form.files.push(SpooledFile {
                file_name,
                mime_type,
                content,
            });
            continue;
        }

        match field_name.as_str() {
            "uploadedBy" => {
                let text = read_text(field, "uploadedBy").await?;
                form.uploaded_by = Some(text.trim().to_string()).filter(|v| !v.is_empty());
            }
            "tags" => {
                let text = read_text(field, "tags").await?;
                form.tags.extend(text.split(',').map(|t| t.to_string()));
            }
            "isPublic" => {
                let text = read_text(field, "isPublic").await?;
                if !text.trim().is_empty() {
                    form.is_public = parse_bool(&text).ok_or_else(|| {
                        AppError::Validation(format!(
                            "Invalid isPublic '{}'. Expected true or false",
                            text.trim()
                        ))
                    })?;
                }
            }
            "title" | "description" => {
                let text = read_text(field, &field_name).await?;
                let text = text.trim();
                if !text.is_empty() {
                    form.metadata
                        .insert(field_name.clone(), MetadataValue::String(text.to_string()));
                }
            }
            _ => {
                debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    if form.files.is_empty() {
        return Err(AppError::BadRequest("File is required".to_string()));
    }

    Ok(form)
}
