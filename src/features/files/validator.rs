//! Upload policy checks.
//!
//! Everything here is pure: it runs before any storage or database call and
//! decides from the declared name, MIME type and size alone.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::core::config::UploadConfig;
use crate::core::error::AppError;
use crate::shared::constants::{
    ARCHIVE_MIME_TYPES, DOCUMENT_MIME_TYPES, IMAGE_MIME_TYPES, MAX_FILE_NAME_LENGTH,
    MEDIA_MIME_TYPES, TEXT_MIME_TYPES,
};
use crate::shared::validation::UNSAFE_NAME_CHARS;

/// Closed set of reasons a file is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    Oversized,
    UnsupportedType,
    EmptyFile,
    InvalidName,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::Oversized => "OVERSIZED",
            RejectionReason::UnsupportedType => "UNSUPPORTED_TYPE",
            RejectionReason::EmptyFile => "EMPTY_FILE",
            RejectionReason::InvalidName => "INVALID_NAME",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    pub message: String,
}

impl Rejection {
    fn new(reason: RejectionReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

impl From<Rejection> for AppError {
    fn from(rejection: Rejection) -> Self {
        AppError::Rejected {
            reason: rejection.reason,
            message: rejection.message,
        }
    }
}

/// Accepted file description, ready for the storage write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    pub original_name: String,
    pub sanitized_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Coarse grouping of MIME types, used by statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MimeCategory {
    Image,
    Document,
    Text,
    Archive,
    Media,
    Other,
}

impl MimeCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = normalize_mime(mime_type);
        let mime = mime.as_str();

        if IMAGE_MIME_TYPES.contains(&mime) || mime.starts_with("image/") {
            MimeCategory::Image
        } else if DOCUMENT_MIME_TYPES.contains(&mime) {
            MimeCategory::Document
        } else if TEXT_MIME_TYPES.contains(&mime) || mime.starts_with("text/") {
            MimeCategory::Text
        } else if ARCHIVE_MIME_TYPES.contains(&mime) {
            MimeCategory::Archive
        } else if MEDIA_MIME_TYPES.contains(&mime)
            || mime.starts_with("audio/")
            || mime.starts_with("video/")
        {
            MimeCategory::Media
        } else {
            MimeCategory::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MimeCategory::Image => "image",
            MimeCategory::Document => "document",
            MimeCategory::Text => "text",
            MimeCategory::Archive => "archive",
            MimeCategory::Media => "media",
            MimeCategory::Other => "other",
        }
    }
}

/// Lowercase and drop parameters: "Text/Plain; charset=utf-8" -> "text/plain"
pub fn normalize_mime(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Returns `(original_name, sanitized_name)` or `None` when nothing usable remains
pub fn sanitize_file_name(raw: &str) -> Option<(String, String)> {
    let original: String = raw.chars().filter(|c| !c.is_control()).collect();
    let original = original.trim().to_string();

    let base = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty()
        || base == "."
        || base == ".."
        || base.chars().count() > MAX_FILE_NAME_LENGTH
    {
        return None;
    }

    let replaced = UNSAFE_NAME_CHARS.replace_all(base, "_");
    let sanitized = replaced.trim_start_matches('.');
    let sanitized = if sanitized.is_empty() || sanitized.chars().all(|c| c == '_') {
        "file".to_string()
    } else {
        sanitized.to_string()
    };

    Some((original, sanitized))
}

/// Size and type policy applied to every upload
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_size: u64,
    allowed_mime_types: HashSet<String>,
}

impl UploadPolicy {
    pub fn new(max_file_size: u64, allowed_mime_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            max_file_size,
            allowed_mime_types: allowed_mime_types
                .into_iter()
                .map(|m| normalize_mime(&m))
                .collect(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_file_size, config.allowed_mime_types.clone())
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Checks, in order: empty, oversized, unsupported type, invalid name
    pub fn validate(
        &self,
        raw_name: &str,
        mime_type: &str,
        size_bytes: u64,
    ) -> Result<ValidatedFile, Rejection> {
        if size_bytes == 0 {
            return Err(Rejection::new(
                RejectionReason::EmptyFile,
                "File is empty",
            ));
        }

        if size_bytes > self.max_file_size {
            return Err(Rejection::new(
                RejectionReason::Oversized,
                format!(
                    "File too large. Maximum size is {} bytes ({} MB)",
                    self.max_file_size,
                    self.max_file_size / 1024 / 1024
                ),
            ));
        }

        let mime_type = normalize_mime(mime_type);
        if !self.allowed_mime_types.contains(&mime_type) {
            return Err(Rejection::new(
                RejectionReason::UnsupportedType,
                format!("File type '{}' is not allowed", mime_type),
            ));
        }

        let (original_name, sanitized_name) = sanitize_file_name(raw_name).ok_or_else(|| {
            Rejection::new(
                RejectionReason::InvalidName,
                "File name is empty or not usable",
            )
        })?;

        Ok(ValidatedFile {
            original_name,
            sanitized_name,
            mime_type,
            size_bytes,
        })
    }
}
