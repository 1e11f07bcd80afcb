use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::features::files::validator::RejectionReason;
use crate::shared::types::ErrorBody;

#[derive(Debug, Error)]
pub enum AppError {
    /// Well-formed request carrying values the service refuses
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request that could not be parsed at all (multipart, JSON, query)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// File refused by the upload policy before any I/O
    #[error("File rejected ({reason}): {message}")]
    Rejected {
        reason: RejectionReason,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Storage rejected the request: {0}")]
    StorageRejected(String),

    #[error("Metadata store unavailable: {0}")]
    MetadataUnavailable(String),

    /// Content is stored but no FileRecord exists and cleanup failed
    #[error("Orphaned object '{storage_ref}': {reason}")]
    OrphanedObject { storage_ref: String, reason: String },

    /// Content is gone but the FileRecord could not be removed
    #[error("Partial delete of file {id} (object '{storage_ref}'): {reason}")]
    PartialDelete {
        id: Uuid,
        storage_ref: String,
        reason: String,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine readable code used in the `error` field
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::Rejected { reason, .. } => reason.code(),
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::StorageRejected(_) => "STORAGE_REJECTED",
            AppError::MetadataUnavailable(_) => "METADATA_UNAVAILABLE",
            AppError::OrphanedObject { .. } => "ORPHANED_OBJECT",
            AppError::PartialDelete { .. } => "PARTIAL_DELETE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected { reason, .. } => match reason {
                RejectionReason::Oversized => StatusCode::PAYLOAD_TOO_LARGE,
                RejectionReason::UnsupportedType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                RejectionReason::EmptyFile | RejectionReason::InvalidName => {
                    StatusCode::BAD_REQUEST
                }
            },
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::StorageRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::MetadataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::OrphanedObject { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PartialDelete { .. } => StatusCode::MULTI_STATUS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to any client
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::BadRequest(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            AppError::Rejected { message, .. } => message.clone(),
            AppError::StorageUnavailable(_) => {
                "Storage service is unavailable, please retry later".to_string()
            }
            AppError::StorageRejected(_) => "Storage service rejected the file".to_string(),
            AppError::MetadataUnavailable(_) => {
                "Metadata store is unavailable, please retry later".to_string()
            }
            AppError::OrphanedObject { storage_ref, .. } => format!(
                "File was stored as '{}' but its record could not be saved or cleaned up",
                storage_ref
            ),
            AppError::PartialDelete { id, .. } => format!(
                "File content was deleted but the record for {} could not be removed",
                id
            ),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Internal cause, only rendered outside production
    pub fn details(&self) -> Option<String> {
        match self {
            AppError::StorageUnavailable(detail)
            | AppError::StorageRejected(detail)
            | AppError::MetadataUnavailable(detail)
            | AppError::Internal(detail) => Some(detail.clone()),
            AppError::OrphanedObject { reason, .. } | AppError::PartialDelete { reason, .. } => {
                Some(reason.clone())
            }
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            message: self.public_message(),
            error: self.code().to_string(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Orphans and partial deletes are logged with their fields where they happen
        match &self {
            AppError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            AppError::StorageUnavailable(msg)
            | AppError::StorageRejected(msg)
            | AppError::MetadataUnavailable(msg) => {
                tracing::warn!("External service error: {}", msg)
            }
            _ => {}
        }

        let status = self.status();
        let body = self.to_body();
        let details = self.details();

        let mut response = (status, Json(body.clone())).into_response();

        // Kept aside for the development-only details layer
        if let Some(details) = details {
            response.extensions_mut().insert(ErrorBody {
                details: Some(details),
                ..body
            });
        }

        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases = vec![
            (
                AppError::Validation("bad".into()),
                "VALIDATION_ERROR",
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                AppError::BadRequest("bad".into()),
                "VALIDATION_ERROR",
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::Rejected {
                    reason: RejectionReason::Oversized,
                    message: "too big".into(),
                },
                "OVERSIZED",
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                AppError::Rejected {
                    reason: RejectionReason::UnsupportedType,
                    message: "nope".into(),
                },
                "UNSUPPORTED_TYPE",
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
            (
                AppError::NotFound("missing".into()),
                "NOT_FOUND",
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::StorageUnavailable("down".into()),
                "STORAGE_UNAVAILABLE",
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::StorageRejected("403".into()),
                "STORAGE_REJECTED",
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::PartialDelete {
                    id: Uuid::nil(),
                    storage_ref: "files/x".into(),
                    reason: "db down".into(),
                },
                "PARTIAL_DELETE",
                StatusCode::MULTI_STATUS,
            ),
        ];

        for (error, code, status) in cases {
            assert_eq!(error.code(), code);
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn test_internal_details_are_not_in_public_message() {
        let error = AppError::StorageUnavailable("connection refused to 10.0.0.4".into());
        assert!(!error.public_message().contains("10.0.0.4"));
        assert_eq!(
            error.details().as_deref(),
            Some("connection refused to 10.0.0.4")
        );
    }

    #[test]
    fn test_response_keeps_details_out_of_body() {
        let response = AppError::Internal("stack".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let stashed = response.extensions().get::<ErrorBody>().unwrap();
        assert_eq!(stashed.details.as_deref(), Some("stack"));
        assert_eq!(stashed.error, "INTERNAL_ERROR");
    }

    #[test]
    fn test_divergence_errors_render_with_details() {
        let response = AppError::OrphanedObject {
            storage_ref: "files/a/a.txt".into(),
            reason: "cleanup failed".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let stashed = response.extensions().get::<ErrorBody>().unwrap();
        assert_eq!(stashed.error, "ORPHANED_OBJECT");
        assert_eq!(stashed.details.as_deref(), Some("cleanup failed"));

        let response = AppError::PartialDelete {
            id: Uuid::now_v7(),
            storage_ref: "files/b/b.txt".into(),
            reason: "pool closed".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::MULTI_STATUS);
        let stashed = response.extensions().get::<ErrorBody>().unwrap();
        assert_eq!(stashed.error, "PARTIAL_DELETE");
    }
}
