use utoipa::OpenApi;

use crate::features::files::{dtos as files_dtos, handlers as files_handlers};
use crate::features::files::models::MetadataValue;
use crate::features::files::validator::{MimeCategory, RejectionReason};
use crate::shared::types::{ApiResponse, ErrorBody, PageInfo};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Files
        files_handlers::upload_file,
        files_handlers::batch_upload,
        files_handlers::list_files,
        files_handlers::get_stats,
        files_handlers::get_file,
        files_handlers::download_file,
        files_handlers::update_file,
        files_handlers::delete_file,
    ),
    components(
        schemas(
            // Shared
            ErrorBody,
            PageInfo,
            // Files
            MetadataValue,
            MimeCategory,
            RejectionReason,
            files_dtos::UploadFileDto,
            files_dtos::BatchUploadDto,
            files_dtos::FileResponseDto,
            files_dtos::UpdateFileDto,
            files_dtos::BatchItemResultDto,
            files_dtos::BatchUploadResponseDto,
            files_dtos::FileStatsDto,
            files_dtos::DeleteFileResponseDto,
            ApiResponse<files_dtos::FileResponseDto>,
            ApiResponse<Vec<files_dtos::FileResponseDto>>,
            ApiResponse<files_dtos::BatchUploadResponseDto>,
            ApiResponse<files_dtos::FileStatsDto>,
            ApiResponse<files_dtos::DeleteFileResponseDto>,
        )
    ),
    tags(
        (name = "files", description = "File upload, search and lifecycle"),
    ),
    info(
        title = "FileVault API",
        version = "0.1.0",
        description = "File upload and metadata service",
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_file_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/api/files",
            "/api/files/batch",
            "/api/files/stats",
            "/api/files/{id}",
            "/api/files/{id}/download",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
    }
}
