use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Redirect,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::core::extractor::{AppJson, AppPath, AppQuery};
use crate::features::files::dtos::{
    BatchItemResultDto, BatchUploadDto, BatchUploadResponseDto, DeleteFileResponseDto,
    FileResponseDto, FileStatsDto, ListFilesQuery, UpdateFileDto, UploadFileDto,
};
use crate::features::files::form::{read_upload_form, BATCH_FILE_FIELDS, SINGLE_FILE_FIELDS};
use crate::features::files::services::{LifecycleService, QueryService, UploadService};
use crate::shared::types::{ApiResponse, ErrorBody};

/// Shared state for the files routes
#[derive(Clone)]
pub struct FilesState {
    pub upload_service: Arc<UploadService>,
    pub query_service: Arc<QueryService>,
    pub lifecycle_service: Arc<LifecycleService>,
}

/// Upload a file
///
/// Accepts multipart/form-data with:
/// - `file`: The file to upload (required)
/// - `uploadedBy`, `tags` (comma separated), `isPublic`, `title`, `description` (optional)
#[utoipa::path(
    post,
    path = "/api/files",
    tag = "files",
    request_body(
        content = UploadFileDto,
        content_type = "multipart/form-data",
        description = "File upload form",
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = ApiResponse<FileResponseDto>),
        (status = 400, description = "Malformed form, empty file or invalid name", body = ErrorBody),
        (status = 413, description = "File too large", body = ErrorBody),
        (status = 415, description = "File type not allowed", body = ErrorBody),
        (status = 422, description = "Invalid attributes", body = ErrorBody),
        (status = 503, description = "Storage or metadata store unavailable", body = ErrorBody)
    )
)]
pub async fn upload_file(
    State(state): State<FilesState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<FileResponseDto>>)> {
    let service = &state.upload_service;
    let form = read_upload_form(
        &mut multipart,
        SINGLE_FILE_FIELDS,
        service.policy().max_file_size(),
        1,
    )
    .await?;

    let request = form
        .into_requests()
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("File is required".to_string()))?;
    let file = service.upload(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(
            FileResponseDto::from(file),
            "File uploaded successfully",
        )),
    ))
}

/// Upload several files at once
///
/// Each file is processed independently. Responds 200 when every file was
/// stored and 207 when at least one failed.
#[utoipa::path(
    post,
    path = "/api/files/batch",
    tag = "files",
    request_body(
        content = BatchUploadDto,
        content_type = "multipart/form-data",
        description = "Batch upload form, files under `files[]`",
    ),
    responses(
        (status = 200, description = "All files uploaded", body = ApiResponse<BatchUploadResponseDto>),
        (status = 207, description = "Some files failed", body = ApiResponse<BatchUploadResponseDto>),
        (status = 400, description = "Malformed form", body = ErrorBody),
        (status = 422, description = "Too many files or invalid attributes", body = ErrorBody)
    )
)]
pub async fn batch_upload(
    State(state): State<FilesState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<BatchUploadResponseDto>>)> {
    let service = &state.upload_service;
    let form = read_upload_form(
        &mut multipart,
        BATCH_FILE_FIELDS,
        service.policy().max_file_size(),
        service.max_batch_files(),
    )
    .await?;

    let outcomes = service.upload_many(form.into_requests()).await?;

    let results: Vec<BatchItemResultDto> = outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| match outcome.result {
            Ok(file) => BatchItemResultDto {
                index,
                file_name: outcome.file_name,
                success: true,
                data: Some(file.into()),
                error: None,
                message: None,
            },
            Err(e) => BatchItemResultDto {
                index,
                file_name: outcome.file_name,
                success: false,
                data: None,
                error: Some(e.code().to_string()),
                message: Some(e.public_message()),
            },
        })
        .collect();

    let failed = results.iter().filter(|r| !r.success).count();
    let report = BatchUploadResponseDto {
        total: results.len(),
        succeeded: results.len() - failed,
        failed,
        results,
    };

    let (status, message) = if report.all_succeeded() {
        (StatusCode::OK, "All files uploaded successfully".to_string())
    } else {
        (
            StatusCode::MULTI_STATUS,
            format!("{} of {} files failed", report.failed, report.total),
        )
    };
    let all_succeeded = report.all_succeeded();

    let mut body = ApiResponse::success(report, message);
    body.success = all_succeeded;

    Ok((status, Json(body)))
}

/// List files with search, filters, sorting and pagination
#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Page of files", body = ApiResponse<Vec<FileResponseDto>>),
        (status = 422, description = "Invalid filter or sort value", body = ErrorBody)
    )
)]
pub async fn list_files(
    State(state): State<FilesState>,
    AppQuery(params): AppQuery<ListFilesQuery>,
) -> Result<Json<ApiResponse<Vec<FileResponseDto>>>> {
    let (files, page_info) = state.query_service.list(params).await?;
    let dtos: Vec<FileResponseDto> = files.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::paginated(
        dtos,
        "Files retrieved successfully",
        page_info,
    )))
}

/// Get a file by ID
#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File found", body = ApiResponse<FileResponseDto>),
        (status = 404, description = "File not found", body = ErrorBody)
    )
)]
pub async fn get_file(
    State(state): State<FilesState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<FileResponseDto>>> {
    let file = state.query_service.get(id).await?;
    Ok(Json(ApiResponse::success(
        FileResponseDto::from(file),
        "File retrieved successfully",
    )))
}

/// Aggregate counts and sizes
#[utoipa::path(
    get,
    path = "/api/files/stats",
    tag = "files",
    responses(
        (status = 200, description = "File statistics", body = ApiResponse<FileStatsDto>)
    )
)]
pub async fn get_stats(State(state): State<FilesState>) -> Result<Json<ApiResponse<FileStatsDto>>> {
    let stats = state.query_service.stats().await?;
    Ok(Json(ApiResponse::success(
        stats,
        "Statistics retrieved successfully",
    )))
}

/// Redirect to the file content
///
/// Public files redirect to their public URL, private files to a short
/// lived signed URL.
#[utoipa::path(
    get,
    path = "/api/files/{id}/download",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 307, description = "Redirect to the content"),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 503, description = "Storage unavailable", body = ErrorBody)
    )
)]
pub async fn download_file(
    State(state): State<FilesState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Redirect> {
    let url = state.query_service.download_url(id).await?;
    Ok(Redirect::temporary(&url))
}

/// Update tags, visibility or metadata
#[utoipa::path(
    put,
    path = "/api/files/{id}",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    request_body = UpdateFileDto,
    responses(
        (status = 200, description = "File updated", body = ApiResponse<FileResponseDto>),
        (status = 400, description = "Malformed JSON", body = ErrorBody),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 422, description = "Immutable, unknown or invalid fields", body = ErrorBody)
    )
)]
pub async fn update_file(
    State(state): State<FilesState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(body): AppJson<Value>,
) -> Result<Json<ApiResponse<FileResponseDto>>> {
    let dto = UpdateFileDto::from_json(body)?;
    let file = state.lifecycle_service.update(id, dto.into()).await?;

    Ok(Json(ApiResponse::success(
        FileResponseDto::from(file),
        "File updated successfully",
    )))
}

/// Delete a file and its stored content
#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    params(("id" = Uuid, Path, description = "File ID")),
    responses(
        (status = 200, description = "File deleted", body = ApiResponse<DeleteFileResponseDto>),
        (status = 207, description = "Content deleted but the record remains", body = ErrorBody),
        (status = 404, description = "File not found", body = ErrorBody),
        (status = 503, description = "Storage unavailable, nothing deleted", body = ErrorBody)
    )
)]
pub async fn delete_file(
    State(state): State<FilesState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<DeleteFileResponseDto>>> {
    let file = state.lifecycle_service.delete(id).await?;

    Ok(Json(ApiResponse::success(
        DeleteFileResponseDto {
            id: file.id,
            deleted: true,
        },
        "File deleted successfully",
    )))
}
