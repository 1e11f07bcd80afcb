use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::{metadata_call, storage_call};
use crate::core::config::UploadConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::dtos::{FileStatsDto, ListFilesQuery};
use crate::features::files::models::FileRecord;
use crate::features::files::store::{FileQuery, MetadataStore, SortField, SortOrder};
use crate::features::files::validator::{normalize_mime, MimeCategory};
use crate::modules::storage::StorageAdapter;
use crate::shared::constants::ANONYMOUS_UPLOADER;
use crate::shared::types::PageInfo;
use crate::shared::validation::parse_bool;

const ALL_CATEGORIES: [MimeCategory; 6] = [
    MimeCategory::Image,
    MimeCategory::Document,
    MimeCategory::Text,
    MimeCategory::Archive,
    MimeCategory::Media,
    MimeCategory::Other,
];

/// Read side: listing, lookup, statistics and download URLs
pub struct QueryService {
    storage: Arc<dyn StorageAdapter>,
    store: Arc<dyn MetadataStore>,
    storage_timeout: Duration,
    metadata_timeout: Duration,
    signed_url_ttl: Duration,
    default_page_size: i64,
    max_page_size: i64,
}

impl QueryService {
    pub fn new(
        config: &UploadConfig,
        storage: Arc<dyn StorageAdapter>,
        store: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            storage,
            store,
            storage_timeout: config.storage_timeout,
            metadata_timeout: config.metadata_timeout,
            signed_url_ttl: config.signed_url_ttl,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size.max(1),
        }
    }

    /// Turn raw query parameters into a bounded store query
    pub fn build_query(&self, params: ListFilesQuery) -> Result<FileQuery> {
        let sort_by = match params.sort_by.as_deref().map(str::trim) {
            None | Some("") => SortField::default(),
            Some(raw) => raw.parse().map_err(AppError::Validation)?,
        };
        let sort_order = match params.sort_order.as_deref().map(str::trim) {
            None | Some("") => SortOrder::default(),
            Some(raw) => raw.parse().map_err(AppError::Validation)?,
        };
        let is_public = match params.is_public.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_bool(raw).ok_or_else(|| {
                AppError::Validation(format!("Invalid isPublic '{}'. Expected true or false", raw))
            })?),
        };

        let non_empty = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(FileQuery {
            search: non_empty(params.search),
            uploaded_by: non_empty(params.uploaded_by),
            is_public,
            mime_type: non_empty(params.mime_type).map(|m| normalize_mime(&m)),
            sort_by,
            sort_order,
            page: params.page.unwrap_or(1).max(1),
            limit: params
                .limit
                .unwrap_or(self.default_page_size)
                .clamp(1, self.max_page_size),
        })
    }

    pub async fn list(&self, params: ListFilesQuery) -> Result<(Vec<FileRecord>, PageInfo)> {
        let query = self.build_query(params)?;
        let (files, total) =
            metadata_call(self.metadata_timeout, "query", self.store.query(&query)).await?;

        Ok((files, PageInfo::new(query.page, query.limit, total)))
    }

    pub async fn get(&self, id: Uuid) -> Result<FileRecord> {
        metadata_call(self.metadata_timeout, "get", self.store.get(id)).await
    }

    /// Aggregates from one consistent snapshot of the store
    pub async fn stats(&self) -> Result<FileStatsDto> {
        let snapshot = metadata_call(self.metadata_timeout, "stats", self.store.stats()).await?;

        let mut count_by_mime_category: BTreeMap<String, i64> = ALL_CATEGORIES
            .iter()
            .map(|c| (c.as_str().to_string(), 0))
            .collect();
        for (mime_type, count) in &snapshot.count_by_mime_type {
            *count_by_mime_category
                .entry(MimeCategory::from_mime(mime_type).as_str().to_string())
                .or_default() += count;
        }

        let mut count_by_uploader: BTreeMap<String, i64> = BTreeMap::new();
        for (uploader, count) in snapshot.count_by_uploader {
            let key = uploader.unwrap_or_else(|| ANONYMOUS_UPLOADER.to_string());
            *count_by_uploader.entry(key).or_default() += count;
        }

        Ok(FileStatsDto {
            total_files: snapshot.total_files,
            total_bytes: snapshot.total_bytes,
            count_by_mime_category,
            count_by_uploader,
        })
    }

    /// Public files resolve to their public URL, private ones to a signed URL
    pub async fn download_url(&self, id: Uuid) -> Result<String> {
        let file = self.get(id).await?;

        if file.is_public {
            return Ok(file.secure_url);
        }

        storage_call(
            self.storage_timeout,
            "signed url",
            self.storage.signed_url(&file.storage_ref, self.signed_url_ttl),
        )
        .await
    }
}
