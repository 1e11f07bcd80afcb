use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::{FileQuery, MetadataError, MetadataStore, SortField, SortOrder, StatsSnapshot};
use crate::features::files::models::{FileChanges, FileRecord, MetadataValue};

/// Process-local metadata store
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: RwLock<HashMap<Uuid, FileRecord>>,
    creates_failing: AtomicBool,
    deletes_failing: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    creates_land_early: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, FileRecord>> {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, FileRecord>> {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Inspection and failure injection, for tests
#[cfg(test)]
impl InMemoryMetadataStore {
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn set_creates_failing(&self, failing: bool) {
        self.creates_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_deletes_failing(&self, failing: bool) {
        self.deletes_failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep before each `create` completes
    pub fn set_create_delay(&self, delay: Option<Duration>) {
        if let Ok(mut guard) = self.create_delay.lock() {
            *guard = delay;
        }
    }

    /// Store the record before the `create` delay, like an insert that
    /// commits but whose acknowledgement never arrives in time
    pub fn set_creates_land_early(&self, early: bool) {
        self.creates_land_early.store(early, Ordering::SeqCst);
    }

    /// Insert a record as-is, bypassing the service pipeline
    pub fn insert(&self, record: FileRecord) {
        self.write().insert(record.id, record);
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn metadata_text_matches(record: &FileRecord, key: &str, needle: &str) -> bool {
    matches!(record.metadata.get(key), Some(MetadataValue::String(s)) if contains_ignore_case(s, needle))
}

fn matches_query(record: &FileRecord, query: &FileQuery) -> bool {
    if let Some(uploaded_by) = &query.uploaded_by {
        if record.uploaded_by.as_deref() != Some(uploaded_by.as_str()) {
            return false;
        }
    }
    if let Some(is_public) = query.is_public {
        if record.is_public != is_public {
            return false;
        }
    }
    if let Some(mime_type) = &query.mime_type {
        if &record.mime_type != mime_type {
            return false;
        }
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let hit = contains_ignore_case(&record.original_name, &needle)
            || contains_ignore_case(&record.sanitized_name, &needle)
            || metadata_text_matches(record, "title", &needle)
            || metadata_text_matches(record, "description", &needle)
            || record.tags.iter().any(|t| t == search);
        if !hit {
            return false;
        }
    }
    true
}

fn compare(a: &FileRecord, b: &FileRecord, field: SortField) -> CmpOrdering {
    let primary = match field {
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        SortField::OriginalName => a.original_name.cmp(&b.original_name),
        SortField::SizeBytes => a.size_bytes.cmp(&b.size_bytes),
        SortField::MimeType => a.mime_type.cmp(&b.mime_type),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn create(&self, record: &FileRecord) -> Result<FileRecord, MetadataError> {
        if self.creates_land_early.load(Ordering::SeqCst) {
            self.write().insert(record.id, record.clone());
        }

        let delay = self.create_delay.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.creates_failing.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable(
                "in-memory metadata store refused the write".to_string(),
            ));
        }

        self.write().insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn get(&self, id: Uuid) -> Result<FileRecord, MetadataError> {
        self.read()
            .get(&id)
            .cloned()
            .ok_or(MetadataError::NotFound(id))
    }

    async fn update(&self, id: Uuid, changes: &FileChanges) -> Result<FileRecord, MetadataError> {
        let mut records = self.write();
        let record = records.get_mut(&id).ok_or(MetadataError::NotFound(id))?;

        record
            .apply(changes, chrono::Utc::now())
            .map_err(MetadataError::Validation)?;

        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), MetadataError> {
        if self.deletes_failing.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable(
                "in-memory metadata store refused the delete".to_string(),
            ));
        }

        self.write()
            .remove(&id)
            .map(|_| ())
            .ok_or(MetadataError::NotFound(id))
    }

    async fn query(&self, query: &FileQuery) -> Result<(Vec<FileRecord>, i64), MetadataError> {
        let mut hits: Vec<FileRecord> = self
            .read()
            .values()
            .filter(|record| matches_query(record, query))
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = hits.len() as i64;
        let page = hits
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();

        Ok((page, total))
    }

    async fn stats(&self) -> Result<StatsSnapshot, MetadataError> {
        let records = self.read();

        let mut by_mime: BTreeMap<String, i64> = BTreeMap::new();
        let mut by_uploader: BTreeMap<Option<String>, i64> = BTreeMap::new();
        let mut total_bytes = 0;

        for record in records.values() {
            total_bytes += record.size_bytes;
            *by_mime.entry(record.mime_type.clone()).or_default() += 1;
            *by_uploader.entry(record.uploaded_by.clone()).or_default() += 1;
        }

        Ok(StatsSnapshot {
            total_files: records.len() as i64,
            total_bytes,
            count_by_mime_type: by_mime.into_iter().collect(),
            count_by_uploader: by_uploader.into_iter().collect(),
        })
    }
}
