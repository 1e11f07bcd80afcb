use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::shared::constants::{
    MAX_METADATA_KEYS, MAX_METADATA_STRING_LENGTH, MAX_TAGS, MAX_TAG_LENGTH,
};
use crate::shared::validation::METADATA_KEY_REGEX;

/// Scalar value allowed inside a file's metadata map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// Open key/value metadata (title, description, custom fields)
pub type FileMetadata = BTreeMap<String, MetadataValue>;

/// Database model for an uploaded file
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub storage_ref: String,
    pub url: String,
    pub secure_url: String,
    pub original_name: String,
    pub sanitized_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub checksum_sha256: String,
    pub uploaded_by: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    #[sqlx(json)]
    pub metadata: FileMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of the mutable fields of a [`FileRecord`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileChanges {
    /// Replaces the whole tag set
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
    /// Merged key by key, `None` removes the key
    pub metadata: Option<BTreeMap<String, Option<MetadataValue>>>,
}

impl FileChanges {
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.is_public.is_none() && self.metadata.is_none()
    }
}

impl FileRecord {
    /// Apply `changes` to the mutable fields and refresh `updated_at`.
    ///
    /// The record is left untouched when the result would break the tag or
    /// metadata bounds.
    pub fn apply(&mut self, changes: &FileChanges, now: DateTime<Utc>) -> Result<(), String> {
        let tags = match &changes.tags {
            Some(tags) => Some(normalize_tags(tags.clone())?),
            None => None,
        };

        let metadata = match &changes.metadata {
            Some(patch) => {
                let mut merged = self.metadata.clone();
                for (key, value) in patch {
                    match value {
                        Some(value) => {
                            merged.insert(key.clone(), value.clone());
                        }
                        None => {
                            merged.remove(key);
                        }
                    }
                }
                validate_metadata(&merged)?;
                Some(merged)
            }
            None => None,
        };

        if let Some(tags) = tags {
            self.tags = tags;
        }
        if let Some(is_public) = changes.is_public {
            self.is_public = is_public;
        }
        if let Some(metadata) = metadata {
            self.metadata = metadata;
        }
        self.updated_at = now;

        Ok(())
    }
}

/// Trim, drop empties and duplicates (first occurrence wins), then enforce bounds
pub fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, String> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();

    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(format!(
                "Tag '{}' is longer than {} characters",
                tag, MAX_TAG_LENGTH
            ));
        }
        if seen.insert(tag.to_string()) {
            normalized.push(tag.to_string());
        }
    }

    if normalized.len() > MAX_TAGS {
        return Err(format!("At most {} tags are allowed", MAX_TAGS));
    }

    Ok(normalized)
}

pub fn validate_metadata(metadata: &FileMetadata) -> Result<(), String> {
    if metadata.len() > MAX_METADATA_KEYS {
        return Err(format!(
            "Metadata may hold at most {} keys",
            MAX_METADATA_KEYS
        ));
    }

    for (key, value) in metadata {
        if !METADATA_KEY_REGEX.is_match(key) {
            return Err(format!(
                "Metadata key '{}' must be 1-64 characters of letters, digits, '_', '.' or '-'",
                key
            ));
        }
        match value {
            MetadataValue::String(s) if s.chars().count() > MAX_METADATA_STRING_LENGTH => {
                return Err(format!(
                    "Metadata value for '{}' is longer than {} characters",
                    key, MAX_METADATA_STRING_LENGTH
                ));
            }
            MetadataValue::Float(f) if !f.is_finite() => {
                return Err(format!("Metadata value for '{}' must be a finite number", key));
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> FileRecord {
        let created = Utc::now() - Duration::hours(1);
        FileRecord {
            id: Uuid::now_v7(),
            storage_ref: "files/abc/report.pdf".to_string(),
            url: "http://minio:9000/filevault/files/abc/report.pdf".to_string(),
            secure_url: "https://cdn.example.com/filevault/files/abc/report.pdf".to_string(),
            original_name: "report.pdf".to_string(),
            sanitized_name: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 2048,
            checksum_sha256: "00".repeat(32),
            uploaded_by: Some("alice".to_string()),
            tags: vec!["finance".to_string()],
            is_public: false,
            metadata: BTreeMap::from([(
                "title".to_string(),
                MetadataValue::String("Q3 report".to_string()),
            )]),
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn test_metadata_value_deserializes_scalars() {
        let parsed: FileMetadata = serde_json::from_str(
            r#"{"title":"x","pages":12,"ratio":0.5,"draft":true}"#,
        )
        .unwrap();
        assert_eq!(parsed["title"], MetadataValue::String("x".into()));
        assert_eq!(parsed["pages"], MetadataValue::Integer(12));
        assert_eq!(parsed["ratio"], MetadataValue::Float(0.5));
        assert_eq!(parsed["draft"], MetadataValue::Bool(true));

        assert!(serde_json::from_str::<FileMetadata>(r#"{"nested":{"a":1}}"#).is_err());
        assert!(serde_json::from_str::<FileMetadata>(r#"{"list":[1,2]}"#).is_err());
    }

    #[test]
    fn test_apply_touches_only_mutable_fields() {
        let mut file = record();
        let before = file.clone();
        let now = Utc::now();

        file.apply(
            &FileChanges {
                is_public: Some(true),
                ..Default::default()
            },
            now,
        )
        .unwrap();

        assert!(file.is_public);
        assert_eq!(file.updated_at, now);
        assert_eq!(file.size_bytes, before.size_bytes);
        assert_eq!(file.mime_type, before.mime_type);
        assert_eq!(file.storage_ref, before.storage_ref);
        assert_eq!(file.created_at, before.created_at);
        assert_eq!(file.tags, before.tags);
    }

    #[test]
    fn test_apply_merges_metadata_and_removes_nulls() {
        let mut file = record();
        let patch = BTreeMap::from([
            ("title".to_string(), None),
            (
                "description".to_string(),
                Some(MetadataValue::String("Quarterly numbers".into())),
            ),
        ]);

        file.apply(
            &FileChanges {
                metadata: Some(patch),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        assert!(!file.metadata.contains_key("title"));
        assert_eq!(
            file.metadata["description"],
            MetadataValue::String("Quarterly numbers".into())
        );
    }

    #[test]
    fn test_apply_rejects_invalid_result_without_changes() {
        let mut file = record();
        let before = file.clone();
        let patch = (0..=MAX_METADATA_KEYS)
            .map(|i| (format!("k{}", i), Some(MetadataValue::Integer(i as i64))))
            .collect();

        let result = file.apply(
            &FileChanges {
                is_public: Some(true),
                metadata: Some(patch),
                ..Default::default()
            },
            Utc::now(),
        );

        assert!(result.is_err());
        assert_eq!(file, before);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(vec![
            " invoices ".into(),
            "".into(),
            "2024".into(),
            "invoices".into(),
        ])
        .unwrap();
        assert_eq!(tags, vec!["invoices", "2024"]);

        assert!(normalize_tags(vec!["t".repeat(MAX_TAG_LENGTH + 1)]).is_err());
        assert!(normalize_tags((0..=MAX_TAGS).map(|i| i.to_string()).collect()).is_err());
    }

    #[test]
    fn test_validate_metadata_limits() {
        let bad_key = BTreeMap::from([("with space".to_string(), MetadataValue::Bool(true))]);
        assert!(validate_metadata(&bad_key).is_err());

        let long_value = BTreeMap::from([(
            "description".to_string(),
            MetadataValue::String("x".repeat(MAX_METADATA_STRING_LENGTH + 1)),
        )]);
        assert!(validate_metadata(&long_value).is_err());

        let ok = BTreeMap::from([("pages".to_string(), MetadataValue::Integer(3))]);
        assert!(validate_metadata(&ok).is_ok());
    }
}
