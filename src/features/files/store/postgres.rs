use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::{FileQuery, MetadataError, MetadataStore, StatsSnapshot};
use crate::features::files::models::{FileChanges, FileRecord};

const FILE_COLUMNS: &str = "id, storage_ref, url, secure_url, original_name, sanitized_name, \
     mime_type, size_bytes, checksum_sha256, uploaded_by, tags, is_public, metadata, \
     created_at, updated_at";

/// PostgreSQL-backed metadata store
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape LIKE metacharacters so user input only ever matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters(builder: &mut QueryBuilder<'static, Postgres>, query: &FileQuery) {
    builder.push(" WHERE TRUE");

    if let Some(uploaded_by) = &query.uploaded_by {
        builder.push(" AND uploaded_by = ");
        builder.push_bind(uploaded_by.clone());
    }

    if let Some(is_public) = query.is_public {
        builder.push(" AND is_public = ");
        builder.push_bind(is_public);
    }

    if let Some(mime_type) = &query.mime_type {
        builder.push(" AND mime_type = ");
        builder.push_bind(mime_type.clone());
    }

    if let Some(search) = &query.search {
        let pattern = format!("%{}%", escape_like(search));

        builder.push(" AND (original_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR sanitized_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR metadata->>'title' ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR metadata->>'description' ILIKE ");
        builder.push_bind(pattern);
        // Tags are labels: exact containment, served by the GIN index
        builder.push(" OR tags @> ARRAY[");
        builder.push_bind(search.clone());
        builder.push("]::TEXT[])");
    }
}

fn build_select(query: &FileQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {} FROM files", FILE_COLUMNS));
    push_filters(&mut builder, query);

    // Sort column comes from a closed enum, id keeps pages stable on ties
    let direction = query.sort_order.as_sql();
    builder.push(format!(
        " ORDER BY {} {}, id {}",
        query.sort_by.column(),
        direction,
        direction
    ));
    builder.push(" LIMIT ");
    builder.push_bind(query.limit);
    builder.push(" OFFSET ");
    builder.push_bind(query.offset());

    builder
}

fn build_count(query: &FileQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM files");
    push_filters(&mut builder, query);
    builder
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn create(&self, record: &FileRecord) -> Result<FileRecord, MetadataError> {
        let sql = format!(
            r#"
            INSERT INTO files ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            FILE_COLUMNS, FILE_COLUMNS
        );

        let file = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(record.id)
            .bind(&record.storage_ref)
            .bind(&record.url)
            .bind(&record.secure_url)
            .bind(&record.original_name)
            .bind(&record.sanitized_name)
            .bind(&record.mime_type)
            .bind(record.size_bytes)
            .bind(&record.checksum_sha256)
            .bind(&record.uploaded_by)
            .bind(&record.tags)
            .bind(record.is_public)
            .bind(Json(&record.metadata))
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert file {}: {:?}", record.id, e);
                MetadataError::from(e)
            })?;

        debug!("File metadata saved: id={}, key={}", file.id, file.storage_ref);
        Ok(file)
    }

    async fn get(&self, id: Uuid) -> Result<FileRecord, MetadataError> {
        let sql = format!("SELECT {} FROM files WHERE id = $1", FILE_COLUMNS);

        sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(MetadataError::NotFound(id))
    }

    async fn update(&self, id: Uuid, changes: &FileChanges) -> Result<FileRecord, MetadataError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent merges into the same metadata map
        let sql = format!("SELECT {} FROM files WHERE id = $1 FOR UPDATE", FILE_COLUMNS);
        let mut file = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(MetadataError::NotFound(id))?;

        file.apply(changes, chrono::Utc::now())
            .map_err(MetadataError::Validation)?;

        let sql = format!(
            r#"
            UPDATE files
            SET tags = $2, is_public = $3, metadata = $4, updated_at = $5
            WHERE id = $1
            RETURNING {}
            "#,
            FILE_COLUMNS
        );
        let updated = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .bind(&file.tags)
            .bind(file.is_public)
            .bind(Json(&file.metadata))
            .bind(file.updated_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), MetadataError> {
        let result = sqlx::query("DELETE FROM files WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::NotFound(id));
        }

        Ok(())
    }

    async fn query(&self, query: &FileQuery) -> Result<(Vec<FileRecord>, i64), MetadataError> {
        // Page and total come from the same snapshot
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let total: i64 = build_count(query)
            .build_query_scalar()
            .fetch_one(&mut *tx)
            .await?;

        let files = build_select(query)
            .build_query_as::<FileRecord>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((files, total))
    }

    async fn stats(&self) -> Result<StatsSnapshot, MetadataError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let (total_files, total_bytes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0)::BIGINT FROM files",
        )
        .fetch_one(&mut *tx)
        .await?;

        let count_by_mime_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT mime_type, COUNT(*) FROM files GROUP BY mime_type ORDER BY mime_type",
        )
        .fetch_all(&mut *tx)
        .await?;

        let count_by_uploader: Vec<(Option<String>, i64)> = sqlx::query_as(
            "SELECT uploaded_by, COUNT(*) FROM files GROUP BY uploaded_by ORDER BY uploaded_by",
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(StatsSnapshot {
            total_files,
            total_bytes,
            count_by_mime_type,
            count_by_uploader,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::files::store::{SortField, SortOrder};

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_select_without_filters() {
        let builder = build_select(&FileQuery::default());
        let sql = builder.sql();

        assert!(sql.starts_with("SELECT id, storage_ref"));
        assert!(sql.contains("FROM files WHERE TRUE ORDER BY created_at DESC, id DESC"));
        assert!(sql.ends_with("LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn test_select_with_all_filters() {
        let query = FileQuery {
            search: Some("invoice".to_string()),
            uploaded_by: Some("alice".to_string()),
            is_public: Some(true),
            mime_type: Some("application/pdf".to_string()),
            sort_by: SortField::SizeBytes,
            sort_order: SortOrder::Asc,
            page: 3,
            limit: 20,
        };
        let builder = build_select(&query);
        let sql = builder.sql();

        assert!(sql.contains("uploaded_by = $1"));
        assert!(sql.contains("is_public = $2"));
        assert!(sql.contains("mime_type = $3"));
        assert!(sql.contains("original_name ILIKE $4"));
        assert!(sql.contains("metadata->>'title' ILIKE $6"));
        assert!(sql.contains("sanitized_name ILIKE $5"));
        assert!(sql.contains("tags @> ARRAY[$8]::TEXT[]"));
        assert!(sql.contains("ORDER BY size_bytes ASC, id ASC"));
        assert!(sql.ends_with("LIMIT $9 OFFSET $10"));
    }

    #[test]
    fn test_count_shares_filters() {
        let query = FileQuery {
            uploaded_by: Some("bob".to_string()),
            ..Default::default()
        };
        let builder = build_count(&query);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM files WHERE TRUE AND uploaded_by = $1"
        );
    }
}
