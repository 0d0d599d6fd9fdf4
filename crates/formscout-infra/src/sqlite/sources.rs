//! SQLite source registry implementation.
//!
//! Implements `SourceRegistry` from `formscout-core` using sqlx with split
//! read/write pools: raw queries, private Row structs, reader for SELECTs,
//! writer for mutations.

use chrono::{DateTime, Utc};
use sqlx::Row;

use formscout_core::store::sources::SourceRegistry;
use formscout_types::error::StoreError;
use formscout_types::source::Source;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SourceRegistry`.
pub struct SqliteSourceRegistry {
    pool: DatabasePool,
}

impl SqliteSourceRegistry {
    /// Create a new registry backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain Source.
struct SourceRow {
    source_id: String,
    summary: Option<String>,
    total_word_count: i64,
    created_at: String,
    updated_at: Option<String>,
}

impl SourceRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            source_id: row.try_get("source_id")?,
            summary: row.try_get("summary")?,
            total_word_count: row.try_get("total_word_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_source(self) -> Result<Source, StoreError> {
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = self.updated_at.as_deref().map(parse_datetime).transpose()?;

        Ok(Source {
            source_id: self.source_id,
            summary: self.summary,
            total_word_count: self.total_word_count.max(0) as u64,
            created_at,
            updated_at,
        })
    }
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid timestamp '{value}': {e}")))
}

fn map_sqlx_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}

impl SourceRegistry for SqliteSourceRegistry {
    async fn upsert(&self, source_id: &str, summary: Option<&str>) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO sources (source_id, summary, total_word_count, created_at, updated_at)
            VALUES (?1, ?2, 0, ?3, NULL)
            ON CONFLICT(source_id) DO UPDATE SET
                summary = COALESCE(excluded.summary, sources.summary),
                updated_at = ?3
            "#,
        )
        .bind(source_id)
        .bind(summary)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, source_id: &str) -> Result<Option<Source>, StoreError> {
        let row = sqlx::query(
            "SELECT source_id, summary, total_word_count, created_at, updated_at
             FROM sources WHERE source_id = ?1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|row| {
            SourceRow::from_row(&row)
                .map_err(map_sqlx_error)
                .and_then(SourceRow::into_source)
        })
        .transpose()
    }

    async fn list(&self) -> Result<Vec<Source>, StoreError> {
        let rows = sqlx::query(
            "SELECT source_id, summary, total_word_count, created_at, updated_at
             FROM sources ORDER BY source_id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                SourceRow::from_row(row)
                    .map_err(map_sqlx_error)
                    .and_then(SourceRow::into_source)
            })
            .collect()
    }

    async fn add_word_count(&self, source_id: &str, words: u64) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE sources
             SET total_word_count = total_word_count + ?1, updated_at = ?2
             WHERE source_id = ?3",
        )
        .bind(words as i64)
        .bind(&now)
        .bind(source_id)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
