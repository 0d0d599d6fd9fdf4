//! LanceDB-backed record store.
//!
//! Implements `RecordStore` from `formscout-core` over a single `records`
//! table. The engine-side similarity path is LanceDB's cosine vector
//! search (`match_records`); the bounded `scan` feeds the client-side
//! fallback.
//!
//! Key behaviors:
//! - Upsert by `(locator, chunk_index)` via delete-then-add, preserving
//!   the record's id and creation time
//! - Batch inserts fall back to per-record insertion on failure
//! - Stored vectors that read back as missing or non-numeric are excluded
//!   from ranking, never an error
//! - SHA-256 content hash written alongside each record for the repair
//!   path's drift check

use std::cmp::Ordering;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use formscout_core::store::records::{MAX_SCAN_LIMIT, RecordStore, metadata_contains};
use formscout_types::error::{RecordParseError, StoreError};
use formscout_types::record::{
    EMBEDDING_DIMENSION, EmbeddedRecord, ScannedRecord, ScoredRecord, StoredRecord,
};

use super::lance::LanceStore;
use super::schema::{EMBEDDING_DIMENSION as VECTOR_COLUMN_LENGTH, RECORDS_TABLE, records_schema};

/// LanceDB-backed implementation of `RecordStore`.
pub struct LanceRecordStore {
    store: LanceStore,
}

/// One fully-resolved row, ready to serialize into a RecordBatch.
struct RecordRow {
    id: Uuid,
    locator: String,
    chunk_index: i32,
    content: String,
    metadata_json: String,
    source_id: String,
    embedding_model: String,
    content_hash: String,
    created_at: String,
    embedding: Vec<f32>,
}

/// Escape a value for use inside a single-quoted LanceDB filter literal.
fn sql_escape(value: &str) -> String {
    value.replace('\'', "''")
}

impl LanceRecordStore {
    pub fn new(store: LanceStore) -> Self {
        Self { store }
    }

    async fn ensure_records_table(&self) -> Result<lancedb::Table, StoreError> {
        let schema = Arc::new(records_schema());
        self.store
            .ensure_table(RECORDS_TABLE, schema)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open records table: {e}")))
    }

    fn compute_content_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn key_predicate(locator: &str, chunk_index: u32) -> String {
        format!(
            "locator = '{}' AND chunk_index = {}",
            sql_escape(locator),
            chunk_index
        )
    }

    /// Build an Arrow RecordBatch from resolved rows.
    fn build_record_batch(rows: &[RecordRow]) -> Result<RecordBatch, StoreError> {
        let schema = Arc::new(records_schema());

        let id_array =
            StringArray::from(rows.iter().map(|r| r.id.to_string()).collect::<Vec<_>>());
        let locator_array =
            StringArray::from(rows.iter().map(|r| r.locator.clone()).collect::<Vec<_>>());
        let chunk_index_array =
            Int32Array::from(rows.iter().map(|r| r.chunk_index).collect::<Vec<_>>());
        let content_array =
            StringArray::from(rows.iter().map(|r| r.content.clone()).collect::<Vec<_>>());
        let metadata_array = StringArray::from(
            rows.iter()
                .map(|r| r.metadata_json.clone())
                .collect::<Vec<_>>(),
        );
        let source_id_array =
            StringArray::from(rows.iter().map(|r| r.source_id.clone()).collect::<Vec<_>>());
        let embedding_model_array = StringArray::from(
            rows.iter()
                .map(|r| r.embedding_model.clone())
                .collect::<Vec<_>>(),
        );
        let content_hash_array = StringArray::from(
            rows.iter()
                .map(|r| r.content_hash.clone())
                .collect::<Vec<_>>(),
        );
        let created_at_array = StringArray::from(
            rows.iter()
                .map(|r| r.created_at.clone())
                .collect::<Vec<_>>(),
        );

        // Build FixedSizeList vector column
        let values: Vec<f32> = rows
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(
            field,
            VECTOR_COLUMN_LENGTH,
            Arc::new(Float32Array::from(values)),
            None,
        );

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(id_array),
                Arc::new(locator_array),
                Arc::new(chunk_index_array),
                Arc::new(content_array),
                Arc::new(metadata_array),
                Arc::new(source_id_array),
                Arc::new(embedding_model_array),
                Arc::new(content_hash_array),
                Arc::new(created_at_array),
                Arc::new(vector_array),
            ],
        )
        .map_err(|e| StoreError::Query(format!("Failed to build record batch: {e}")))
    }

    async fn add_rows(
        &self,
        table: &lancedb::Table,
        rows: &[RecordRow],
    ) -> Result<(), StoreError> {
        let batch = Self::build_record_batch(rows)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(reader)
            .execute()
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Query(format!("Failed to add records: {e}")))
    }

    /// Read the stored vector at one row, if it is usable: present, the
    /// right length, and numeric throughout.
    fn embedding_at(batch: &RecordBatch, row: usize) -> Option<Vec<f32>> {
        let vector_col = batch
            .column_by_name("vector")?
            .as_any()
            .downcast_ref::<FixedSizeListArray>()?;
        if vector_col.is_null(row) {
            return None;
        }
        let value = vector_col.value(row);
        let values = value.as_any().downcast_ref::<Float32Array>()?;
        if values.len() != EMBEDDING_DIMENSION {
            return None;
        }
        let vector: Vec<f32> = values.values().to_vec();
        if vector.iter().any(|x| !x.is_finite()) {
            return None;
        }
        Some(vector)
    }

    /// Parse Arrow RecordBatch rows into scanned records.
    ///
    /// Rows with an unusable vector come back with `embedding: None` and a
    /// per-record parse diagnostic; they are never fatal.
    fn record_batch_to_scanned(batch: &RecordBatch) -> Vec<ScannedRecord> {
        let num_rows = batch.num_rows();
        if num_rows == 0 {
            return vec![];
        }

        let id_col = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("id column should be StringArray");
        let locator_col = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("locator column should be StringArray");
        let chunk_index_col = batch
            .column(2)
            .as_any()
            .downcast_ref::<Int32Array>()
            .expect("chunk_index column should be Int32Array");
        let content_col = batch
            .column(3)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("content column should be StringArray");
        let metadata_col = batch
            .column(4)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("metadata column should be StringArray");
        let source_id_col = batch
            .column(5)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("source_id column should be StringArray");
        let embedding_model_col = batch
            .column(6)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("embedding_model column should be StringArray");
        let content_hash_col = batch
            .column(7)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("content_hash column should be StringArray");
        let created_at_col = batch
            .column(8)
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("created_at column should be StringArray");

        let mut scanned = Vec::with_capacity(num_rows);

        for i in 0..num_rows {
            let id = Uuid::parse_str(id_col.value(i)).unwrap_or_else(|_| Uuid::nil());
            let metadata: Map<String, Value> =
                serde_json::from_str(metadata_col.value(i)).unwrap_or_default();
            let created_at = DateTime::parse_from_rfc3339(created_at_col.value(i))
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            let record = StoredRecord {
                id,
                locator: locator_col.value(i).to_string(),
                chunk_index: chunk_index_col.value(i).max(0) as u32,
                content: content_col.value(i).to_string(),
                metadata,
                source_id: source_id_col.value(i).to_string(),
                embedding_model: embedding_model_col.value(i).to_string(),
                content_hash: content_hash_col.value(i).to_string(),
                created_at,
            };

            let embedding = Self::embedding_at(batch, i);
            if embedding.is_none() {
                let parse_error = RecordParseError {
                    locator: record.locator.clone(),
                    chunk_index: record.chunk_index,
                    reason: "missing or non-numeric stored vector".to_string(),
                };
                tracing::debug!(%parse_error, "record excluded from similarity ranking");
            }

            scanned.push(ScannedRecord { record, embedding });
        }

        scanned
    }

    fn record_batch_to_records(batch: &RecordBatch) -> Vec<StoredRecord> {
        Self::record_batch_to_scanned(batch)
            .into_iter()
            .map(|scanned| scanned.record)
            .collect()
    }

    /// Look up the identity of an existing `(locator, chunk_index)` row so
    /// an upsert can preserve it.
    async fn existing_identity(
        &self,
        table: &lancedb::Table,
        locator: &str,
        chunk_index: u32,
    ) -> Result<Option<(Uuid, String)>, StoreError> {
        let results = table
            .query()
            .only_if(Self::key_predicate(locator, chunk_index))
            .limit(1)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to look up existing record: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect lookup results: {e}")))?;

        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let id_col = batch
                .column(0)
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("id column should be StringArray");
            let created_at_col = batch
                .column(8)
                .as_any()
                .downcast_ref::<StringArray>()
                .expect("created_at column should be StringArray");

            let id = Uuid::parse_str(id_col.value(0)).unwrap_or_else(|_| Uuid::now_v7());
            return Ok(Some((id, created_at_col.value(0).to_string())));
        }

        Ok(None)
    }

    /// Stream the whole records table.
    async fn all_scanned(
        &self,
        table: &lancedb::Table,
    ) -> Result<Vec<ScannedRecord>, StoreError> {
        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read records: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect records: {e}")))?;

        let mut scanned = Vec::new();
        for batch in &batches {
            scanned.extend(Self::record_batch_to_scanned(batch));
        }
        Ok(scanned)
    }
}

impl RecordStore for LanceRecordStore {
    async fn put(&self, records: &[EmbeddedRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let table = self.ensure_records_table().await?;

        // Last write wins within a batch: keep only the final draft per key.
        let mut seen = std::collections::HashSet::new();
        let mut deduped: Vec<&EmbeddedRecord> = Vec::with_capacity(records.len());
        for draft in records.iter().rev() {
            if seen.insert((draft.input.locator.clone(), draft.input.chunk_index)) {
                deduped.push(draft);
            }
        }
        deduped.reverse();

        let mut rows: Vec<RecordRow> = Vec::with_capacity(deduped.len());
        for draft in deduped {
            if draft.embedding.len() != EMBEDDING_DIMENSION {
                tracing::warn!(
                    locator = %draft.input.locator,
                    chunk_index = draft.input.chunk_index,
                    got = draft.embedding.len(),
                    "skipping record with wrong embedding dimension"
                );
                continue;
            }

            // Upsert: drop any previous row for this key, keeping its
            // identity so id and creation time survive re-ingestion.
            let identity = self
                .existing_identity(&table, &draft.input.locator, draft.input.chunk_index)
                .await?;
            let (id, created_at) = match identity {
                Some((id, created_at)) => {
                    table
                        .delete(&Self::key_predicate(
                            &draft.input.locator,
                            draft.input.chunk_index,
                        ))
                        .await
                        .map_err(|e| {
                            StoreError::Query(format!("Failed to replace existing record: {e}"))
                        })?;
                    (id, created_at)
                }
                None => (Uuid::now_v7(), Utc::now().to_rfc3339()),
            };

            rows.push(RecordRow {
                id,
                locator: draft.input.locator.clone(),
                chunk_index: draft.input.chunk_index as i32,
                content: draft.input.content.clone(),
                metadata_json: Value::Object(draft.input.metadata.clone()).to_string(),
                source_id: draft.input.source_id.clone(),
                embedding_model: draft.embedding_model.clone(),
                content_hash: Self::compute_content_hash(&draft.input.content),
                created_at,
                embedding: draft.embedding.clone(),
            });
        }

        if rows.is_empty() {
            return Ok(0);
        }

        // Whole-batch insert first; per-record fallback keeps a partial
        // failure from discarding the rest of the batch.
        match self.add_rows(&table, &rows).await {
            Ok(()) => Ok(rows.len() as u64),
            Err(batch_error) => {
                tracing::warn!(%batch_error, "batch insert failed, retrying records individually");
                let mut stored = 0u64;
                for row in &rows {
                    match self.add_rows(&table, std::slice::from_ref(row)).await {
                        Ok(()) => stored += 1,
                        Err(error) => {
                            tracing::warn!(%error, locator = %row.locator, "failed to store record");
                        }
                    }
                }
                Ok(stored)
            }
        }
    }

    async fn get_by_metadata(
        &self,
        filter: &Map<String, Value>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let table = self.ensure_records_table().await?;
        let scanned = self.all_scanned(&table).await?;
        Ok(scanned
            .into_iter()
            .map(|s| s.record)
            .filter(|record| metadata_contains(&record.metadata, filter))
            .collect())
    }

    async fn count(&self, filter: Option<&Map<String, Value>>) -> Result<u64, StoreError> {
        match filter {
            None => {
                let table = self.ensure_records_table().await?;
                let count = table
                    .count_rows(None)
                    .await
                    .map_err(|e| StoreError::Query(format!("Failed to count records: {e}")))?;
                Ok(count as u64)
            }
            Some(filter) => {
                let matching = self.get_by_metadata(filter).await?;
                Ok(matching.len() as u64)
            }
        }
    }

    async fn scan(&self, limit: usize) -> Result<Vec<ScannedRecord>, StoreError> {
        let limit = limit.min(MAX_SCAN_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self.ensure_records_table().await?;
        let results = table
            .query()
            .limit(limit)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Scan failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect scan results: {e}")))?;

        let mut scanned = Vec::new();
        for batch in &batches {
            scanned.extend(Self::record_batch_to_scanned(batch));
        }
        scanned.truncate(limit);
        Ok(scanned)
    }

    async fn match_records(
        &self,
        query_embedding: &[f32],
        match_count: usize,
        filter: &Map<String, Value>,
        source_filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if query_embedding.len() != EMBEDDING_DIMENSION {
            return Err(StoreError::Query(format!(
                "query embedding must have {EMBEDDING_DIMENSION} dimensions, got {}",
                query_embedding.len()
            )));
        }
        if match_count == 0 {
            return Ok(Vec::new());
        }

        let table = self.ensure_records_table().await?;

        let mut query = table
            .vector_search(query_embedding)
            .map_err(|e| StoreError::Query(format!("Vector search setup failed: {e}")))?
            .distance_type(lancedb::DistanceType::Cosine);

        if let Some(source_id) = source_filter {
            query = query.only_if(format!("source_id = '{}'", sql_escape(source_id)));
        }

        // Over-fetch when a metadata filter will thin the results below.
        let fetch = if filter.is_empty() {
            match_count
        } else {
            match_count * 2
        };

        let results = query
            .limit(fetch)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect search results: {e}")))?;

        let mut scored: Vec<ScoredRecord> = Vec::new();
        for batch in &batches {
            if batch.num_rows() == 0 {
                continue;
            }

            // The _distance column is added by LanceDB vector search
            let distance_col = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            let records = Self::record_batch_to_records(batch);
            for (i, record) in records.into_iter().enumerate() {
                let distance = distance_col.map_or(0.0, |d| d.value(i));
                let similarity = 1.0 - distance;
                if !similarity.is_finite() {
                    // A malformed stored vector must never crash a search.
                    continue;
                }
                if !metadata_contains(&record.metadata, filter) {
                    continue;
                }
                scored.push(ScoredRecord { record, similarity });
            }
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(match_count);
        Ok(scored)
    }

    async fn delete(&self, locator: &str, chunk_index: u32) -> Result<(), StoreError> {
        let table = self.ensure_records_table().await?;
        table
            .delete(&Self::key_predicate(locator, chunk_index))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Query(format!("Failed to delete record: {e}")))
    }

    async fn needing_repair(&self, current_model: &str) -> Result<Vec<StoredRecord>, StoreError> {
        let table = self.ensure_records_table().await?;
        let scanned = self.all_scanned(&table).await?;

        Ok(scanned
            .into_iter()
            .filter(|row| {
                let usable = matches!(&row.embedding, Some(v) if v.iter().any(|x| *x != 0.0));
                !usable
                    || row.record.embedding_model != current_model
                    || row.record.content_hash != Self::compute_content_hash(&row.record.content)
            })
            .map(|row| row.record)
            .collect())
    }

    async fn update_embedding(
        &self,
        locator: &str,
        chunk_index: u32,
        embedding: &[f32],
        model_name: &str,
    ) -> Result<(), StoreError> {
        if embedding.len() != EMBEDDING_DIMENSION {
            return Err(StoreError::Query(format!(
                "replacement embedding must have {EMBEDDING_DIMENSION} dimensions, got {}",
                embedding.len()
            )));
        }

        let table = self.ensure_records_table().await?;
        let predicate = Self::key_predicate(locator, chunk_index);

        let results = table
            .query()
            .only_if(predicate.clone())
            .limit(1)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to read record for update: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to collect update lookup: {e}")))?;

        let record = batches
            .iter()
            .flat_map(Self::record_batch_to_records)
            .next()
            .ok_or(StoreError::NotFound)?;

        // Delete the old row and re-insert with the fresh vector, updated
        // model name, and recomputed content hash.
        table
            .delete(&predicate)
            .await
            .map_err(|e| StoreError::Query(format!("Failed to delete record for update: {e}")))?;

        let row = RecordRow {
            id: record.id,
            locator: record.locator.clone(),
            chunk_index: record.chunk_index as i32,
            content: record.content.clone(),
            metadata_json: Value::Object(record.metadata.clone()).to_string(),
            source_id: record.source_id.clone(),
            embedding_model: model_name.to_string(),
            content_hash: Self::compute_content_hash(&record.content),
            created_at: record.created_at.to_rfc3339(),
            embedding: embedding.to_vec(),
        };

        self.add_rows(&table, std::slice::from_ref(&row)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formscout_core::retrieval::fallback::fallback_search;
    use formscout_types::record::ChunkInput;
    use serde_json::json;

    /// Generate a simple deterministic embedding for testing.
    /// Uses a seed value to create distinct but reproducible vectors.
    fn make_embedding(seed: f32) -> Vec<f32> {
        let mut vec = vec![0.0_f32; EMBEDDING_DIMENSION];
        for (i, val) in vec.iter_mut().enumerate() {
            *val = ((i as f32 + seed) * 0.01).sin();
        }
        // Normalize to unit length for cosine similarity
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in vec.iter_mut() {
                *val /= norm;
            }
        }
        vec
    }

    fn draft(
        locator: &str,
        chunk_index: u32,
        content: &str,
        metadata: &[(&str, Value)],
        embedding: Vec<f32>,
    ) -> EmbeddedRecord {
        let mut map = Map::new();
        for (key, value) in metadata {
            map.insert((*key).to_string(), value.clone());
        }
        EmbeddedRecord {
            input: ChunkInput {
                locator: locator.to_string(),
                chunk_index,
                content: content.to_string(),
                metadata: map,
                source_id: "courts_forms".to_string(),
            },
            embedding,
            embedding_model: "all-MiniLM-L6-v2".to_string(),
        }
    }

    async fn setup_store() -> (LanceRecordStore, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let lance_store = LanceStore::new(temp_dir.path().to_path_buf())
            .await
            .expect("Failed to create LanceStore");
        (LanceRecordStore::new(lance_store), temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_count() {
        let (store, _tmp) = setup_store().await;
        assert_eq!(store.count(None).await.unwrap(), 0);

        let stored = store
            .put(&[
                draft("https://example.test/a", 0, "first", &[], make_embedding(1.0)),
                draft("https://example.test/a", 1, "second", &[], make_embedding(2.0)),
            ])
            .await
            .unwrap();

        assert_eq!(stored, 2);
        assert_eq!(store.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_upsert_is_idempotent() {
        let (store, _tmp) = setup_store().await;
        let batch = vec![draft(
            "https://example.test/a",
            0,
            "stable content",
            &[("topic", json!("divorce"))],
            make_embedding(1.0),
        )];

        assert_eq!(store.put(&batch).await.unwrap(), 1);
        let before = store.scan(10).await.unwrap();
        let original_id = before[0].record.id;
        let original_created_at = before[0].record.created_at;

        // Second put with the same key must update, not duplicate, and
        // must not error.
        assert_eq!(store.put(&batch).await.unwrap(), 1);
        assert_eq!(store.count(None).await.unwrap(), 1);

        let after = store.scan(10).await.unwrap();
        assert_eq!(after[0].record.id, original_id);
        assert_eq!(
            after[0].record.created_at.timestamp(),
            original_created_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_put_upsert_replaces_content() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[draft(
                "https://example.test/a",
                0,
                "old content",
                &[],
                make_embedding(1.0),
            )])
            .await
            .unwrap();
        store
            .put(&[draft(
                "https://example.test/a",
                0,
                "new content",
                &[],
                make_embedding(2.0),
            )])
            .await
            .unwrap();

        let rows = store.scan(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.content, "new content");
    }

    #[tokio::test]
    async fn test_put_same_key_twice_in_one_batch_keeps_last() {
        let (store, _tmp) = setup_store().await;
        let stored = store
            .put(&[
                draft("https://example.test/a", 0, "first write", &[], make_embedding(1.0)),
                draft("https://example.test/a", 0, "second write", &[], make_embedding(2.0)),
            ])
            .await
            .unwrap();

        assert_eq!(stored, 1);
        let rows = store.scan(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.content, "second write");
    }

    #[tokio::test]
    async fn test_put_skips_wrong_dimension() {
        let (store, _tmp) = setup_store().await;
        let stored = store
            .put(&[
                draft("https://example.test/a", 0, "good", &[], make_embedding(1.0)),
                draft("https://example.test/b", 0, "bad", &[], vec![0.1, 0.2, 0.3]),
            ])
            .await
            .unwrap();

        assert_eq!(stored, 1);
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_match_records_ranks_by_similarity() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[
                draft(
                    "https://example.test/fl100",
                    0,
                    "Petition for Dissolution FL-100",
                    &[("form_code", json!("FL-100"))],
                    make_embedding(1.0),
                ),
                draft(
                    "https://example.test/ud100",
                    0,
                    "Unlawful Detainer UD-100",
                    &[("form_code", json!("UD-100"))],
                    make_embedding(60.0),
                ),
                draft(
                    "https://example.test/sc100",
                    0,
                    "Small Claims SC-100",
                    &[("form_code", json!("SC-100"))],
                    make_embedding(120.0),
                ),
            ])
            .await
            .unwrap();

        let query = make_embedding(1.1);
        let results = store
            .match_records(&query, 2, &Map::new(), None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].record.metadata["form_code"],
            json!("FL-100")
        );
        assert!(results[0].similarity > results[1].similarity);
        assert!(results[0].similarity > 0.9);
    }

    #[tokio::test]
    async fn test_match_records_source_filter() {
        let (store, _tmp) = setup_store().await;
        let mut other = draft(
            "https://elsewhere.test/x",
            0,
            "other source",
            &[],
            make_embedding(1.0),
        );
        other.input.source_id = "other_source".to_string();

        store
            .put(&[
                draft("https://example.test/a", 0, "main source", &[], make_embedding(1.0)),
                other,
            ])
            .await
            .unwrap();

        let results = store
            .match_records(&make_embedding(1.0), 10, &Map::new(), Some("courts_forms"))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.source_id, "courts_forms");
    }

    #[tokio::test]
    async fn test_match_records_metadata_filter() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[
                draft(
                    "https://example.test/a",
                    0,
                    "divorce form",
                    &[("topic", json!("divorce"))],
                    make_embedding(1.0),
                ),
                draft(
                    "https://example.test/b",
                    0,
                    "eviction form",
                    &[("topic", json!("eviction"))],
                    make_embedding(1.2),
                ),
            ])
            .await
            .unwrap();

        let mut filter = Map::new();
        filter.insert("topic".to_string(), json!("eviction"));

        let results = store
            .match_records(&make_embedding(1.0), 10, &filter, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.metadata["topic"], json!("eviction"));
    }

    #[tokio::test]
    async fn test_match_records_empty_table() {
        let (store, _tmp) = setup_store().await;
        let results = store
            .match_records(&make_embedding(1.0), 5, &Map::new(), None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_match_records_rejects_wrong_query_dimension() {
        let (store, _tmp) = setup_store().await;
        let result = store
            .match_records(&[0.1, 0.2], 5, &Map::new(), None)
            .await;
        assert!(matches!(result, Err(StoreError::Query(_))));
    }

    #[tokio::test]
    async fn test_scan_respects_limit() {
        let (store, _tmp) = setup_store().await;
        let drafts: Vec<EmbeddedRecord> = (0..5)
            .map(|i| {
                draft(
                    &format!("https://example.test/p{i}"),
                    0,
                    "content",
                    &[],
                    make_embedding(i as f32),
                )
            })
            .collect();
        store.put(&drafts).await.unwrap();

        assert_eq!(store.scan(3).await.unwrap().len(), 3);
        // Oversized requests are clamped, not rejected.
        assert_eq!(store.scan(usize::MAX).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_scan_marks_non_numeric_vectors_unreadable() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[
                draft("https://example.test/good", 0, "good", &[], make_embedding(1.0)),
                draft(
                    "https://example.test/nan",
                    0,
                    "poisoned",
                    &[],
                    vec![f32::NAN; EMBEDDING_DIMENSION],
                ),
            ])
            .await
            .unwrap();

        let scanned = store.scan(10).await.unwrap();
        assert_eq!(scanned.len(), 2);

        let nan_row = scanned
            .iter()
            .find(|s| s.record.locator == "https://example.test/nan")
            .unwrap();
        assert!(nan_row.embedding.is_none());

        // The fallback search skips it and still returns the good record.
        let outcome = fallback_search(&store, &make_embedding(1.0), 5, 100)
            .await
            .unwrap();
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].record.locator, "https://example.test/good");
    }

    #[tokio::test]
    async fn test_get_by_metadata_containment() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[
                draft(
                    "https://example.test/a",
                    0,
                    "divorce petition",
                    &[("topic", json!("divorce")), ("form_code", json!("FL-100"))],
                    make_embedding(1.0),
                ),
                draft(
                    "https://example.test/b",
                    0,
                    "divorce summons",
                    &[("topic", json!("divorce")), ("form_code", json!("FL-110"))],
                    make_embedding(2.0),
                ),
            ])
            .await
            .unwrap();

        let mut filter = Map::new();
        filter.insert("topic".to_string(), json!("divorce"));
        assert_eq!(store.get_by_metadata(&filter).await.unwrap().len(), 2);

        filter.insert("form_code".to_string(), json!("FL-110"));
        let matching = store.get_by_metadata(&filter).await.unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].locator, "https://example.test/b");

        assert_eq!(store.count(Some(&filter)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_record() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[
                draft("https://example.test/a", 0, "keep", &[], make_embedding(1.0)),
                draft("https://example.test/a", 1, "drop", &[], make_embedding(2.0)),
            ])
            .await
            .unwrap();

        store.delete("https://example.test/a", 1).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);

        // Deleting a missing record is a no-op.
        store.delete("https://example.test/a", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_needing_repair_and_update_embedding() {
        let (store, _tmp) = setup_store().await;
        store
            .put(&[
                draft("https://example.test/ok", 0, "healthy", &[], make_embedding(1.0)),
                draft(
                    "https://example.test/zero",
                    0,
                    "zero vector",
                    &[],
                    vec![0.0; EMBEDDING_DIMENSION],
                ),
            ])
            .await
            .unwrap();

        let needing = store.needing_repair("all-MiniLM-L6-v2").await.unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].locator, "https://example.test/zero");

        store
            .update_embedding(
                "https://example.test/zero",
                0,
                &make_embedding(9.0),
                "all-MiniLM-L6-v2",
            )
            .await
            .unwrap();

        assert!(store.needing_repair("all-MiniLM-L6-v2").await.unwrap().is_empty());
        assert_eq!(store.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_needing_repair_flags_model_mismatch() {
        let (store, _tmp) = setup_store().await;
        let mut stale = draft(
            "https://example.test/stale",
            0,
            "stale model",
            &[],
            make_embedding(1.0),
        );
        stale.embedding_model = "old-model-v1".to_string();
        store.put(&[stale]).await.unwrap();

        let needing = store.needing_repair("all-MiniLM-L6-v2").await.unwrap();
        assert_eq!(needing.len(), 1);
        assert_eq!(needing[0].embedding_model, "old-model-v1");
    }

    #[tokio::test]
    async fn test_update_embedding_missing_record() {
        let (store, _tmp) = setup_store().await;
        let result = store
            .update_embedding("https://example.test/nope", 0, &make_embedding(1.0), "m")
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_primary_and_fallback_agree_on_ordering() {
        let (store, _tmp) = setup_store().await;
        let drafts: Vec<EmbeddedRecord> = (0..6)
            .map(|i| {
                draft(
                    &format!("https://example.test/p{i}"),
                    0,
                    &format!("record {i}"),
                    &[],
                    make_embedding((i * 17) as f32),
                )
            })
            .collect();
        store.put(&drafts).await.unwrap();

        let query = make_embedding(20.0);
        let primary = store
            .match_records(&query, 4, &Map::new(), None)
            .await
            .unwrap();
        let fallback = fallback_search(&store, &query, 4, 100).await.unwrap();

        assert_eq!(primary.len(), 4);
        assert_eq!(fallback.matches.len(), 4);
        let primary_order: Vec<&str> = primary
            .iter()
            .map(|r| r.record.locator.as_str())
            .collect();
        let fallback_order: Vec<&str> = fallback
            .matches
            .iter()
            .map(|r| r.record.locator.as_str())
            .collect();
        assert_eq!(primary_order, fallback_order);

        for (p, f) in primary.iter().zip(fallback.matches.iter()) {
            assert!(
                (p.similarity - f.similarity).abs() < 1e-4,
                "similarity mismatch: engine {} vs client {}",
                p.similarity,
                f.similarity
            );
        }
    }

    #[tokio::test]
    async fn test_locator_with_apostrophe_round_trips() {
        let (store, _tmp) = setup_store().await;
        let locator = "https://example.test/forms?name=plaintiff's-claim";
        store
            .put(&[draft(locator, 0, "Plaintiff's Claim", &[], make_embedding(1.0))])
            .await
            .unwrap();

        // Upsert through the quoted predicate still works.
        store
            .put(&[draft(locator, 0, "Plaintiff's Claim, amended", &[], make_embedding(1.0))])
            .await
            .unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);

        store.delete(locator, 0).await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 0);
    }
}
