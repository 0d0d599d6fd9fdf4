//! In-memory test doubles shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use formscout_types::error::{EmbeddingError, StoreError};
use formscout_types::record::{
    EMBEDDING_DIMENSION, EmbeddedRecord, ScannedRecord, ScoredRecord, StoredRecord,
};
use formscout_types::source::Source;

use crate::embedding::embedder::Embedder;
use crate::retrieval::similarity::cosine_similarity;
use crate::store::records::{MAX_SCAN_LIMIT, RecordStore, metadata_contains};
use crate::store::sources::SourceRegistry;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing test id, so insertion order and id order agree
/// the way UUID v7 ids do in production.
pub fn next_id() -> Uuid {
    Uuid::from_u128(NEXT_ID.fetch_add(1, Ordering::SeqCst) as u128)
}

/// Generate a simple deterministic embedding for testing.
/// Uses a seed value to create distinct but reproducible vectors.
pub fn make_embedding(seed: f32) -> Vec<f32> {
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

/// Cheap deterministic content hash (FNV-1a) standing in for the store
/// layer's SHA-256.
pub fn pseudo_hash(content: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in content.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    format!("{hash:016x}")
}

/// Build a stored record with the given metadata pairs.
pub fn make_record(
    locator: &str,
    chunk_index: u32,
    content: &str,
    metadata: &[(&str, Value)],
) -> StoredRecord {
    let mut map = Map::new();
    for (key, value) in metadata {
        map.insert((*key).to_string(), value.clone());
    }
    StoredRecord {
        id: next_id(),
        locator: locator.to_string(),
        chunk_index,
        content: content.to_string(),
        metadata: map,
        source_id: "test_source".to_string(),
        embedding_model: "stub-embedder".to_string(),
        content_hash: pseudo_hash(content),
        created_at: Utc::now(),
    }
}

/// Embedder double: returns canned vectors per exact text, a shared
/// default for everything else, and can be switched into failure mode.
pub struct StubEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    default_vector: Vec<f32>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            default_vector: make_embedding(999.0),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_vector(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for StubEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Backend("stub failure".to_string()));
        }
        let vectors = self.vectors.lock().unwrap();
        Ok(texts
            .iter()
            .map(|text| {
                vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.default_vector.clone())
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "stub-embedder"
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

/// In-memory `RecordStore` with injectable failure modes.
pub struct MemoryRecordStore {
    rows: Mutex<Vec<(StoredRecord, Option<Vec<f32>>)>>,
    fail_match: AtomicBool,
    fail_scan: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_match: AtomicBool::new(false),
            fail_scan: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Insert directly, bypassing `put` (lets tests seed unreadable
    /// embeddings).
    pub fn insert(&self, record: StoredRecord, embedding: Option<Vec<f32>>) {
        self.rows.lock().unwrap().push((record, embedding));
    }

    /// Make `match_records` fail with a query error.
    pub fn set_fail_match(&self, failing: bool) {
        self.fail_match.store(failing, Ordering::SeqCst);
    }

    /// Make `scan` fail with a query error.
    pub fn set_fail_scan(&self, failing: bool) {
        self.fail_scan.store(failing, Ordering::SeqCst);
    }

    /// Make every operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

impl RecordStore for MemoryRecordStore {
    async fn put(&self, records: &[EmbeddedRecord]) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock().unwrap();
        let mut stored = 0u64;
        for draft in records {
            if draft.embedding.len() != EMBEDDING_DIMENSION {
                continue;
            }
            let record = StoredRecord {
                id: next_id(),
                locator: draft.input.locator.clone(),
                chunk_index: draft.input.chunk_index,
                content: draft.input.content.clone(),
                metadata: draft.input.metadata.clone(),
                source_id: draft.input.source_id.clone(),
                embedding_model: draft.embedding_model.clone(),
                content_hash: pseudo_hash(&draft.input.content),
                created_at: Utc::now(),
            };
            let existing = rows.iter().position(|(r, _)| {
                r.locator == draft.input.locator && r.chunk_index == draft.input.chunk_index
            });
            match existing {
                Some(index) => {
                    // Update in place, preserving id and creation time.
                    let (slot, vector) = &mut rows[index];
                    let (id, created_at) = (slot.id, slot.created_at);
                    *slot = StoredRecord {
                        id,
                        created_at,
                        ..record
                    };
                    *vector = Some(draft.embedding.clone());
                }
                None => rows.push((record, Some(draft.embedding.clone()))),
            }
            stored += 1;
        }
        Ok(stored)
    }

    async fn get_by_metadata(
        &self,
        filter: &Map<String, Value>,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|(r, _)| metadata_contains(&r.metadata, filter))
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn count(&self, filter: Option<&Map<String, Value>>) -> Result<u64, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|(r, _)| filter.is_none_or(|f| metadata_contains(&r.metadata, f)))
            .count() as u64)
    }

    async fn scan(&self, limit: usize) -> Result<Vec<ScannedRecord>, StoreError> {
        self.check_available()?;
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(StoreError::Query("scan failure injected".to_string()));
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .take(limit.min(MAX_SCAN_LIMIT))
            .map(|(record, embedding)| ScannedRecord {
                record: record.clone(),
                embedding: embedding.clone(),
            })
            .collect())
    }

    async fn match_records(
        &self,
        query_embedding: &[f32],
        match_count: usize,
        filter: &Map<String, Value>,
        source_filter: Option<&str>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        self.check_available()?;
        if self.fail_match.load(Ordering::SeqCst) {
            return Err(StoreError::Query("match failure injected".to_string()));
        }
        let rows = self.rows.lock().unwrap();
        let mut scored: Vec<ScoredRecord> = rows
            .iter()
            .filter(|(r, _)| source_filter.is_none_or(|s| r.source_id == s))
            .filter(|(r, _)| metadata_contains(&r.metadata, filter))
            .filter_map(|(r, embedding)| {
                let embedding = embedding.as_ref()?;
                if embedding.len() != query_embedding.len() {
                    return None;
                }
                Some(ScoredRecord {
                    record: r.clone(),
                    similarity: cosine_similarity(query_embedding, embedding),
                })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(match_count);
        Ok(scored)
    }

    async fn delete(&self, locator: &str, chunk_index: u32) -> Result<(), StoreError> {
        self.check_available()?;
        self.rows
            .lock()
            .unwrap()
            .retain(|(r, _)| !(r.locator == locator && r.chunk_index == chunk_index));
        Ok(())
    }

    async fn needing_repair(&self, current_model: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.check_available()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|(r, embedding)| {
                let usable = matches!(embedding, Some(v) if v.len() == EMBEDDING_DIMENSION
                    && v.iter().all(|x| x.is_finite())
                    && v.iter().any(|x| *x != 0.0));
                !usable
                    || r.embedding_model != current_model
                    || r.content_hash != pseudo_hash(&r.content)
            })
            .map(|(r, _)| r.clone())
            .collect())
    }

    async fn update_embedding(
        &self,
        locator: &str,
        chunk_index: u32,
        embedding: &[f32],
        model_name: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|(r, _)| r.locator == locator && r.chunk_index == chunk_index)
            .ok_or(StoreError::NotFound)?;
        row.0.embedding_model = model_name.to_string();
        row.0.content_hash = pseudo_hash(&row.0.content);
        row.1 = Some(embedding.to_vec());
        Ok(())
    }
}

/// In-memory `SourceRegistry`.
pub struct MemorySourceRegistry {
    sources: Mutex<HashMap<String, Source>>,
}

impl MemorySourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
        }
    }
}

impl SourceRegistry for MemorySourceRegistry {
    async fn upsert(&self, source_id: &str, summary: Option<&str>) -> Result<(), StoreError> {
        let mut sources = self.sources.lock().unwrap();
        sources
            .entry(source_id.to_string())
            .and_modify(|source| {
                if summary.is_some() {
                    source.summary = summary.map(String::from);
                }
                source.updated_at = Some(Utc::now());
            })
            .or_insert_with(|| Source {
                source_id: source_id.to_string(),
                summary: summary.map(String::from),
                total_word_count: 0,
                created_at: Utc::now(),
                updated_at: None,
            });
        Ok(())
    }

    async fn get(&self, source_id: &str) -> Result<Option<Source>, StoreError> {
        Ok(self.sources.lock().unwrap().get(source_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Source>, StoreError> {
        let mut all: Vec<Source> = self.sources.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(all)
    }

    async fn add_word_count(&self, source_id: &str, words: u64) -> Result<(), StoreError> {
        let mut sources = self.sources.lock().unwrap();
        let source = sources
            .get_mut(source_id)
            .ok_or(StoreError::NotFound)?;
        source.total_word_count += words;
        source.updated_at = Some(Utc::now());
        Ok(())
    }
}
