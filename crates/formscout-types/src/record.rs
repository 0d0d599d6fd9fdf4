//! Record types for the formscout retrieval store.
//!
//! A record is one chunk of crawled page content together with its open
//! metadata mapping and embedding vector. Records are keyed by
//! `(locator, chunk_index)` and grouped into sources for scoped search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Output dimension of the sentence-embedding model (all-MiniLM-L6-v2).
pub const EMBEDDING_DIMENSION: usize = 384;

/// One chunk of extracted page content, as produced by the external crawler.
///
/// This is the ingestion input shape: no id, no embedding. The pipeline
/// embeds `content` and the store assigns the id on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInput {
    /// Origin page address. Together with `chunk_index` this uniquely
    /// identifies the record; re-ingesting the same pair updates in place.
    pub locator: String,
    pub chunk_index: u32,
    /// The text that gets embedded. Must be non-empty.
    pub content: String,
    /// Open metadata mapping (topic, form code, title, effective date,
    /// language list, mandatory flag, ...). No key is ever required.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Logical collection this chunk belongs to.
    pub source_id: String,
}

/// A chunk paired with its embedding, ready for storage.
#[derive(Debug, Clone)]
pub struct EmbeddedRecord {
    pub input: ChunkInput,
    /// Fixed-length embedding of `input.content` ([`EMBEDDING_DIMENSION`]).
    pub embedding: Vec<f32>,
    /// Name of the model that produced `embedding`.
    pub embedding_model: String,
}

/// A record as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned id. UUID v7, so id order is insertion order.
    pub id: Uuid,
    pub locator: String,
    pub chunk_index: u32,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub source_id: String,
    /// Name of the model that produced the stored vector.
    pub embedding_model: String,
    /// SHA-256 hex of `content` at write time. The repair path re-embeds
    /// any record whose hash no longer matches its content.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A record read back by a bounded scan, with its stored vector if it
/// could be parsed.
///
/// `embedding` is `None` when the stored vector is missing or fails the
/// dimension check; such records are skipped (and counted) by the fallback
/// search rather than failing the call.
#[derive(Debug, Clone)]
pub struct ScannedRecord {
    pub record: StoredRecord,
    pub embedding: Option<Vec<f32>>,
}

/// A record with its similarity to a query vector.
///
/// Similarity is cosine similarity in `[-1, 1]`, identical in meaning on
/// the engine-side and fallback search paths.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: StoredRecord,
    pub similarity: f32,
}
