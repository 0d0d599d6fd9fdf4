//! Record store trait.
//!
//! Defines the interface for the vector-capable record table: upsert
//! ingestion, metadata lookup, bounded scans for the fallback search path,
//! engine-side similarity search, and the repair surface.
//! Implementations (e.g. LanceDB) live in formscout-infra.

use formscout_types::error::StoreError;
use formscout_types::record::{EmbeddedRecord, ScannedRecord, ScoredRecord, StoredRecord};
use serde_json::{Map, Value};

/// Hard ceiling on scan windows, regardless of the requested limit.
///
/// Bounds memory and latency of the client-side fallback search.
pub const MAX_SCAN_LIMIT: usize = 1000;

/// Trait for vector-indexed record storage with engine-side similarity
/// search.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in formscout-infra.
///
/// Connectivity failures surface as [`StoreError::Unavailable`] and are
/// retryable by callers a bounded number of times; they are never silently
/// swallowed.
pub trait RecordStore: Send + Sync {
    /// Upsert records by `(locator, chunk_index)`, returning how many were
    /// stored.
    ///
    /// A failing batch falls back to per-record insertion rather than
    /// aborting; records whose embedding is not exactly the expected
    /// dimension are skipped (and excluded from the returned count).
    /// Re-inserting an identical record is success, not a conflict.
    fn put(
        &self,
        records: &[EmbeddedRecord],
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Exact-match containment lookup over the metadata mapping: every key
    /// in `filter` must be present with an equal value. No partial or
    /// fuzzy matching.
    fn get_by_metadata(
        &self,
        filter: &Map<String, Value>,
    ) -> impl std::future::Future<Output = Result<Vec<StoredRecord>, StoreError>> + Send;

    /// Count records, optionally restricted by a metadata containment
    /// filter.
    fn count(
        &self,
        filter: Option<&Map<String, Value>>,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;

    /// Bounded unordered read used by the fallback search path.
    ///
    /// Clamped to [`MAX_SCAN_LIMIT`] regardless of the requested limit.
    /// Records whose stored vector cannot be read carry `embedding: None`
    /// instead of failing the call.
    fn scan(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ScannedRecord>, StoreError>> + Send;

    /// Engine-side similarity search: rank by cosine similarity to
    /// `query_embedding`, scoped to `source_filter` when given, with
    /// `filter` applied as metadata containment.
    ///
    /// Returns at most `match_count` results, descending by similarity,
    /// ties broken by insertion order (earliest first).
    fn match_records(
        &self,
        query_embedding: &[f32],
        match_count: usize,
        filter: &Map<String, Value>,
        source_filter: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<ScoredRecord>, StoreError>> + Send;

    /// Delete one record. Deleting a missing record is a no-op.
    fn delete(
        &self,
        locator: &str,
        chunk_index: u32,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Records whose stored vector needs regenerating: unreadable,
    /// non-finite, or all-zero vector (a degraded ingestion run's
    /// substitution), content hash out of step with content, or an
    /// `embedding_model` other than `current_model`.
    fn needing_repair(
        &self,
        current_model: &str,
    ) -> impl std::future::Future<Output = Result<Vec<StoredRecord>, StoreError>> + Send;

    /// Replace a record's vector in place, updating its model name and
    /// content hash.
    fn update_embedding(
        &self,
        locator: &str,
        chunk_index: u32,
        embedding: &[f32],
        model_name: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}

/// Exact-match containment check: every key in `filter` present in
/// `metadata` with an equal value. Values compare structurally
/// (arrays/objects included); an empty filter matches everything.
pub fn metadata_contains(metadata: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
