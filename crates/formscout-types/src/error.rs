use thiserror::Error;

/// Errors from record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connectivity or configuration failure reaching the store.
    /// Always retryable by the caller a bounded number of times.
    #[error("record store unavailable: {0}")]
    Unavailable(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("record not found")]
    NotFound,
}

/// Errors from the embedding backend.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding backend failure: {0}")]
    Backend(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the retrieval facade.
///
/// Only these reach the end caller: malformed input, or a store that stayed
/// unreachable through bounded retries. Every other failure degrades to a
/// smaller or empty result set.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    Validation(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Errors surfaced by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
}

/// A stored embedding that could not be read back as a vector of the
/// expected dimension.
///
/// Per-record: the record is skipped and counted during scans, never fatal
/// to the batch.
#[derive(Debug, Error)]
#[error("unreadable stored embedding for {locator}#{chunk_index}: {reason}")]
pub struct RecordParseError {
    pub locator: String,
    pub chunk_index: u32,
    pub reason: String,
}
