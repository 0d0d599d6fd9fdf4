//! Arrow schema definition for the LanceDB records table.
//!
//! The vector field is a fixed-size float32 list: the schema itself rules
//! out the serialized-text embeddings that break engine-side search.
//!
//! Arrow versions MUST match lancedb's transitive dependency (57.3 for
//! lancedb 0.26).

use std::sync::Arc;

use arrow_schema::{DataType, Field, Schema};

/// all-MiniLM-L6-v2 embedding dimension, as an Arrow list length.
pub const EMBEDDING_DIMENSION: i32 = formscout_types::record::EMBEDDING_DIMENSION as i32;

/// Name of the records table.
pub const RECORDS_TABLE: &str = "records";

/// Schema for the records table in LanceDB.
///
/// One row per `(locator, chunk_index)` pair. Metadata is a serialized
/// JSON object (schema-less by design); the vector column is nullable so
/// a row written without an embedding is representable -- such rows are
/// excluded from ranking and flagged for repair.
pub fn records_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("locator", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        Field::new("source_id", DataType::Utf8, false),
        Field::new("embedding_model", DataType::Utf8, false),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("created_at", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                EMBEDDING_DIMENSION,
            ),
            true,
        ),
    ])
}
