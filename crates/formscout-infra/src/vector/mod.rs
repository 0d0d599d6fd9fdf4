//! Vector database infrastructure for record embeddings.
//!
//! Provides LanceDB store management and fastembed-based local embedding
//! generation. The Arrow schema defines the records table structure.

pub mod embedder;
pub mod lance;
pub mod records;
pub mod schema;
