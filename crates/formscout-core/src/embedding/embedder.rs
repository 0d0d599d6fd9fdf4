//! Embedder trait for text-to-vector conversion.
//!
//! Defines the interface for embedding text into fixed-dimension vectors
//! for semantic search. Implementations (e.g. fastembed's local ONNX
//! models) live in formscout-infra.

use formscout_types::error::EmbeddingError;

/// Trait for converting text into embedding vectors.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations live in formscout-infra.
///
/// The contract: one vector per input, same order, constant dimension
/// across all calls. Callers that cannot tolerate a failure substitute a
/// zero vector rather than aborting their batch.
pub trait Embedder: Send + Sync {
    /// Embed one or more texts into vectors.
    ///
    /// Batch embedding is supported for throughput when multiple texts need
    /// embedding together; chunking policy belongs to the caller.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, EmbeddingError>> + Send;

    /// The model name recorded on stored vectors (e.g. "all-MiniLM-L6-v2").
    fn model_name(&self) -> &str;

    /// The dimensionality of the output vectors.
    fn dimension(&self) -> usize;
}
