//! FastEmbed-based local embedding generator.
//!
//! Implements the `Embedder` trait from `formscout-core` using fastembed's
//! AllMiniLML6V2 model (the Rust packaging of sentence-transformers'
//! all-MiniLM-L6-v2, 384 dimensions) with ONNX runtime inference.

use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use formscout_core::embedding::embedder::Embedder;
use formscout_types::error::EmbeddingError;
use formscout_types::record::EMBEDDING_DIMENSION;

/// Model name recorded on stored vectors.
pub const MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Local sentence embedder over fastembed's ONNX runtime.
///
/// Inference is CPU-bound and blocking, so it runs on the blocking thread
/// pool; the model handle is shared across calls.
pub struct FastEmbedder {
    model: Arc<TextEmbedding>,
}

impl FastEmbedder {
    /// Load the AllMiniLML6V2 model, fetching its weights on first use.
    pub fn new() -> Result<Self, EmbeddingError> {
        let options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

impl Embedder for FastEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let batch: Vec<String> = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || model.embed(batch, None))
            .await
            .map_err(|e| EmbeddingError::Backend(format!("embedding task failed: {e}")))?
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        for vector in &vectors {
            if vector.len() != EMBEDDING_DIMENSION {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: EMBEDDING_DIMENSION,
                    actual: vector.len(),
                });
            }
        }

        Ok(vectors)
    }

    fn model_name(&self) -> &str {
        MODEL_NAME
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}
