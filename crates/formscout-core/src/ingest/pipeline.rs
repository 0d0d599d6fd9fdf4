//! Batch ingestion pipeline.
//!
//! Takes crawler output, embeds it in sub-batches, upserts into the record
//! store, and keeps the source registry's bookkeeping current. Degrades
//! rather than aborts: empty chunks are skipped and counted, a failed
//! embedding sub-batch gets zero vectors, a failed insert sub-batch is
//! logged and the loop continues. Only a store that stays unavailable
//! through its retries stops the run.

use std::collections::HashMap;

use formscout_types::config::RetrievalConfig;
use formscout_types::error::{IngestError, StoreError};
use formscout_types::record::{ChunkInput, EmbeddedRecord};

use crate::embedding::embedder::Embedder;
use crate::ingest::pacer::RatePolicy;
use crate::retry::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, with_store_retries};
use crate::store::records::RecordStore;
use crate::store::sources::SourceRegistry;

/// Accounting for one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Chunks handed to the pipeline.
    pub received: usize,
    /// Records the store accepted.
    pub stored: u64,
    /// Chunks rejected up front (empty content).
    pub skipped_invalid: usize,
    /// Chunks stored with a substituted zero vector after an embedding
    /// failure. Candidates for the repair pass.
    pub embedding_failures: usize,
}

/// Embed-and-store pipeline over crawler output.
pub struct IngestPipeline<E, S, R, P> {
    embedder: E,
    store: S,
    sources: R,
    pacer: P,
    config: RetrievalConfig,
}

impl<E, S, R, P> IngestPipeline<E, S, R, P>
where
    E: Embedder,
    S: RecordStore,
    R: SourceRegistry,
    P: RatePolicy,
{
    pub fn new(embedder: E, store: S, sources: R, pacer: P, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            sources,
            pacer,
            config,
        }
    }

    /// Ingest one batch of chunks, pacing between sub-batches.
    pub async fn ingest(&self, batch: Vec<ChunkInput>) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            received: batch.len(),
            ..Default::default()
        };

        let valid: Vec<ChunkInput> = batch
            .into_iter()
            .filter(|chunk| {
                if chunk.content.trim().is_empty() {
                    tracing::warn!(
                        locator = %chunk.locator,
                        chunk_index = chunk.chunk_index,
                        "skipping chunk with empty content"
                    );
                    report.skipped_invalid += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        if valid.is_empty() {
            return Ok(report);
        }

        let batch_size = self.config.ingest_batch_size.max(1);
        let total_batches = valid.len().div_ceil(batch_size);
        let mut word_counts: HashMap<String, u64> = HashMap::new();

        for (batch_no, sub) in valid.chunks(batch_size).enumerate() {
            let texts: Vec<String> = sub.iter().map(|chunk| chunk.content.clone()).collect();
            let vectors = match self.embedder.embed(&texts).await {
                Ok(vectors) if vectors.len() == texts.len() => vectors,
                Ok(vectors) => {
                    tracing::warn!(
                        expected = texts.len(),
                        got = vectors.len(),
                        "embedder returned the wrong vector count, substituting zero vectors"
                    );
                    report.embedding_failures += texts.len();
                    vec![vec![0.0; self.embedder.dimension()]; texts.len()]
                }
                Err(error) => {
                    tracing::warn!(
                        %error,
                        "embedding failed for sub-batch, substituting zero vectors"
                    );
                    report.embedding_failures += texts.len();
                    vec![vec![0.0; self.embedder.dimension()]; texts.len()]
                }
            };

            let records: Vec<EmbeddedRecord> = sub
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(input, embedding)| EmbeddedRecord {
                    input,
                    embedding,
                    embedding_model: self.embedder.model_name().to_string(),
                })
                .collect();

            match with_store_retries(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, || {
                self.store.put(&records)
            })
            .await
            {
                Ok(stored) => {
                    report.stored += stored;
                    for record in &records {
                        *word_counts
                            .entry(record.input.source_id.clone())
                            .or_default() +=
                            record.input.content.split_whitespace().count() as u64;
                    }
                }
                Err(StoreError::Unavailable(message)) => {
                    return Err(IngestError::StoreUnavailable(message));
                }
                Err(error) => {
                    tracing::warn!(
                        %error,
                        batch_no,
                        "sub-batch insert failed, continuing with remaining batches"
                    );
                }
            }

            if batch_no + 1 < total_batches {
                self.pacer.pause().await;
            }
        }

        for (source_id, words) in word_counts {
            if let Err(error) = self.sources.upsert(&source_id, None).await {
                tracing::warn!(%error, source_id, "failed to upsert source registry entry");
                continue;
            }
            if let Err(error) = self.sources.add_word_count(&source_id, words).await {
                tracing::warn!(%error, source_id, "failed to update source word count");
            }
        }

        tracing::info!(
            received = report.received,
            stored = report.stored,
            skipped = report.skipped_invalid,
            embedding_failures = report.embedding_failures,
            "ingestion batch complete"
        );

        Ok(report)
    }
}
