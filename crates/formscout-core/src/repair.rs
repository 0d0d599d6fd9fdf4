//! Embedding repair.
//!
//! Stored vectors are not trusted blindly: a record can carry an
//! unreadable vector (e.g. a zero-vector substitution from a degraded
//! ingestion run), a vector from an older model, or content that changed
//! out from under its hash. The repair pass finds those records and
//! re-embeds them from `content` in place.

use formscout_types::error::StoreError;

use crate::embedding::embedder::Embedder;
use crate::store::records::RecordStore;

/// Accounting for one repair pass.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Records flagged as needing repair.
    pub examined: usize,
    /// Records successfully re-embedded and updated in place.
    pub reembedded: usize,
    /// Records left for a later pass after an embed or update failure.
    pub failed: usize,
}

/// Re-embeds records whose stored vector fails the read-side checks.
pub struct RepairService<E, S> {
    embedder: E,
    store: S,
}

impl<E: Embedder, S: RecordStore> RepairService<E, S> {
    pub fn new(embedder: E, store: S) -> Self {
        Self { embedder, store }
    }

    /// Run one repair pass over the corpus.
    ///
    /// Individual failures are counted and left for the next pass; only a
    /// store error while listing candidates fails the call.
    pub async fn repair(&self) -> Result<RepairReport, StoreError> {
        let model = self.embedder.model_name();
        let candidates = self.store.needing_repair(model).await?;

        let mut report = RepairReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for record in candidates {
            let texts = [record.content.clone()];
            let vector = match self.embedder.embed(&texts).await {
                Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
                Ok(_) => {
                    tracing::warn!(
                        locator = %record.locator,
                        chunk_index = record.chunk_index,
                        "embedder returned no vector during repair"
                    );
                    report.failed += 1;
                    continue;
                }
                Err(error) => {
                    tracing::warn!(
                        %error,
                        locator = %record.locator,
                        chunk_index = record.chunk_index,
                        "re-embedding failed during repair"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match self
                .store
                .update_embedding(&record.locator, record.chunk_index, &vector, model)
                .await
            {
                Ok(()) => report.reembedded += 1,
                Err(error) => {
                    tracing::warn!(
                        %error,
                        locator = %record.locator,
                        chunk_index = record.chunk_index,
                        "failed to write repaired embedding"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            reembedded = report.reembedded,
            failed = report.failed,
            "embedding repair pass complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::fallback::fallback_search;
    use crate::testing::{MemoryRecordStore, StubEmbedder, make_embedding, make_record};

    #[tokio::test]
    async fn test_repairs_record_with_missing_vector() {
        let store = MemoryRecordStore::new();
        store.insert(
            make_record("https://example.test/broken", 0, "broken vector content", &[]),
            None,
        );

        let embedder = StubEmbedder::new()
            .with_vector("broken vector content", make_embedding(5.0));
        let service = RepairService::new(embedder, store);

        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.reembedded, 1);
        assert_eq!(report.failed, 0);

        // The record is searchable again after repair.
        let outcome = fallback_search(&service.store, &make_embedding(5.0), 5, 100)
            .await
            .unwrap();
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.matches.len(), 1);
        assert!((outcome.matches[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_repairs_zero_vector_substitution() {
        // A degraded ingestion run stores zero vectors; the repair pass
        // picks them up even though the model and hash look current.
        let store = MemoryRecordStore::new();
        store.insert(
            make_record("https://example.test/zero", 0, "zero vector content", &[]),
            Some(vec![0.0; make_embedding(0.0).len()]),
        );

        let embedder =
            StubEmbedder::new().with_vector("zero vector content", make_embedding(7.0));
        let service = RepairService::new(embedder, store);

        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.reembedded, 1);

        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 0);
    }

    #[tokio::test]
    async fn test_repairs_model_stale_record() {
        let store = MemoryRecordStore::new();
        let mut stale = make_record("https://example.test/stale", 0, "stale model content", &[]);
        stale.embedding_model = "old-model-v1".to_string();
        store.insert(stale, Some(make_embedding(1.0)));

        let service = RepairService::new(StubEmbedder::new(), store);
        let report = service.repair().await.unwrap();
        assert_eq!(report.reembedded, 1);

        // A second pass finds nothing left to do.
        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 0);
    }

    #[tokio::test]
    async fn test_repairs_content_hash_drift() {
        let store = MemoryRecordStore::new();
        let mut drifted = make_record("https://example.test/drift", 0, "current content", &[]);
        drifted.content_hash = "0000000000000000".to_string();
        store.insert(drifted, Some(make_embedding(1.0)));

        let service = RepairService::new(StubEmbedder::new(), store);
        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.reembedded, 1);

        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 0, "hash must be recomputed on repair");
    }

    #[tokio::test]
    async fn test_healthy_records_not_touched() {
        let store = MemoryRecordStore::new();
        store.insert(
            make_record("https://example.test/healthy", 0, "healthy content", &[]),
            Some(make_embedding(2.0)),
        );

        let service = RepairService::new(StubEmbedder::new(), store);
        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 0);
        assert_eq!(report.reembedded, 0);
    }

    #[tokio::test]
    async fn test_embed_failure_counts_failed_and_continues() {
        let store = MemoryRecordStore::new();
        store.insert(
            make_record("https://example.test/one", 0, "first broken", &[]),
            None,
        );
        store.insert(
            make_record("https://example.test/two", 0, "second broken", &[]),
            None,
        );

        let embedder = StubEmbedder::new();
        embedder.set_failing(true);
        let service = RepairService::new(embedder, store);

        let report = service.repair().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.reembedded, 0);
        assert_eq!(report.failed, 2);
    }
}
