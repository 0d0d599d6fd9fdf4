//! Client-side fallback similarity search.
//!
//! Brute-force scan over a bounded record window, scoring candidates with
//! [`cosine_similarity`] on the client. This path exists because stored
//! vectors may have been persisted in a representation the engine-side
//! search cannot use; for any record it can parse it is
//! correctness-equivalent to the primary path.

use formscout_types::error::StoreError;
use formscout_types::record::ScoredRecord;

use crate::retrieval::similarity::cosine_similarity;
use crate::store::records::RecordStore;

/// Result of a fallback search pass.
#[derive(Debug, Default)]
pub struct FallbackOutcome {
    /// Top-k candidates, descending similarity.
    pub matches: Vec<ScoredRecord>,
    /// How many records the scan window produced.
    pub scanned: usize,
    /// Records skipped because their stored vector was unreadable.
    /// Observable for diagnostics; never fatal to the call.
    pub skipped: usize,
}

/// Scan up to `limit_scanned` records and rank them by cosine similarity
/// to `query_embedding`, returning the top `k`.
///
/// Records whose stored vector is missing or has the wrong dimension are
/// skipped and counted. Ties break by insertion order (ascending record
/// id; ids are time-sortable).
pub async fn fallback_search<S: RecordStore>(
    store: &S,
    query_embedding: &[f32],
    k: usize,
    limit_scanned: usize,
) -> Result<FallbackOutcome, StoreError> {
    let candidates = store.scan(limit_scanned).await?;
    let scanned = candidates.len();

    let mut skipped = 0usize;
    let mut matches: Vec<ScoredRecord> = Vec::with_capacity(scanned.min(k.saturating_mul(2)));

    for candidate in candidates {
        let Some(embedding) = candidate.embedding else {
            skipped += 1;
            continue;
        };
        if embedding.len() != query_embedding.len() {
            skipped += 1;
            continue;
        }

        let similarity = cosine_similarity(query_embedding, &embedding);
        matches.push(ScoredRecord {
            record: candidate.record,
            similarity,
        });
    }

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    matches.truncate(k);

    if skipped > 0 {
        tracing::warn!(
            skipped,
            scanned,
            "fallback search skipped records with unreadable embeddings"
        );
    }

    Ok(FallbackOutcome {
        matches,
        scanned,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryRecordStore, make_embedding, make_record};

    #[tokio::test]
    async fn test_returns_top_k_descending() {
        let store = MemoryRecordStore::new();
        for i in 0..5 {
            store.insert(
                make_record(&format!("https://example.test/p{i}"), 0, "content", &[]),
                Some(make_embedding(i as f32)),
            );
        }

        let query = make_embedding(0.0);
        let outcome = fallback_search(&store, &query, 3, 100).await.unwrap();

        assert_eq!(outcome.scanned, 5);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.matches.len(), 3);
        for window in outcome.matches.windows(2) {
            assert!(window[0].similarity >= window[1].similarity - f32::EPSILON);
        }
        // The record embedded with the query's own seed ranks first.
        assert_eq!(outcome.matches[0].record.locator, "https://example.test/p0");
        assert!((outcome.matches[0].similarity - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_skips_unreadable_embeddings() {
        let store = MemoryRecordStore::new();
        store.insert(
            make_record("https://example.test/good", 0, "good", &[]),
            Some(make_embedding(1.0)),
        );
        store.insert(
            make_record("https://example.test/missing", 0, "missing vector", &[]),
            None,
        );
        store.insert(
            make_record("https://example.test/short", 0, "wrong dimension", &[]),
            Some(vec![0.5f32; 3]),
        );

        let query = make_embedding(1.0);
        let outcome = fallback_search(&store, &query, 10, 100).await.unwrap();

        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].record.locator, "https://example.test/good");
    }

    #[tokio::test]
    async fn test_zero_norm_query_scores_zero() {
        let store = MemoryRecordStore::new();
        store.insert(
            make_record("https://example.test/a", 0, "a", &[]),
            Some(make_embedding(2.0)),
        );

        let zero = vec![0.0f32; make_embedding(0.0).len()];
        let outcome = fallback_search(&store, &zero, 5, 100).await.unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_outcome() {
        let store = MemoryRecordStore::new();
        let outcome = fallback_search(&store, &make_embedding(0.0), 5, 100)
            .await
            .unwrap();
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.scanned, 0);
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn test_scan_window_is_bounded() {
        let store = MemoryRecordStore::new();
        for i in 0..8 {
            store.insert(
                make_record(&format!("https://example.test/p{i}"), 0, "content", &[]),
                Some(make_embedding(i as f32)),
            );
        }

        let outcome = fallback_search(&store, &make_embedding(0.0), 10, 4)
            .await
            .unwrap();
        assert_eq!(outcome.scanned, 4);
    }

    #[tokio::test]
    async fn test_ties_break_by_insertion_order() {
        let store = MemoryRecordStore::new();
        let shared = make_embedding(3.0);
        let first = make_record("https://example.test/first", 0, "first", &[]);
        let second = make_record("https://example.test/second", 0, "second", &[]);
        let first_id = first.id;
        store.insert(first, Some(shared.clone()));
        store.insert(second, Some(shared.clone()));

        let outcome = fallback_search(&store, &shared, 2, 100).await.unwrap();
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].record.id, first_id);
    }
}
