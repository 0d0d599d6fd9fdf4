//! Retrieval facade.
//!
//! `FormRetriever` orchestrates one query: validate, embed, engine-side
//! search, client-side fallback when the primary path errors or comes back
//! short, threshold filtering, and formatting. The embedder and store
//! handles are owned here, created once at construction -- there is no
//! process-wide session state.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde_json::Map;

use formscout_types::config::RetrievalConfig;
use formscout_types::error::{QueryError, StoreError};
use formscout_types::query::FormMatch;
use formscout_types::record::ScoredRecord;

use crate::embedding::embedder::Embedder;
use crate::retrieval::fallback::fallback_search;
use crate::retrieval::format::to_form_match;
use crate::retry::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, with_store_retries};
use crate::store::records::RecordStore;

/// Facade over embed -> primary search -> fallback search -> format.
pub struct FormRetriever<E: Embedder, S: RecordStore> {
    embedder: E,
    store: S,
    config: RetrievalConfig,
}

impl<E: Embedder, S: RecordStore> FormRetriever<E, S> {
    pub fn new(embedder: E, store: S, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Query across all sources with the configured defaults.
    pub async fn query_with_defaults(&self, text: &str) -> Result<Vec<FormMatch>, QueryError> {
        self.query(text, self.config.match_count, self.config.similarity_threshold)
            .await
    }

    /// Query across all sources.
    ///
    /// Returns the records whose similarity reaches `similarity_threshold`,
    /// best first, at most `k`. An empty result is a valid, non-exceptional
    /// outcome -- including when search had to degrade to nothing.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        similarity_threshold: f32,
    ) -> Result<Vec<FormMatch>, QueryError> {
        self.query_scoped(text, k, similarity_threshold, None).await
    }

    /// Query restricted to a single source collection.
    pub async fn query_in_source(
        &self,
        text: &str,
        k: usize,
        similarity_threshold: f32,
        source_id: &str,
    ) -> Result<Vec<FormMatch>, QueryError> {
        self.query_scoped(text, k, similarity_threshold, Some(source_id))
            .await
    }

    async fn query_scoped(
        &self,
        text: &str,
        k: usize,
        similarity_threshold: f32,
        source_filter: Option<&str>,
    ) -> Result<Vec<FormMatch>, QueryError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(QueryError::Validation("query text is empty".to_string()));
        }
        if k == 0 {
            return Err(QueryError::Validation(
                "result count must be at least 1".to_string(),
            ));
        }

        let query_embedding = self.embed_query(trimmed).await;

        let filter = Map::new();
        let primary = with_store_retries(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, || {
            self.store
                .match_records(&query_embedding, k, &filter, source_filter)
        })
        .await;

        let mut ranked = match primary {
            Ok(hits) if hits.len() >= k => hits,
            Ok(partial) => {
                tracing::debug!(
                    got = partial.len(),
                    want = k,
                    "primary search came back short, merging fallback results"
                );
                self.fallback_merge(partial, &query_embedding, k).await?
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    "primary similarity search degraded, trying client-side fallback"
                );
                self.fallback_merge(Vec::new(), &query_embedding, k).await?
            }
        };

        if let Some(source_id) = source_filter {
            ranked.retain(|hit| hit.record.source_id == source_id);
        }

        Ok(ranked
            .into_iter()
            .filter(|hit| hit.similarity >= similarity_threshold)
            .map(|hit| to_form_match(&hit))
            .collect())
    }

    /// Embed the query text, degrading to a zero vector on backend failure
    /// so the pipeline continues; a zero vector scores 0 against
    /// everything and is filtered by any positive threshold.
    async fn embed_query(&self, text: &str) -> Vec<f32> {
        let texts = [text.to_string()];
        match self.embedder.embed(&texts).await {
            Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
            Ok(_) => {
                tracing::warn!("embedder returned no vector for query, substituting zero vector");
                vec![0.0; self.embedder.dimension()]
            }
            Err(error) => {
                tracing::warn!(%error, "query embedding failed, substituting zero vector");
                vec![0.0; self.embedder.dimension()]
            }
        }
    }

    /// Run the fallback search and merge its results with whatever the
    /// primary path produced.
    ///
    /// A fallback that fails with anything other than `Unavailable`
    /// degrades to the primary results alone (possibly empty); a store
    /// that stayed unreachable through the retries is the one failure
    /// that propagates.
    async fn fallback_merge(
        &self,
        primary: Vec<ScoredRecord>,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, QueryError> {
        let outcome = with_store_retries(DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, || {
            fallback_search(&self.store, query_embedding, k, self.config.scan_limit)
        })
        .await;

        match outcome {
            Ok(outcome) => Ok(merge_ranked(primary, outcome.matches, k)),
            Err(StoreError::Unavailable(message)) => Err(QueryError::StoreUnavailable(message)),
            Err(error) => {
                tracing::warn!(%error, "fallback search failed, keeping primary results only");
                Ok(primary)
            }
        }
    }
}

/// Merge two ranked lists, deduplicating by record id (keeping the higher
/// similarity), re-ranking, and truncating to `k`.
fn merge_ranked(
    primary: Vec<ScoredRecord>,
    fallback: Vec<ScoredRecord>,
    k: usize,
) -> Vec<ScoredRecord> {
    let mut by_id: HashMap<_, ScoredRecord> = HashMap::new();
    for hit in primary.into_iter().chain(fallback) {
        match by_id.entry(hit.record.id) {
            Entry::Occupied(mut occupied) => {
                if hit.similarity > occupied.get().similarity {
                    occupied.get_mut().similarity = hit.similarity;
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(hit);
            }
        }
    }

    let mut merged: Vec<ScoredRecord> = by_id.into_values().collect();
    merged.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    merged.truncate(k);
    merged
}
