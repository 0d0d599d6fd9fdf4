//! Retrieval configuration types.
//!
//! `RetrievalConfig` represents the `config.toml` knobs for search and
//! ingestion. All fields have defaults so a missing or partial file is
//! never an error.

use serde::{Deserialize, Serialize};

/// Tunables for the retrieval and ingestion pipelines.
///
/// Loaded from `{data_dir}/config.toml` by the infrastructure layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of results a query asks the search paths for.
    #[serde(default = "default_match_count")]
    pub match_count: usize,

    /// Minimum cosine similarity a result must reach to be returned.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Candidate window for the client-side fallback search. The store
    /// additionally clamps scans to its own hard maximum.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// Embedding model name recorded on stored vectors; records carrying a
    /// different name are picked up by the repair path.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Records per embedding/storage sub-batch during ingestion.
    #[serde(default = "default_ingest_batch_size")]
    pub ingest_batch_size: usize,

    /// Pause between ingestion sub-batches, for the fixed-delay pacing
    /// policy. A courtesy toward rate-limited collaborators, not a
    /// correctness requirement.
    #[serde(default = "default_ingest_delay_ms")]
    pub ingest_delay_ms: u64,
}

fn default_match_count() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.1
}

fn default_scan_limit() -> usize {
    1000
}

fn default_embedding_model() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_ingest_batch_size() -> usize {
    10
}

fn default_ingest_delay_ms() -> u64 {
    1000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_count: default_match_count(),
            similarity_threshold: default_similarity_threshold(),
            scan_limit: default_scan_limit(),
            embedding_model: default_embedding_model(),
            ingest_batch_size: default_ingest_batch_size(),
            ingest_delay_ms: default_ingest_delay_ms(),
        }
    }
}
