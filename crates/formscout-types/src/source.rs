//! Source registry types.
//!
//! A source is a logical collection of records sharing an origin (one
//! crawled site or dataset). Sources scope similarity search and carry
//! ingestion bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered record source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Stable identifier, referenced by records (e.g.
    /// "california_courts_comprehensive").
    pub source_id: String,
    /// Human-readable description of the collection.
    pub summary: Option<String>,
    /// Total word count ingested under this source.
    pub total_word_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}
