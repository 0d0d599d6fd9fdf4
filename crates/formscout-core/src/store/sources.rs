//! Source registry trait.
//!
//! CRUD over the relational table of record sources. Follows the same
//! RPITIT repository pattern as `RecordStore`; the SQLite implementation
//! lives in formscout-infra.

use formscout_types::error::StoreError;
use formscout_types::source::Source;

/// Repository trait for the source registry.
pub trait SourceRegistry: Send + Sync {
    /// Create the source if missing, otherwise refresh its summary.
    /// Idempotent under retry.
    fn upsert(
        &self,
        source_id: &str,
        summary: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    fn get(
        &self,
        source_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Source>, StoreError>> + Send;

    /// All registered sources, ordered by `source_id`.
    fn list(&self)
    -> impl std::future::Future<Output = Result<Vec<Source>, StoreError>> + Send;

    /// Add ingested words to the source's running total.
    fn add_word_count(
        &self,
        source_id: &str,
        words: u64,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;
}
