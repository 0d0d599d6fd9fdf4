//! LanceDB store wrapper for connection management and table operations.
//!
//! Provides `LanceStore` which wraps a `lancedb::Connection` and offers
//! helper methods for table lifecycle (create, open, drop) using Arrow
//! schemas. The connection is created once and owned here -- callers hold
//! a `LanceStore` rather than any process-wide handle.

use std::path::PathBuf;
use std::sync::Arc;

use arrow_schema::Schema;

/// LanceDB store wrapper for connection and table management.
///
/// Manages a single LanceDB connection at a filesystem path. Records live
/// in one table shared by all sources; search scoping happens by filter.
pub struct LanceStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceStore {
    /// Open or create a LanceDB store at the given path.
    ///
    /// Creates the directory if it does not exist.
    /// Default path: `~/.formscout/vector_store`
    pub async fn new(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        // Ensure directory exists
        std::fs::create_dir_all(&base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;

        Ok(Self { db, base_path })
    }

    /// Open or create a LanceDB store at the default path.
    ///
    /// Default: `~/.formscout/vector_store`
    pub async fn default() -> Result<Self, lancedb::Error> {
        let base_path = crate::config::default_data_dir().join("vector_store");
        Self::new(base_path).await
    }

    /// Ensure a table exists with the given schema.
    ///
    /// If the table already exists, opens it. If not, creates an empty
    /// table with the provided schema.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        // Try to open the existing table first
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                // Table doesn't exist, create it empty
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Check if a table exists in the database.
    pub async fn table_exists(&self, table_name: &str) -> bool {
        self.db.open_table(table_name).execute().await.is_ok()
    }

    /// Drop a table from the database.
    ///
    /// Returns Ok(()) even if the table does not exist (idempotent).
    pub async fn drop_table(&self, table_name: &str) -> Result<(), lancedb::Error> {
        match self.db.drop_table(table_name, &[]).await {
            Ok(()) => Ok(()),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// List all table names in the database.
    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    /// Get a reference to the underlying LanceDB connection.
    pub fn connection(&self) -> &lancedb::Connection {
        &self.db
    }

    /// Get the base path of the store.
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}
