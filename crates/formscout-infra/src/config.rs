//! Configuration loader for formscout.
//!
//! Reads `config.toml` from the data directory (`~/.formscout/` in
//! production) and deserializes it into [`RetrievalConfig`]. Falls back to
//! defaults when the file is missing or malformed.

use std::path::{Path, PathBuf};

use formscout_types::config::RetrievalConfig;

/// Default data directory: `~/.formscout`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".formscout")
}

/// Load retrieval configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`RetrievalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the
///   default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_retrieval_config(data_dir: &Path) -> RetrievalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "No config.toml found at {}, using defaults",
                config_path.display()
            );
            return RetrievalConfig::default();
        }
        Err(err) => {
            tracing::warn!(
                "Failed to read {}: {err}, using defaults",
                config_path.display()
            );
            return RetrievalConfig::default();
        }
    };

    match toml::from_str::<RetrievalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            RetrievalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_retrieval_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_retrieval_config(tmp.path()).await;
        assert_eq!(config.match_count, 5);
        assert_eq!(config.scan_limit, 1000);
    }

    #[tokio::test]
    async fn load_retrieval_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            r#"
match_count = 8
similarity_threshold = 0.2
scan_limit = 250
ingest_delay_ms = 3000
"#,
        )
        .await
        .unwrap();

        let config = load_retrieval_config(tmp.path()).await;
        assert_eq!(config.match_count, 8);
        assert!((config.similarity_threshold - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.scan_limit, 250);
        assert_eq!(config.ingest_delay_ms, 3000);
        // Unspecified fields keep their defaults.
        assert_eq!(config.embedding_model, "all-MiniLM-L6-v2");
    }

    #[tokio::test]
    async fn load_retrieval_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_retrieval_config(tmp.path()).await;
        assert_eq!(config.match_count, 5);
    }

    #[test]
    fn default_data_dir_ends_with_dot_formscout() {
        assert!(default_data_dir().ends_with(".formscout"));
    }
}
