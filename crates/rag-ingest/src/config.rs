//! Configuration for the ingestion pipeline
//!
//! Values come from defaults, then an optional TOML file, then `INGEST_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Manifest store configuration
    pub manifest: ManifestConfig,
    /// Directory scan configuration
    pub scan: ScanConfig,
    /// Worker pool configuration
    pub processing: ProcessingConfig,
    /// Text chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding service configuration
    pub embeddings: EmbeddingConfig,
    /// Vector store configuration
    pub vector_store: VectorStoreConfig,
}

/// Manifest store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Path of the SQLite manifest file
    pub path: PathBuf,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ingest-manifest.db"),
        }
    }
}

/// Directory scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Accepted file extensions, without the dot (matched case-insensitively)
    pub extensions: Vec<String>,
    /// Follow symbolic links while walking
    pub follow_links: bool,
    /// Skip files and directories whose name starts with '.'
    pub skip_hidden: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["pdf".to_string(), "txt".to_string(), "md".to_string()],
            follow_links: false,
            skip_hidden: true,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Maximum files processed simultaneously (default: 6)
    pub concurrency: usize,
    /// Timeout for processing a single file in seconds (default: 300 = 5 minutes)
    pub file_timeout_secs: u64,
    /// Log a warning when a file takes longer than this (seconds)
    pub slow_file_warn_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            file_timeout_secs: 300,
            slow_file_warn_secs: 60,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 200,
        }
    }
}

/// Embedding backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    OpenAi,
    /// Ollama `/api/embed` endpoint
    Ollama,
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingBackend::OpenAi),
            "ollama" => Ok(EmbeddingBackend::Ollama),
            other => Err(Error::config(format!("Unknown embedding backend: {}", other))),
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which API flavour to speak
    pub backend: EmbeddingBackend,
    /// Base URL of the service
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Bearer token (OpenAI-compatible backends)
    pub api_key: Option<String>,
    /// Expected vector dimensions
    pub dimensions: usize,
    /// Chunks per embedding request (default: 128)
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for transient failures
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            dimensions: 1536,
            batch_size: 128,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

/// Vector store (Qdrant) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Qdrant REST URL
    pub url: String,
    /// Collection name
    pub collection: String,
    /// API key sent as the `api-key` header
    pub api_key: Option<String>,
    /// Points per upsert request (default: 256)
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for transient failures
    pub max_retries: u32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            collection: "documents".to_string(),
            api_key: None,
            batch_size: 256,
            timeout_secs: 60,
            max_retries: 3,
        }
    }
}

impl IngestConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            Error::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Apply `INGEST_*` overrides using the given variable lookup.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("INGEST_CONCURRENCY") {
            self.processing.concurrency = parse_var("INGEST_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("INGEST_FILE_TIMEOUT_SECS") {
            self.processing.file_timeout_secs = parse_var("INGEST_FILE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("INGEST_EMBED_BATCH_SIZE") {
            self.embeddings.batch_size = parse_var("INGEST_EMBED_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("INGEST_UPSERT_BATCH_SIZE") {
            self.vector_store.batch_size = parse_var("INGEST_UPSERT_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("INGEST_CHUNK_SIZE") {
            self.chunking.chunk_size = parse_var("INGEST_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("INGEST_CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse_var("INGEST_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("INGEST_MANIFEST_PATH") {
            self.manifest.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("INGEST_EXTENSIONS") {
            self.scan.extensions = v
                .split(',')
                .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect();
        }
        if let Some(v) = lookup("INGEST_EMBEDDINGS_BACKEND") {
            self.embeddings.backend = v.parse()?;
        }
        if let Some(v) = lookup("INGEST_EMBEDDINGS_URL") {
            self.embeddings.base_url = v;
        }
        if let Some(v) = lookup("INGEST_EMBEDDINGS_MODEL") {
            self.embeddings.model = v;
        }
        if let Some(v) = lookup("INGEST_EMBEDDINGS_DIMENSIONS") {
            self.embeddings.dimensions = parse_var("INGEST_EMBEDDINGS_DIMENSIONS", &v)?;
        }
        if let Some(v) = lookup("INGEST_EMBEDDINGS_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.embeddings.api_key = Some(v);
        }
        if let Some(v) = lookup("INGEST_QDRANT_URL") {
            self.vector_store.url = v;
        }
        if let Some(v) = lookup("INGEST_QDRANT_COLLECTION") {
            self.vector_store.collection = v;
        }
        if let Some(v) = lookup("INGEST_QDRANT_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.processing.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::config("embedding batch size must be at least 1"));
        }
        if self.vector_store.batch_size == 0 {
            return Err(Error::config("upsert batch size must be at least 1"));
        }
        if self.chunking.chunk_size == 0 {
            return Err(Error::config("chunk size must be at least 1"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embedding dimensions must be at least 1"));
        }
        if self.scan.extensions.is_empty() {
            return Err(Error::config("at least one file extension must be accepted"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("Invalid value for {}: {:?}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.processing.concurrency, 6);
        assert_eq!(config.embeddings.batch_size, 128);
        assert_eq!(config.vector_store.batch_size, 256);
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("INGEST_CONCURRENCY", "2"),
            ("INGEST_EMBED_BATCH_SIZE", "16"),
            ("INGEST_UPSERT_BATCH_SIZE", "64"),
            ("INGEST_EXTENSIONS", "PDF, .txt"),
            ("INGEST_EMBEDDINGS_BACKEND", "ollama"),
            ("OPENAI_API_KEY", "sk-test"),
        ]
        .into_iter()
        .collect();

        let mut config = IngestConfig::default();
        config
            .apply_env_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.processing.concurrency, 2);
        assert_eq!(config.embeddings.batch_size, 16);
        assert_eq!(config.vector_store.batch_size, 64);
        assert_eq!(config.scan.extensions, vec!["pdf", "txt"]);
        assert_eq!(config.embeddings.backend, EmbeddingBackend::Ollama);
        assert_eq!(config.embeddings.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let mut config = IngestConfig::default();
        let err = config
            .apply_env_overrides_from(|k| (k == "INGEST_CONCURRENCY").then(|| "six".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_overlap_not_smaller_than_size() {
        let mut config = IngestConfig::default();
        config.chunking.chunk_overlap = 500;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.chunking.chunk_overlap = 0;
        config.processing.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: IngestConfig = toml::from_str(
            r#"
            [processing]
            concurrency = 3

            [vector_store]
            collection = "papers"
            "#,
        )
        .unwrap();
        assert_eq!(config.processing.concurrency, 3);
        assert_eq!(config.processing.file_timeout_secs, 300);
        assert_eq!(config.vector_store.collection, "papers");
        assert_eq!(config.vector_store.url, "http://localhost:6333");
    }
}
