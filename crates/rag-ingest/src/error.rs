//! Error types for the ingestion pipeline

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ingestion pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (fatal)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Manifest store error (fatal)
    #[error("Manifest store error: {0}")]
    Manifest(String),

    /// A directory entry could not be read during discovery
    #[error("Failed to read '{path}': {message}")]
    Discovery { path: String, message: String },

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// One embedding batch of a file failed
    #[error("Embedding batch {batch}/{total_batches} failed: {message}")]
    EmbeddingBatch {
        batch: usize,
        total_batches: usize,
        message: String,
    },

    /// Vector database error
    #[error("Vector database error: {0}")]
    VectorDb(String),

    /// One upsert batch of a file failed
    #[error("Upsert batch {batch}/{total_batches} failed ({} points: {}): {message}", .ids.len(), .ids.join(", "))]
    UpsertBatch {
        batch: usize,
        total_batches: usize,
        ids: Vec<String>,
        message: String,
    },

    /// Per-file processing timeout
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a manifest error
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a discovery error
    pub fn discovery(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector db error
    pub fn vector_db(message: impl Into<String>) -> Self {
        Self::VectorDb(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Errors that abort a whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Manifest(_))
    }

    /// Short label for the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::FileParse { .. } | Error::UnsupportedFileType(_) => "extract",
            Error::Embedding(_) | Error::EmbeddingBatch { .. } => "embed",
            Error::VectorDb(_) | Error::UpsertBatch { .. } => "upsert",
            Error::Io(_) => "read",
            Error::Timeout(_) => "timeout",
            Error::Config(_) => "config",
            Error::Manifest(_) => "manifest",
            Error::Discovery { .. } => "discovery",
            Error::Json(_) | Error::Http(_) | Error::Internal(_) => "internal",
        }
    }
}
