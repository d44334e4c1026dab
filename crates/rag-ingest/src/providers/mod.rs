//! Provider abstractions for embeddings and vector storage
//!
//! Trait-based so the pipeline can run against OpenAI-compatible or Ollama
//! embedders, Qdrant, or in-process doubles.

pub mod embedding;
pub mod ollama;
pub mod openai;
pub mod qdrant;
pub mod retry;
pub mod vector_store;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;
pub use qdrant::QdrantStore;
pub use retry::RetryPolicy;
pub use vector_store::{ScrollPage, ScrolledPoint, VectorStoreProvider};

/// Build the embedder selected by `config.backend`
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.backend {
        EmbeddingBackend::OpenAi => Arc::new(OpenAiEmbedder::new(config)?),
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(config)?),
    };
    tracing::info!(
        "Using {} embeddings ({}, {} dims) at {}",
        embedder.name(),
        config.model,
        config.dimensions,
        config.base_url
    );
    Ok(embedder)
}
