//! Vector store provider trait for writing and auditing embeddings

use async_trait::async_trait;
use crate::error::Result;
use crate::types::VectorPoint;

/// A point as returned by a scroll, without its vector
#[derive(Debug, Clone, PartialEq)]
pub struct ScrolledPoint {
    pub id: String,
    pub payload: serde_json::Value,
}

/// One page of a scroll
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<ScrolledPoint>,
    /// Cursor for the next page; `None` when the scroll is finished
    pub next_cursor: Option<String>,
}

/// Trait for vector storage
///
/// Implementations:
/// - `QdrantStore`: Qdrant REST API
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Insert or overwrite points by id
    async fn upsert(&self, points: &[VectorPoint]) -> Result<()>;

    /// Delete points by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Delete every point whose payload `source` is `source`
    async fn delete_source(&self, source: &str) -> Result<()>;

    /// Page through stored points
    async fn scroll(&self, cursor: Option<String>, limit: usize) -> Result<ScrollPage>;

    /// Create the collection if it does not exist
    async fn ensure_collection(&self, dimensions: usize) -> Result<()>;

    /// Get total number of points stored
    async fn len(&self) -> Result<usize>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
