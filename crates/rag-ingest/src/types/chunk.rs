//! Chunk types flowing from the chunker to the vector store

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous slice of a source file's extracted text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Manifest path of the source file
    pub source_path: String,
    /// 0-based position within the source
    pub chunk_index: u32,
    /// Chunk text
    pub text: String,
    /// Number of chunks the source produced
    pub total_chunks_for_source: u32,
}

impl ChunkRecord {
    /// Deterministic vector-store id for this chunk.
    pub fn point_id(&self) -> String {
        point_id(&self.source_path, self.chunk_index)
    }
}

/// UUIDv5 over `"{source_path}#chunk={chunk_index}"`.
///
/// Re-ingesting a file with the same chunking parameters yields the same ids,
/// so upserts overwrite earlier vectors instead of duplicating them.
pub fn point_id(source_path: &str, chunk_index: u32) -> String {
    let name = format!("{}#chunk={}", source_path, chunk_index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// A chunk together with its embedding
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: ChunkRecord,
    pub vector: Vec<f32>,
}

/// A record as written to the vector store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

impl From<EmbeddedChunk> for VectorPoint {
    fn from(embedded: EmbeddedChunk) -> Self {
        let EmbeddedChunk { chunk, vector } = embedded;
        Self {
            id: chunk.point_id(),
            vector,
            payload: serde_json::json!({
                "source": chunk.source_path,
                "chunk_index": chunk.chunk_index,
                "total_chunks": chunk.total_chunks_for_source,
                "text": chunk.text,
            }),
        }
    }
}
