//! Chunking and batched embedding of one file's text

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::processing::{ProgressEvent, ProgressSink};
use crate::providers::EmbeddingProvider;
use crate::types::EmbeddedChunk;

use super::chunker::TextChunker;

/// Result of embedding one file
#[derive(Debug)]
pub enum EmbedOutcome {
    /// Text was empty or whitespace only
    NoContent,
    /// Every chunk with its vector, in chunk order
    Embedded(Vec<EmbeddedChunk>),
}

/// Splits text into chunks and embeds them in fixed-size batches
#[derive(Clone)]
pub struct ChunkEmbedder {
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl ChunkEmbedder {
    pub fn new(chunker: TextChunker, embedder: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            chunker,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Chunk `text` and embed every chunk.
    ///
    /// Any failed batch fails the whole file; chunks are never dropped.
    pub async fn embed(
        &self,
        source_path: &str,
        text: &str,
        progress: &dyn ProgressSink,
    ) -> Result<EmbedOutcome> {
        let chunks = self.chunker.chunk(source_path, text);
        if chunks.is_empty() {
            return Ok(EmbedOutcome::NoContent);
        }

        let total_chunks = chunks.len();
        let total_batches = total_chunks.div_ceil(self.batch_size);
        let dimensions = self.embedder.dimensions();
        let mut embedded = Vec::with_capacity(total_chunks);

        tracing::debug!(
            "[{}] {} chunks in {} embedding batches",
            source_path,
            total_chunks,
            total_batches
        );

        for (batch_idx, batch) in chunks.chunks(self.batch_size).enumerate() {
            let batch_num = batch_idx + 1;
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                Error::EmbeddingBatch {
                    batch: batch_num,
                    total_batches,
                    message: e.to_string(),
                }
            })?;

            if vectors.len() != batch.len() {
                return Err(Error::EmbeddingBatch {
                    batch: batch_num,
                    total_batches,
                    message: format!("expected {} vectors, got {}", batch.len(), vectors.len()),
                });
            }
            if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
                return Err(Error::EmbeddingBatch {
                    batch: batch_num,
                    total_batches,
                    message: format!("expected {} dimensions, got {}", dimensions, bad.len()),
                });
            }

            embedded.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddedChunk { chunk, vector }),
            );

            progress.on_event(&ProgressEvent::EmbedBatch {
                path: source_path.to_string(),
                batch: batch_num,
                total_batches,
                chunks_done: embedded.len(),
                chunks_total: total_chunks,
            });
        }

        Ok(EmbedOutcome::Embedded(embedded))
    }
}
