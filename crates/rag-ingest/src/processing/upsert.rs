//! Batched writes of embedded chunks to the vector store

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::VectorStoreProvider;
use crate::types::VectorPoint;

use super::progress::{ProgressEvent, ProgressSink};

/// Writes points in batches of `batch_size`, independent of the embedding batch size
#[derive(Clone)]
pub struct VectorUpserter {
    store: Arc<dyn VectorStoreProvider>,
    batch_size: usize,
}

impl VectorUpserter {
    pub fn new(store: Arc<dyn VectorStoreProvider>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Upsert all points for one source file, returning how many were written.
    ///
    /// Stops at the first failed batch and reports its index and ids. Earlier
    /// batches stay written; their ids are deterministic, so a later run
    /// overwrites them.
    pub async fn upsert(
        &self,
        source_path: &str,
        points: &[VectorPoint],
        progress: &dyn ProgressSink,
    ) -> Result<usize> {
        let total_batches = points.len().div_ceil(self.batch_size);
        let mut written = 0usize;

        for (batch_idx, batch) in points.chunks(self.batch_size).enumerate() {
            let batch_num = batch_idx + 1;

            if let Err(e) = self.store.upsert(batch).await {
                let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
                tracing::warn!(
                    "[{}] Upsert batch {}/{} failed after {} points: {} (ids: {})",
                    source_path,
                    batch_num,
                    total_batches,
                    written,
                    e,
                    ids.join(", ")
                );
                return Err(Error::UpsertBatch {
                    batch: batch_num,
                    total_batches,
                    ids,
                    message: e.to_string(),
                });
            }

            written += batch.len();
            progress.on_event(&ProgressEvent::UpsertBatch {
                path: source_path.to_string(),
                batch: batch_num,
                total_batches,
                points_done: written,
                points_total: points.len(),
            });
        }

        Ok(written)
    }
}
