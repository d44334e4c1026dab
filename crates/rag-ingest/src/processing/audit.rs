//! Vector store inspection: sampled source counts and per-source purge

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::providers::VectorStoreProvider;
use crate::storage::ManifestDb;

/// Distinct sources seen while scrolling the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEstimate {
    pub unique_sources: usize,
    pub sampled_points: usize,
    pub pages_read: usize,
    /// The scroll reached the end, so `unique_sources` is exact
    pub exhaustive: bool,
}

impl std::fmt::Display for SourceEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exhaustive {
            write!(
                f,
                "{} sources across {} points (exact)",
                self.unique_sources, self.sampled_points
            )
        } else {
            write!(
                f,
                "at least {} sources (estimate from {} sampled points over {} pages)",
                self.unique_sources, self.sampled_points, self.pages_read
            )
        }
    }
}

/// Count distinct `source` payload values over at most `max_pages` scroll pages.
pub async fn estimate_sources(
    store: &dyn VectorStoreProvider,
    page_size: usize,
    max_pages: usize,
) -> Result<SourceEstimate> {
    let mut sources = HashSet::new();
    let mut sampled_points = 0usize;
    let mut pages_read = 0usize;
    let mut cursor = None;
    let mut exhaustive = false;

    while pages_read < max_pages {
        let page = store.scroll(cursor.take(), page_size.max(1)).await?;
        pages_read += 1;
        sampled_points += page.points.len();
        sources.extend(
            page.points
                .iter()
                .filter_map(|p| p.payload.get("source").and_then(|s| s.as_str()))
                .map(str::to_string),
        );

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                exhaustive = true;
                break;
            }
        }
    }

    let estimate = SourceEstimate {
        unique_sources: sources.len(),
        sampled_points,
        pages_read,
        exhaustive,
    };
    tracing::info!("Source audit: {}", estimate);
    Ok(estimate)
}

/// Delete every vector whose `source` payload is `path`, then requeue the entry.
///
/// Matching on the payload also removes points written by a file that later
/// failed, or left over from an earlier ingest with more chunks. Returns the
/// chunk count the manifest had recorded.
pub async fn purge_source(
    store: &dyn VectorStoreProvider,
    manifest: &ManifestDb,
    path: &str,
) -> Result<u32> {
    let entry = manifest
        .get(path)?
        .ok_or_else(|| Error::config(format!("'{}' is not in the manifest", path)))?;

    store.delete_source(path).await?;
    manifest.requeue(path)?;
    tracing::info!(
        "[{}] Purged vectors ({} chunks recorded, status {}) and requeued",
        path,
        entry.chunks_count,
        entry.status
    );
    Ok(entry.chunks_count)
}
