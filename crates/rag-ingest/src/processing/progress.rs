//! Progress events emitted while draining the manifest

use std::time::Duration;

/// A progress notification from a worker
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A worker claimed and started a file
    FileStarted { path: String },
    /// One embedding batch of a file finished
    EmbedBatch {
        path: String,
        batch: usize,
        total_batches: usize,
        chunks_done: usize,
        chunks_total: usize,
    },
    /// One upsert batch of a file finished
    UpsertBatch {
        path: String,
        batch: usize,
        total_batches: usize,
        points_done: usize,
        points_total: usize,
    },
    /// File embedded and upserted
    FileCompleted {
        path: String,
        chunks: u32,
        elapsed: Duration,
    },
    /// File had no extractable text
    FileEmpty { path: String },
    /// File failed at `stage`
    FileFailed {
        path: String,
        stage: &'static str,
        error: String,
    },
}

impl ProgressEvent {
    pub fn path(&self) -> &str {
        match self {
            ProgressEvent::FileStarted { path }
            | ProgressEvent::EmbedBatch { path, .. }
            | ProgressEvent::UpsertBatch { path, .. }
            | ProgressEvent::FileCompleted { path, .. }
            | ProgressEvent::FileEmpty { path }
            | ProgressEvent::FileFailed { path, .. } => path,
        }
    }

    /// Whether this event ends processing of its file
    pub fn is_file_done(&self) -> bool {
        matches!(
            self,
            ProgressEvent::FileCompleted { .. }
                | ProgressEvent::FileEmpty { .. }
                | ProgressEvent::FileFailed { .. }
        )
    }
}

/// Receives progress events. Called from worker tasks, so it must not block.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Writes every event to the log stream
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::FileStarted { path } => {
                tracing::info!("[{}] Starting", path);
            }
            ProgressEvent::EmbedBatch {
                path,
                batch,
                total_batches,
                chunks_done,
                chunks_total,
            } => {
                tracing::debug!(
                    "[{}] Embedded batch {}/{} ({}/{} chunks)",
                    path,
                    batch,
                    total_batches,
                    chunks_done,
                    chunks_total
                );
            }
            ProgressEvent::UpsertBatch {
                path,
                batch,
                total_batches,
                points_done,
                points_total,
            } => {
                tracing::debug!(
                    "[{}] Upserted batch {}/{} ({}/{} points)",
                    path,
                    batch,
                    total_batches,
                    points_done,
                    points_total
                );
            }
            ProgressEvent::FileCompleted { path, chunks, elapsed } => {
                tracing::info!(
                    "[{}] Completed: {} chunks in {:.1}s",
                    path,
                    chunks,
                    elapsed.as_secs_f64()
                );
            }
            ProgressEvent::FileEmpty { path } => {
                tracing::warn!("[{}] No extractable text, completed with 0 chunks", path);
            }
            ProgressEvent::FileFailed { path, stage, error } => {
                tracing::error!("[{}] Failed at {}: {}", path, stage, error);
            }
        }
    }
}

/// Fans events out to several sinks
pub struct Broadcast(pub Vec<Box<dyn ProgressSink>>);

impl ProgressSink for Broadcast {
    fn on_event(&self, event: &ProgressEvent) {
        for sink in &self.0 {
            sink.on_event(event);
        }
    }
}
