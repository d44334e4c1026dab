//! Bounded worker pool that drains the manifest

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::{declared_type, ChunkEmbedder, EmbedOutcome, TextChunker, TextExtractor};
use crate::providers::{EmbeddingProvider, VectorStoreProvider};
use crate::storage::ManifestDb;
use crate::types::VectorPoint;

use super::progress::{LogProgress, ProgressEvent, ProgressSink};
use super::upsert::VectorUpserter;

/// Final state of one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Embedded and upserted this many chunks
    Completed(u32),
    /// No extractable text; recorded as completed with 0 chunks
    Empty,
    /// Recorded as `error` in the manifest
    Failed,
}

/// Totals for one `run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub completed: usize,
    pub empty: usize,
    pub failed: usize,
    pub chunks: u64,
    /// A stop was requested before the queue drained
    pub stopped_early: bool,
}

impl RunReport {
    pub fn files(&self) -> usize {
        self.completed + self.empty + self.failed
    }

    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Completed(chunks) => {
                self.completed += 1;
                self.chunks += chunks as u64;
            }
            FileOutcome::Empty => self.empty += 1,
            FileOutcome::Failed => self.failed += 1,
        }
    }
}

/// Cloneable flag asking a running worker to stop claiming new files
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    /// Ask the worker to stop. Returns `false` if a stop was already requested.
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the pipeline produced for a file before the manifest write
enum Ingested {
    Chunks(u32),
    Empty,
}

/// Per-file pipeline shared by all tasks of a run
#[derive(Clone)]
struct FileProcessor {
    manifest: ManifestDb,
    extractor: Arc<dyn TextExtractor>,
    embedder: ChunkEmbedder,
    upserter: VectorUpserter,
    progress: Arc<dyn ProgressSink>,
    file_timeout: Duration,
    slow_file_warn: Duration,
}

impl FileProcessor {
    /// Process one claimed file and record the outcome.
    ///
    /// File-level failures become `error` rows; only manifest failures are returned.
    async fn process(&self, path: String) -> Result<FileOutcome> {
        let start_time = Instant::now();
        self.progress.on_event(&ProgressEvent::FileStarted { path: path.clone() });

        let attempt = AssertUnwindSafe(self.ingest(&path)).catch_unwind();
        let result = match timeout(self.file_timeout, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(Error::internal(format!(
                "processing panicked: {}",
                panic_message(panic.as_ref())
            ))),
            Err(_) => {
                tracing::error!(
                    "[{}] TIMEOUT after {:.1}s (limit: {}s)",
                    path,
                    start_time.elapsed().as_secs_f64(),
                    self.file_timeout.as_secs()
                );
                Err(Error::Timeout(self.file_timeout.as_secs()))
            }
        };

        let elapsed = start_time.elapsed();
        if elapsed > self.slow_file_warn {
            tracing::warn!("[{}] Slow processing: took {:.1}s", path, elapsed.as_secs_f64());
        }

        let outcome = match result {
            Ok(Ingested::Chunks(chunks)) => {
                self.manifest.mark_completed(&path, chunks)?;
                self.progress.on_event(&ProgressEvent::FileCompleted {
                    path,
                    chunks,
                    elapsed,
                });
                FileOutcome::Completed(chunks)
            }
            Ok(Ingested::Empty) => {
                self.manifest.mark_completed(&path, 0)?;
                self.progress.on_event(&ProgressEvent::FileEmpty { path });
                FileOutcome::Empty
            }
            Err(e) => {
                let stage = e.stage();
                let message = format!("{}: {}", stage, e);
                self.manifest.mark_error(&path, &message)?;
                self.progress.on_event(&ProgressEvent::FileFailed {
                    path,
                    stage,
                    error: e.to_string(),
                });
                FileOutcome::Failed
            }
        };

        Ok(outcome)
    }

    /// read -> extract -> chunk/embed -> upsert, strictly in order
    async fn ingest(&self, path: &str) -> Result<Ingested> {
        let data = tokio::fs::read(path).await?;
        tracing::debug!("[{}] Read {} bytes", path, data.len());

        let extractor = self.extractor.clone();
        let filename = path.to_string();
        let file_type = declared_type(path);
        let text = tokio::task::spawn_blocking(move || extractor.extract(&filename, &file_type, &data))
            .await
            .map_err(|e| Error::file_parse(path, format!("extraction task failed: {}", e)))??;

        match self.embedder.embed(path, &text, self.progress.as_ref()).await? {
            EmbedOutcome::NoContent => Ok(Ingested::Empty),
            EmbedOutcome::Embedded(chunks) => {
                let count = chunks.len() as u32;
                let points: Vec<VectorPoint> = chunks.into_iter().map(VectorPoint::from).collect();
                self.upserter.upsert(path, &points, self.progress.as_ref()).await?;
                Ok(Ingested::Chunks(count))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Drains queued manifest entries with at most `concurrency` files in flight
pub struct ProcessingWorker {
    processor: FileProcessor,
    concurrency: usize,
    shutdown: ShutdownHandle,
}

impl ProcessingWorker {
    /// Create a worker with default concurrency (6) and file timeout (300s)
    pub fn new(
        manifest: ManifestDb,
        extractor: Arc<dyn TextExtractor>,
        embedder: ChunkEmbedder,
        upserter: VectorUpserter,
    ) -> Self {
        Self {
            processor: FileProcessor {
                manifest,
                extractor,
                embedder,
                upserter,
                progress: Arc::new(LogProgress),
                file_timeout: Duration::from_secs(300),
                slow_file_warn: Duration::from_secs(60),
            },
            concurrency: 6,
            shutdown: ShutdownHandle::default(),
        }
    }

    /// Wire a worker from configuration and collaborators
    pub fn from_config(
        config: &IngestConfig,
        manifest: ManifestDb,
        extractor: Arc<dyn TextExtractor>,
        embedding: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        let chunker = TextChunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap);
        let embedder = ChunkEmbedder::new(chunker, embedding, config.embeddings.batch_size);
        let upserter = VectorUpserter::new(store, config.vector_store.batch_size);

        let mut worker = Self::new(manifest, extractor, embedder, upserter)
            .with_concurrency(config.processing.concurrency)
            .with_file_timeout(Duration::from_secs(config.processing.file_timeout_secs));
        worker.processor.slow_file_warn = Duration::from_secs(config.processing.slow_file_warn_secs);
        worker
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_file_timeout(mut self, file_timeout: Duration) -> Self {
        self.processor.file_timeout = file_timeout;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.processor.progress = progress;
        self
    }

    /// Handle for requesting a clean stop from another task or a signal handler
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Claim and process files until the queue is empty and nothing is in flight.
    ///
    /// After a stop request no new files are claimed; in-flight files finish.
    /// Returns `Err` only for manifest failures, which abort the run.
    pub async fn run(&self) -> Result<RunReport> {
        tracing::info!(
            "Processing worker started: {} parallel files, {}s file timeout",
            self.concurrency,
            self.processor.file_timeout.as_secs()
        );

        let processor = Arc::new(self.processor.clone());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Result<FileOutcome>> = JoinSet::new();
        let mut report = RunReport::default();

        loop {
            if !self.shutdown.is_requested() {
                let free = semaphore.available_permits();
                if free > 0 {
                    for entry in self.processor.manifest.claim_next(free)? {
                        let permit = semaphore
                            .clone()
                            .acquire_owned()
                            .await
                            .map_err(|e| Error::internal(format!("Worker semaphore closed: {}", e)))?;
                        let processor = processor.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            processor.process(entry.path).await
                        });
                    }
                }
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            let outcome = joined
                .map_err(|e| Error::internal(format!("Worker task failed: {}", e)))??;
            report.record(outcome);
        }

        report.stopped_early = self.shutdown.is_requested();
        let summary = self.processor.manifest.summary()?;
        tracing::info!(
            "Processing finished: {} completed, {} empty, {} failed, {} chunks{} | manifest: {}",
            report.completed,
            report.empty,
            report.failed,
            report.chunks,
            if report.stopped_early { " (stopped early)" } else { "" },
            summary
        );

        Ok(report)
    }
}
