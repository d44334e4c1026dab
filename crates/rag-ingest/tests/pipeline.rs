//! End-to-end pipeline tests against in-process collaborators

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rag_ingest::ingestion::{ChunkEmbedder, DirectoryScanner, FileParser, TextChunker, TextExtractor};
use rag_ingest::processing::{ProcessingWorker, ProgressEvent, VectorUpserter};
use rag_ingest::providers::{EmbeddingProvider, ScrollPage, ScrolledPoint, VectorStoreProvider};
use rag_ingest::types::{point_id, ManifestStatus, VectorPoint};
use rag_ingest::{Error, ManifestDb, Result};

const DIMS: usize = 4;

/// Treats bytes as UTF-8; anything starting with `CORRUPT` fails extraction
struct FakeExtractor;

impl TextExtractor for FakeExtractor {
    fn extract(&self, filename: &str, _declared_type: &str, data: &[u8]) -> Result<String> {
        if data.starts_with(b"CORRUPT") {
            return Err(Error::file_parse(filename, "invalid cross-reference table"));
        }
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}

/// Fixed-dimension embedder that tracks how many batches run at once
#[derive(Default)]
struct FakeEmbedder {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
    /// Batches containing this text fail
    fail_marker: Option<&'static str>,
    /// Batches containing this text stall for a long time
    stall_marker: Option<&'static str>,
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let stall = self
            .stall_marker
            .map(|m| texts.iter().any(|t| t.contains(m)))
            .unwrap_or(false);
        tokio::time::sleep(if stall { Duration::from_secs(30) } else { self.delay }).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(marker) = self.fail_marker {
            if texts.iter().any(|t| t.contains(marker)) {
                return Err(Error::embedding("HTTP 429 Too Many Requests"));
            }
        }
        Ok(texts.iter().map(|t| vec![t.len() as f32; DIMS]).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// In-memory point map keyed by id
#[derive(Default)]
struct MemoryStore {
    points: Mutex<HashMap<String, VectorPoint>>,
    /// Upserts carrying this source fail
    fail_source: Option<String>,
}

impl MemoryStore {
    fn ids_for(&self, source: &str) -> Vec<String> {
        let mut ids: Vec<(u64, String)> = self
            .points
            .lock()
            .values()
            .filter(|p| p.payload["source"] == source)
            .map(|p| (p.payload["chunk_index"].as_u64().unwrap_or(0), p.id.clone()))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl VectorStoreProvider for MemoryStore {
    async fn upsert(&self, points: &[VectorPoint]) -> Result<()> {
        if let Some(source) = &self.fail_source {
            if points.iter().any(|p| p.payload["source"] == source.as_str()) {
                return Err(Error::vector_db("HTTP 503 Service Unavailable"));
            }
        }
        let mut stored = self.points.lock();
        for point in points {
            stored.insert(point.id.clone(), point.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.points.lock();
        for id in ids {
            stored.remove(id);
        }
        Ok(())
    }

    async fn delete_source(&self, source: &str) -> Result<()> {
        self.points.lock().retain(|_, p| p.payload["source"] != source);
        Ok(())
    }

    async fn scroll(&self, _cursor: Option<String>, limit: usize) -> Result<ScrollPage> {
        let points = self
            .points
            .lock()
            .values()
            .take(limit)
            .map(|p| ScrolledPoint {
                id: p.id.clone(),
                payload: p.payload.clone(),
            })
            .collect();
        Ok(ScrollPage {
            points,
            next_cursor: None,
        })
    }

    async fn ensure_collection(&self, _dimensions: usize) -> Result<()> {
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.points.lock().len())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn write(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.canonicalize().unwrap().to_string_lossy().into_owned()
}

fn worker(
    manifest: &ManifestDb,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<FakeEmbedder>,
    store: Arc<MemoryStore>,
    concurrency: usize,
) -> ProcessingWorker {
    let chunk_embedder = ChunkEmbedder::new(TextChunker::new(500, 200), embedder, 4);
    let upserter = VectorUpserter::new(store, 3);
    ProcessingWorker::new(manifest.clone(), extractor, chunk_embedder, upserter)
        .with_concurrency(concurrency)
}

#[tokio::test]
async fn three_file_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.pdf", "x".repeat(3200).as_bytes());
    let b = write(dir.path(), "b.pdf", b"CORRUPT%PDF-1.4");
    let c = write(dir.path(), "c.pdf", b"");

    let manifest = ManifestDb::in_memory().unwrap();
    for path in [&a, &b, &c] {
        manifest.upsert_if_absent(path).unwrap();
    }

    let embedder = Arc::new(FakeEmbedder::default());
    let store = Arc::new(MemoryStore::default());
    let report = worker(&manifest, Arc::new(FakeExtractor), embedder, store.clone(), 2)
        .run()
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.empty, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.chunks, 10);
    assert!(!report.stopped_early);

    let summary = manifest.summary().unwrap();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.error, 1);
    assert_eq!(summary.pending(), 0);

    let a_entry = manifest.get(&a).unwrap().unwrap();
    assert_eq!(a_entry.status, ManifestStatus::Completed);
    assert_eq!(a_entry.chunks_count, 10);
    assert!(a_entry.error.is_none());

    let b_entry = manifest.get(&b).unwrap().unwrap();
    assert_eq!(b_entry.status, ManifestStatus::Error);
    assert!(b_entry.error.unwrap().starts_with("extract:"));

    let c_entry = manifest.get(&c).unwrap().unwrap();
    assert_eq!(c_entry.status, ManifestStatus::Completed);
    assert_eq!(c_entry.chunks_count, 0);

    let expected: Vec<String> = (0..10).map(|i| point_id(&a, i)).collect();
    assert_eq!(store.ids_for(&a), expected);
    assert_eq!(store.len().await.unwrap(), 10);
}

#[tokio::test]
async fn reingesting_overwrites_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.txt", "x".repeat(3200).as_bytes());

    let manifest = ManifestDb::in_memory().unwrap();
    manifest.upsert_if_absent(&a).unwrap();
    let store = Arc::new(MemoryStore::default());

    for _ in 0..2 {
        let embedder = Arc::new(FakeEmbedder::default());
        worker(&manifest, Arc::new(FakeExtractor), embedder, store.clone(), 2)
            .run()
            .await
            .unwrap();
        manifest.requeue(&a).unwrap();
    }

    assert_eq!(store.len().await.unwrap(), 10);
}

#[tokio::test]
async fn failed_files_do_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = ManifestDb::in_memory().unwrap();
    let mut paths = Vec::new();
    for i in 0..6 {
        let body = if i == 2 {
            "this document mentions POISON somewhere".to_string()
        } else {
            format!("document number {} with ordinary text", i)
        };
        let path = write(dir.path(), &format!("doc{}.txt", i), body.as_bytes());
        manifest.upsert_if_absent(&path).unwrap();
        paths.push(path);
    }

    let embedder = Arc::new(FakeEmbedder {
        fail_marker: Some("POISON"),
        ..Default::default()
    });
    let store = Arc::new(MemoryStore::default());
    let report = worker(&manifest, Arc::new(FakeExtractor), embedder, store, 3)
        .run()
        .await
        .unwrap();

    assert_eq!(report.completed, 5);
    assert_eq!(report.failed, 1);

    let failed = manifest.get(&paths[2]).unwrap().unwrap();
    assert_eq!(failed.status, ManifestStatus::Error);
    let message = failed.error.unwrap();
    assert!(message.starts_with("embed:"), "{}", message);
    assert!(message.contains("batch 1/1"), "{}", message);
}

#[tokio::test]
async fn upsert_failure_records_batch_and_ids() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.txt", "x".repeat(3200).as_bytes());
    let ok = write(dir.path(), "ok.txt", b"fine");

    let manifest = ManifestDb::in_memory().unwrap();
    manifest.upsert_if_absent(&a).unwrap();
    manifest.upsert_if_absent(&ok).unwrap();

    let store = Arc::new(MemoryStore {
        fail_source: Some(a.clone()),
        ..Default::default()
    });
    let failures = Arc::new(Mutex::new(Vec::new()));
    let recorded = failures.clone();
    worker(&manifest, Arc::new(FakeExtractor), Arc::new(FakeEmbedder::default()), store, 2)
        .with_progress(Arc::new(move |event: &ProgressEvent| {
            if let ProgressEvent::FileFailed { error, .. } = event {
                recorded.lock().push(error.clone());
            }
        }))
        .run()
        .await
        .unwrap();

    let entry = manifest.get(&a).unwrap().unwrap();
    assert_eq!(entry.status, ManifestStatus::Error);
    assert_eq!(entry.chunks_count, 0);
    let message = entry.error.unwrap();
    assert!(message.starts_with("upsert: Upsert batch 1/4"), "{}", message);

    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    for i in 0..3 {
        let id = point_id(&a, i);
        assert!(message.contains(&id), "{} missing from {}", id, message);
        assert!(failures[0].contains(&id), "{} missing from {}", id, failures[0]);
    }
    assert!(!message.contains(&point_id(&a, 3)));

    assert_eq!(manifest.get(&ok).unwrap().unwrap().status, ManifestStatus::Completed);
}

#[tokio::test]
async fn manifest_failure_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.txt", b"some text");
    let db_path = dir.path().join("manifest.db");

    let manifest = ManifestDb::open(&db_path).unwrap();
    manifest.upsert_if_absent(&a).unwrap();

    // Remove the row behind the worker's back so recording the outcome fails
    let worker = worker(
        &manifest,
        Arc::new(FakeExtractor),
        Arc::new(FakeEmbedder::default()),
        Arc::new(MemoryStore::default()),
        1,
    )
    .with_progress(Arc::new(move |event: &ProgressEvent| {
        if matches!(event, ProgressEvent::FileStarted { .. }) {
            let conn = rusqlite::Connection::open(&db_path).unwrap();
            conn.busy_timeout(Duration::from_secs(5)).unwrap();
            conn.execute("DELETE FROM manifest", []).unwrap();
        }
    }));

    let err = worker.run().await.unwrap_err();
    assert!(matches!(err, Error::Manifest(_)), "{}", err);
    assert!(err.is_fatal());
}

#[tokio::test]
async fn in_flight_files_never_exceed_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = ManifestDb::in_memory().unwrap();
    for i in 0..12 {
        let path = write(dir.path(), &format!("f{:02}.txt", i), b"some words to embed");
        manifest.upsert_if_absent(&path).unwrap();
    }

    let embedder = Arc::new(FakeEmbedder {
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let report = worker(
        &manifest,
        Arc::new(FakeExtractor),
        embedder.clone(),
        Arc::new(MemoryStore::default()),
        3,
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.completed, 12);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 12);
    assert!(embedder.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert_eq!(manifest.summary().unwrap().pending(), 0);
}

#[tokio::test]
async fn stop_request_finishes_in_flight_and_claims_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = ManifestDb::in_memory().unwrap();
    for i in 0..5 {
        let path = write(dir.path(), &format!("f{}.txt", i), b"content");
        manifest.upsert_if_absent(&path).unwrap();
    }

    let worker = worker(
        &manifest,
        Arc::new(FakeExtractor),
        Arc::new(FakeEmbedder::default()),
        Arc::new(MemoryStore::default()),
        1,
    );
    let shutdown = worker.shutdown_handle();
    let worker = worker.with_progress(Arc::new(move |event: &ProgressEvent| {
        if matches!(event, ProgressEvent::FileStarted { .. }) {
            shutdown.request();
        }
    }));

    let report = worker.run().await.unwrap();
    assert_eq!(report.files(), 1);
    assert!(report.stopped_early);

    let summary = manifest.summary().unwrap();
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.queued, 4);
    assert_eq!(summary.processing, 0);
}

#[tokio::test]
async fn slow_file_times_out_and_others_complete() {
    let dir = tempfile::tempdir().unwrap();
    let slow = write(dir.path(), "slow.txt", b"STALL here");
    let fast = write(dir.path(), "fast.txt", b"quick one");

    let manifest = ManifestDb::in_memory().unwrap();
    manifest.upsert_if_absent(&slow).unwrap();
    manifest.upsert_if_absent(&fast).unwrap();

    let embedder = Arc::new(FakeEmbedder {
        stall_marker: Some("STALL"),
        ..Default::default()
    });
    let report = worker(&manifest, Arc::new(FakeExtractor), embedder, Arc::new(MemoryStore::default()), 2)
        .with_file_timeout(Duration::from_millis(200))
        .run()
        .await
        .unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.completed, 1);
    let entry = manifest.get(&slow).unwrap().unwrap();
    assert!(entry.error.unwrap().starts_with("timeout:"));
}

#[tokio::test]
async fn reset_then_rerun_recovers_fixed_files() {
    let dir = tempfile::tempdir().unwrap();
    let b = write(dir.path(), "b.pdf", b"CORRUPT");

    let manifest = ManifestDb::in_memory().unwrap();
    manifest.upsert_if_absent(&b).unwrap();
    let store = Arc::new(MemoryStore::default());

    worker(&manifest, Arc::new(FakeExtractor), Arc::new(FakeEmbedder::default()), store.clone(), 2)
        .run()
        .await
        .unwrap();
    assert_eq!(manifest.summary().unwrap().error, 1);

    std::fs::write(&b, b"repaired text").unwrap();
    assert_eq!(manifest.reset_errors_to_queued().unwrap(), 1);

    let report = worker(&manifest, Arc::new(FakeExtractor), Arc::new(FakeEmbedder::default()), store.clone(), 2)
        .run()
        .await
        .unwrap();
    assert_eq!(report.completed, 1);

    let entry = manifest.get(&b).unwrap().unwrap();
    assert_eq!(entry.status, ManifestStatus::Completed);
    assert_eq!(entry.chunks_count, 1);
    assert!(entry.error.is_none());
}

#[tokio::test]
async fn scan_and_drain_with_builtin_parser() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    write(dir.path(), "readme.md", b"# Notes\n\nSome markdown body text.");
    write(dir.path(), "sub/plain.TXT", b"Plain text in a subdirectory.");
    write(dir.path(), "empty.txt", b"   \n");
    write(dir.path(), "ignored.csv", b"a,b,c");

    let manifest = ManifestDb::open(dir.path().join("state/manifest.db")).unwrap();
    let scan = DirectoryScanner::new(["md", "txt"]).scan(dir.path(), &manifest).unwrap();
    assert_eq!(scan.inserted, 3);

    let store = Arc::new(MemoryStore::default());
    let report = worker(&manifest, Arc::new(FileParser::new()), Arc::new(FakeEmbedder::default()), store.clone(), 6)
        .run()
        .await
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.empty, 1);
    assert_eq!(store.len().await.unwrap(), 2);

    let summary = manifest.summary().unwrap();
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.total_chunks, 2);
}
