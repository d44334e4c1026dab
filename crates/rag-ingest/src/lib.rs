//! rag-ingest: bulk document ingestion into a vector store
//!
//! A durable SQLite manifest tracks every discovered file. A bounded worker
//! pool drains it, extracting text, chunking, embedding in batches and
//! upserting to the vector store. Per-file failures are recorded and never
//! block the rest of the corpus.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod storage;
pub mod types;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use ingestion::{DirectoryScanner, FileParser, TextChunker, TextExtractor};
pub use processing::{ProcessingWorker, Recovery, RunReport};
pub use storage::ManifestDb;
pub use types::{ChunkRecord, ManifestEntry, ManifestStatus, ManifestSummary};
