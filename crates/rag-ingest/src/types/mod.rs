//! Core types for the ingestion pipeline

pub mod chunk;
pub mod manifest;

pub use chunk::{point_id, ChunkRecord, EmbeddedChunk, VectorPoint};
pub use manifest::{ManifestEntry, ManifestStatus, ManifestSummary};
