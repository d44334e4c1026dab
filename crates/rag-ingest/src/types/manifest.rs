//! Manifest types for tracking per-file ingestion state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Processing status of a manifest entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    /// Discovered, waiting for a worker
    Queued,
    /// Claimed by a worker
    Processing,
    /// Embedded and upserted
    Completed,
    /// Last attempt failed
    Error,
}

impl ManifestStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [ManifestStatus; 4] = [
        ManifestStatus::Queued,
        ManifestStatus::Processing,
        ManifestStatus::Completed,
        ManifestStatus::Error,
    ];

    /// Persisted representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestStatus::Queued => "queued",
            ManifestStatus::Processing => "processing",
            ManifestStatus::Completed => "completed",
            ManifestStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for ManifestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(ManifestStatus::Queued),
            "processing" => Ok(ManifestStatus::Processing),
            "completed" => Ok(ManifestStatus::Completed),
            "error" => Ok(ManifestStatus::Error),
            other => Err(Error::manifest(format!("Unknown manifest status: {}", other))),
        }
    }
}

impl std::fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discovered source file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    /// Absolute filesystem path (unique)
    pub path: String,
    /// Current status
    pub status: ManifestStatus,
    /// Chunks embedded and upserted; 0 until completion
    pub chunks_count: u32,
    /// Last failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time of the last status transition
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts across the manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestSummary {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    /// Sum of `chunks_count` over all entries
    pub total_chunks: u64,
}

impl ManifestSummary {
    /// Entries not yet in a terminal state
    pub fn pending(&self) -> usize {
        self.queued + self.processing
    }

    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.error
    }

    pub fn count(&self, status: ManifestStatus) -> usize {
        match status {
            ManifestStatus::Queued => self.queued,
            ManifestStatus::Processing => self.processing,
            ManifestStatus::Completed => self.completed,
            ManifestStatus::Error => self.error,
        }
    }
}

impl std::fmt::Display for ManifestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "completed={} error={} queued={} processing={} chunks={}",
            self.completed, self.error, self.queued, self.processing, self.total_chunks
        )
    }
}
