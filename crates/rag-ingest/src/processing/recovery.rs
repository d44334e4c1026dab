//! Operator recovery over the manifest

use crate::error::Result;
use crate::storage::ManifestDb;
use crate::types::{ManifestEntry, ManifestStatus, ManifestSummary};

/// Manifest-only maintenance. Never touches the vector store.
pub struct Recovery {
    manifest: ManifestDb,
}

impl Recovery {
    pub fn new(manifest: ManifestDb) -> Self {
        Self { manifest }
    }

    /// Requeue every errored file so the next run retries it.
    pub fn reset_errors(&self) -> Result<usize> {
        let reset = self.manifest.reset_errors_to_queued()?;
        if reset == 0 {
            tracing::info!("No errored files to reset");
        } else {
            tracing::info!("Reset {} errored files to queued", reset);
        }
        Ok(reset)
    }

    /// Requeue files left in `processing` by a run that exited mid-file.
    ///
    /// Only call while no worker is running against the manifest.
    pub fn reset_stale_processing(&self) -> Result<usize> {
        let reset = self.manifest.reset_processing_to_queued()?;
        if reset > 0 {
            tracing::warn!("Reset {} abandoned processing files to queued", reset);
        }
        Ok(reset)
    }

    pub fn summary(&self) -> Result<ManifestSummary> {
        self.manifest.summary()
    }

    /// Errored files with their last error, oldest first
    pub fn errored(&self, limit: usize) -> Result<Vec<ManifestEntry>> {
        self.manifest.list_by_status(ManifestStatus::Error, limit)
    }
}
