//! SQLite manifest of discovered files and their ingestion status
//!
//! The manifest is the durable work queue: the scanner inserts `queued` rows,
//! workers claim them and record the outcome, and recovery resets failures.
//! Every mutation is a single statement or transaction.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{ManifestEntry, ManifestStatus, ManifestSummary};

const SELECT_COLUMNS: &str = "path, status, chunks_count, error, updated_at";

/// SQLite-backed manifest store
#[derive(Clone)]
pub struct ManifestDb {
    conn: Arc<Mutex<Connection>>,
}

impl ManifestDb {
    /// Create or open the manifest at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::manifest(format!(
                    "Failed to create manifest directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path).map_err(|e| {
            Error::manifest(format!("Failed to open manifest {}: {}", path.display(), e))
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory manifest (for tests and dry runs)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::manifest(format!("Failed to open in-memory manifest: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.busy_timeout(Duration::from_secs(10))
            .map_err(|e| Error::manifest(format!("Failed to set busy timeout: {}", e)))?;

        // WAL lets status readers run while a worker holds the write lock
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::manifest(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS manifest (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'queued'
                    CHECK (status IN ('queued', 'processing', 'completed', 'error')),
                chunks_count INTEGER NOT NULL DEFAULT 0 CHECK (chunks_count >= 0),
                error TEXT,
                updated_at TEXT NOT NULL,
                CHECK (status <> 'error' OR error IS NOT NULL),
                CHECK (status <> 'completed' OR error IS NULL)
            );

            CREATE INDEX IF NOT EXISTS idx_manifest_status ON manifest(status, id);
        "#,
        )
        .map_err(|e| Error::manifest(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Manifest migrations complete");
        Ok(())
    }

    /// Insert a `queued` entry unless the path is already known.
    ///
    /// Returns `true` when a row was inserted. Existing entries keep their status.
    pub fn upsert_if_absent(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock();

        let inserted = conn
            .execute(
                r#"
                INSERT INTO manifest (path, status, chunks_count, error, updated_at)
                VALUES (?1, 'queued', 0, NULL, ?2)
                ON CONFLICT(path) DO NOTHING
                "#,
                params![path, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::manifest(format!("Failed to insert '{}': {}", path, e)))?;

        Ok(inserted > 0)
    }

    /// Atomically move up to `limit` queued entries to `processing`.
    ///
    /// Entries are claimed in insertion order. Concurrent callers, including
    /// other processes sharing the file, never receive the same entry.
    pub fn claim_next(&self, limit: usize) -> Result<Vec<ManifestEntry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::manifest(format!("Failed to begin claim: {}", e)))?;

        let ids: Vec<i64> = {
            let mut stmt = tx
                .prepare("SELECT id FROM manifest WHERE status = 'queued' ORDER BY id LIMIT ?1")
                .map_err(|e| Error::manifest(format!("Failed to prepare query: {}", e)))?;
            let rows = stmt
                .query_map(params![limit as i64], |row| row.get(0))
                .map_err(|e| Error::manifest(format!("Failed to select queued entries: {}", e)))?;
            rows.collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::manifest(format!("Failed to read queued entries: {}", e)))?
        };

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(ids.len());
        {
            let mut update = tx
                .prepare(
                    "UPDATE manifest SET status = 'processing', updated_at = ?2 WHERE id = ?1",
                )
                .map_err(|e| Error::manifest(format!("Failed to prepare claim: {}", e)))?;
            let mut select = tx
                .prepare(&format!("SELECT {} FROM manifest WHERE id = ?1", SELECT_COLUMNS))
                .map_err(|e| Error::manifest(format!("Failed to prepare query: {}", e)))?;

            for id in ids {
                update
                    .execute(params![id, now.to_rfc3339()])
                    .map_err(|e| Error::manifest(format!("Failed to claim entry {}: {}", id, e)))?;
                let raw = select
                    .query_row(params![id], RawEntry::from_row)
                    .map_err(|e| Error::manifest(format!("Failed to read entry {}: {}", id, e)))?;
                claimed.push(raw.into_entry()?);
            }
        }

        tx.commit()
            .map_err(|e| Error::manifest(format!("Failed to commit claim: {}", e)))?;

        Ok(claimed)
    }

    /// Record a successful ingestion. Clears any previous error.
    pub fn mark_completed(&self, path: &str, chunks_count: u32) -> Result<()> {
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                r#"
                UPDATE manifest
                SET status = 'completed', chunks_count = ?2, error = NULL, updated_at = ?3
                WHERE path = ?1
                "#,
                params![path, chunks_count as i64, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::manifest(format!("Failed to mark '{}' completed: {}", path, e)))?;

        if updated == 0 {
            return Err(Error::manifest(format!("'{}' is not in the manifest", path)));
        }
        Ok(())
    }

    /// Record a failed ingestion with its reason.
    pub fn mark_error(&self, path: &str, message: &str) -> Result<()> {
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                r#"
                UPDATE manifest
                SET status = 'error', error = ?2, updated_at = ?3
                WHERE path = ?1
                "#,
                params![path, message, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::manifest(format!("Failed to mark '{}' as error: {}", path, e)))?;

        if updated == 0 {
            return Err(Error::manifest(format!("'{}' is not in the manifest", path)));
        }
        Ok(())
    }

    /// Put one entry back to `queued` regardless of its status.
    pub fn requeue(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock();

        let updated = conn
            .execute(
                r#"
                UPDATE manifest
                SET status = 'queued', error = NULL, chunks_count = 0, updated_at = ?2
                WHERE path = ?1
                "#,
                params![path, Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::manifest(format!("Failed to requeue '{}': {}", path, e)))?;

        if updated == 0 {
            return Err(Error::manifest(format!("'{}' is not in the manifest", path)));
        }
        Ok(())
    }

    /// Move every `error` entry back to `queued`, clearing the error.
    pub fn reset_errors_to_queued(&self) -> Result<usize> {
        self.reset_status_to_queued(ManifestStatus::Error)
    }

    /// Move every `processing` entry back to `queued`.
    ///
    /// Only safe when no worker is running against this manifest.
    pub fn reset_processing_to_queued(&self) -> Result<usize> {
        self.reset_status_to_queued(ManifestStatus::Processing)
    }

    fn reset_status_to_queued(&self, from: ManifestStatus) -> Result<usize> {
        let conn = self.conn.lock();

        let reset = conn
            .execute(
                r#"
                UPDATE manifest
                SET status = 'queued', error = NULL, chunks_count = 0, updated_at = ?2
                WHERE status = ?1
                "#,
                params![from.as_str(), Utc::now().to_rfc3339()],
            )
            .map_err(|e| Error::manifest(format!("Failed to reset {} entries: {}", from, e)))?;

        Ok(reset)
    }

    /// Counts per status and the total chunk count
    pub fn summary(&self) -> Result<ManifestSummary> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(
                "SELECT status, COUNT(*), COALESCE(SUM(chunks_count), 0) FROM manifest GROUP BY status",
            )
            .map_err(|e| Error::manifest(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })
            .map_err(|e| Error::manifest(format!("Failed to query summary: {}", e)))?;

        let mut summary = ManifestSummary::default();
        for row in rows {
            let (status, count, chunks) =
                row.map_err(|e| Error::manifest(format!("Failed to read summary: {}", e)))?;
            let count = count as usize;
            match status.parse::<ManifestStatus>()? {
                ManifestStatus::Queued => summary.queued = count,
                ManifestStatus::Processing => summary.processing = count,
                ManifestStatus::Completed => summary.completed = count,
                ManifestStatus::Error => summary.error = count,
            }
            summary.total_chunks += chunks as u64;
        }

        Ok(summary)
    }

    /// Look up one entry by path
    pub fn get(&self, path: &str) -> Result<Option<ManifestEntry>> {
        let conn = self.conn.lock();

        let raw = conn
            .query_row(
                &format!("SELECT {} FROM manifest WHERE path = ?1", SELECT_COLUMNS),
                params![path],
                RawEntry::from_row,
            )
            .optional()
            .map_err(|e| Error::manifest(format!("Failed to get '{}': {}", path, e)))?;

        raw.map(RawEntry::into_entry).transpose()
    }

    /// Entries with the given status in insertion order
    pub fn list_by_status(&self, status: ManifestStatus, limit: usize) -> Result<Vec<ManifestEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM manifest WHERE status = ?1 ORDER BY id LIMIT ?2",
                SELECT_COLUMNS
            ))
            .map_err(|e| Error::manifest(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![status.as_str(), limit as i64], RawEntry::from_row)
            .map_err(|e| Error::manifest(format!("Failed to list {} entries: {}", status, e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| Error::manifest(format!("Failed to read entry: {}", e)))?;
            entries.push(raw.into_entry()?);
        }
        Ok(entries)
    }

    /// Total number of entries
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM manifest", [], |row| row.get(0))
            .map_err(|e| Error::manifest(format!("Failed to count entries: {}", e)))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Row as stored, before status and timestamp parsing
struct RawEntry {
    path: String,
    status: String,
    chunks_count: i64,
    error: Option<String>,
    updated_at: String,
}

impl RawEntry {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            status: row.get(1)?,
            chunks_count: row.get(2)?,
            error: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_entry(self) -> Result<ManifestEntry> {
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                Error::manifest(format!(
                    "Invalid timestamp '{}' for '{}': {}",
                    self.updated_at, self.path, e
                ))
            })?;

        Ok(ManifestEntry {
            status: self.status.parse()?,
            chunks_count: self.chunks_count.max(0) as u32,
            error: self.error,
            updated_at,
            path: self.path,
        })
    }
}
