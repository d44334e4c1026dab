//! Directory discovery that feeds the manifest

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::storage::ManifestDb;

/// Outcome of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files with an accepted extension
    pub discovered: usize,
    /// Files newly added as `queued`
    pub inserted: usize,
    /// Files the manifest already knew
    pub already_known: usize,
    /// Entries that could not be read and were skipped
    pub skipped_unreadable: usize,
}

/// Walks a directory tree and registers matching files in the manifest
pub struct DirectoryScanner {
    extensions: HashSet<String>,
    follow_links: bool,
    skip_hidden: bool,
}

impl DirectoryScanner {
    /// Create a scanner accepting the given extensions (with or without a leading dot)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            follow_links: false,
            skip_hidden: true,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(&config.extensions)
            .follow_links(config.follow_links)
            .skip_hidden(config.skip_hidden)
    }

    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn skip_hidden(mut self, skip: bool) -> Self {
        self.skip_hidden = skip;
        self
    }

    /// Whether a path's extension is accepted (case-insensitive)
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.contains(&ext.to_lowercase()))
            .unwrap_or(false)
    }

    /// Walk `root` and insert every accepted file into the manifest.
    ///
    /// A missing or unreadable root and manifest failures are fatal. Unreadable
    /// entries below the root are logged and skipped.
    pub fn scan(&self, root: &Path, manifest: &ManifestDb) -> Result<ScanReport> {
        let root = self.resolve_root(root)?;
        tracing::info!("Scanning {} for {:?}", root.display(), self.sorted_extensions());

        let mut report = ScanReport::default();
        let skip_hidden = self.skip_hidden;

        let walker = WalkDir::new(&root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !(skip_hidden && entry.depth() > 0 && is_hidden(entry)));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.display().to_string());
                    let err = Error::discovery(path, e.to_string());
                    tracing::warn!("Skipping unreadable entry: {}", err);
                    report.skipped_unreadable += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.accepts(entry.path()) {
                continue;
            }

            let path = match entry.path().to_str() {
                Some(path) => path.to_string(),
                None => {
                    tracing::warn!("Skipping non UTF-8 path: {}", entry.path().display());
                    report.skipped_unreadable += 1;
                    continue;
                }
            };

            report.discovered += 1;
            if manifest.upsert_if_absent(&path)? {
                tracing::debug!("Queued {}", path);
                report.inserted += 1;
            } else {
                report.already_known += 1;
            }
        }

        tracing::info!(
            "Scan complete: {} discovered, {} new, {} already known, {} skipped",
            report.discovered,
            report.inserted,
            report.already_known,
            report.skipped_unreadable
        );

        Ok(report)
    }

    fn resolve_root(&self, root: &Path) -> Result<PathBuf> {
        let resolved = root.canonicalize().map_err(|e| {
            Error::config(format!("Cannot read scan root {}: {}", root.display(), e))
        })?;
        if !resolved.is_dir() {
            return Err(Error::config(format!(
                "Scan root {} is not a directory",
                root.display()
            )));
        }
        Ok(resolved)
    }

    fn sorted_extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.extensions.iter().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ManifestStatus;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("reports/2023")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        fs::write(root.join("a.pdf"), b"%PDF-1.4").unwrap();
        fs::write(root.join("B.PDF"), b"%PDF-1.4").unwrap();
        fs::write(root.join("notes.txt"), b"hello").unwrap();
        fs::write(root.join("image.png"), b"\x89PNG").unwrap();
        fs::write(root.join("reports/2023/q1.pdf"), b"%PDF-1.4").unwrap();
        fs::write(root.join(".cache/hidden.pdf"), b"%PDF-1.4").unwrap();
        dir
    }

    #[test]
    fn test_scan_filters_by_extension_case_insensitively() {
        let dir = tree();
        let db = ManifestDb::in_memory().unwrap();
        let scanner = DirectoryScanner::new(["pdf"]);

        let report = scanner.scan(dir.path(), &db).unwrap();
        assert_eq!(report.discovered, 3);
        assert_eq!(report.inserted, 3);

        let queued = db.list_by_status(ManifestStatus::Queued, 10).unwrap();
        assert!(queued.iter().all(|e| Path::new(&e.path).is_absolute()));
        assert!(queued.iter().any(|e| e.path.ends_with("B.PDF")));
        assert!(queued.iter().any(|e| e.path.ends_with("q1.pdf")));
        assert!(!queued.iter().any(|e| e.path.contains(".cache")));
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let dir = tree();
        let db = ManifestDb::in_memory().unwrap();
        let scanner = DirectoryScanner::new(["pdf", ".txt"]);

        let first = scanner.scan(dir.path(), &db).unwrap();
        assert_eq!(first.inserted, 4);

        let claimed = db.claim_next(1).unwrap();
        db.mark_completed(&claimed[0].path, 3).unwrap();

        let second = scanner.scan(dir.path(), &db).unwrap();
        assert_eq!(second.discovered, 4);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_known, 4);
        assert_eq!(db.len().unwrap(), 4);
        assert_eq!(db.summary().unwrap().completed, 1);
    }

    #[test]
    fn test_rescan_queues_only_new_files() {
        let dir = tree();
        let db = ManifestDb::in_memory().unwrap();
        let scanner = DirectoryScanner::new(["pdf"]);
        scanner.scan(dir.path(), &db).unwrap();

        let claimed = db.claim_next(2).unwrap();
        db.mark_completed(&claimed[0].path, 5).unwrap();
        db.mark_error(&claimed[1].path, "extract: bad xref").unwrap();

        fs::write(dir.path().join("reports/2023/q2.pdf"), b"%PDF-1.4").unwrap();
        let second = scanner.scan(dir.path(), &db).unwrap();
        assert_eq!(second.discovered, 4);
        assert_eq!(second.inserted, 1);
        assert_eq!(second.already_known, 3);

        let completed = db.get(&claimed[0].path).unwrap().unwrap();
        assert_eq!(completed.status, ManifestStatus::Completed);
        assert_eq!(completed.chunks_count, 5);
        assert_eq!(db.get(&claimed[1].path).unwrap().unwrap().status, ManifestStatus::Error);

        let queued = db.list_by_status(ManifestStatus::Queued, 10).unwrap();
        assert_eq!(queued.len(), 2);
        assert!(queued.iter().any(|e| e.path.ends_with("q2.pdf")));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_is_skipped() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let db = ManifestDb::in_memory().unwrap();
        let report = DirectoryScanner::new(["pdf"])
            .follow_links(true)
            .scan(dir.path(), &db)
            .unwrap();

        assert!(report.skipped_unreadable >= 1);
        assert_eq!(report.inserted, 3);
        assert_eq!(db.summary().unwrap().queued, 3);
    }

    #[test]
    fn test_hidden_files_included_when_requested() {
        let dir = tree();
        let db = ManifestDb::in_memory().unwrap();
        let scanner = DirectoryScanner::new(["pdf"]).skip_hidden(false);

        let report = scanner.scan(dir.path(), &db).unwrap();
        assert_eq!(report.discovered, 4);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = ManifestDb::in_memory().unwrap();
        let scanner = DirectoryScanner::new(["pdf"]);

        let err = scanner.scan(&dir.path().join("missing"), &db).unwrap_err();
        assert!(err.is_fatal());

        let file = dir.path().join("file.pdf");
        fs::write(&file, b"x").unwrap();
        assert!(scanner.scan(&file, &db).unwrap_err().is_fatal());
    }

    #[test]
    fn test_accepts() {
        let scanner = DirectoryScanner::new(["PDF", "md"]);
        assert!(scanner.accepts(Path::new("/x/report.pdf")));
        assert!(scanner.accepts(Path::new("/x/README.MD")));
        assert!(!scanner.accepts(Path::new("/x/pdf")));
        assert!(!scanner.accepts(Path::new("/x/a.txt")));
    }
}
