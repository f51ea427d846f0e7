//! On-disk artifact store.
//!
//! The artifact tree is the pipeline's only shared resource. Discipline is
//! single writer per artifact with atomic replace: every write lands in a
//! temp file in the destination directory and is renamed into place, so a
//! crash mid-stage never leaves a half-written artifact that a later
//! re-entry check would mistake for "done".
//!
//! Artifact names are deterministic functions of the window id (and chunk
//! index where applicable), which is what makes every stage idempotent and
//! externally inspectable.

use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sl_common::table::{self, TableRow};
use sl_common::{Error, Result, Window};
use tracing::warn;

/// Key used for run-wide artifacts in error reporting.
const GLOBAL_KEY: &str = "global";

/// Path layout and atomic I/O over the results tree.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the results tree if absent.
    pub fn ensure_layout(&self) -> Result<()> {
        std::fs::create_dir_all(self.root.join("location"))?;
        Ok(())
    }

    // Per-window artifacts.

    pub fn stations(&self, window: &Window) -> PathBuf {
        self.root.join(format!("stations_{}.csv", window.id()))
    }

    pub fn manifest(&self, window: &Window) -> PathBuf {
        self.root.join(format!("manifest_{}.csv", window.id()))
    }

    pub fn catalog(&self, window: &Window) -> PathBuf {
        self.root.join(format!("catalog_{}.csv", window.id()))
    }

    pub fn assignments(&self, window: &Window) -> PathBuf {
        self.root.join(format!("assignments_{}.csv", window.id()))
    }

    pub fn picks(&self, window: &Window) -> PathBuf {
        self.root.join(format!("picks_{}.csv", window.id()))
    }

    pub fn window_stats(&self, window: &Window) -> PathBuf {
        self.root.join(format!("stats_{}.json", window.id()))
    }

    // Run-wide artifacts.

    pub fn global_catalog(&self) -> PathBuf {
        self.root.join("catalog_all.csv")
    }

    pub fn global_assignments(&self) -> PathBuf {
        self.root.join("assignments_all.csv")
    }

    pub fn global_picks(&self) -> PathBuf {
        self.root.join("picks_all.csv")
    }

    pub fn relocated(&self) -> PathBuf {
        self.root.join("location").join("relocated.csv")
    }

    pub fn xyzm(&self) -> PathBuf {
        self.root.join("location").join("xyzm.dat")
    }

    pub fn run_stats(&self) -> PathBuf {
        self.root.join("stats_all.json")
    }

    pub fn run_summary(&self) -> PathBuf {
        self.root.join("run.json")
    }

    // Atomic I/O.

    /// Write a table artifact atomically (temp file + rename).
    pub fn write_table<R: TableRow>(&self, path: &Path, rows: &[R]) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        table::write_table(tmp.as_file_mut(), rows)?;
        tmp.as_file_mut().flush()?;
        tmp.persist(path).map_err(|err| Error::Io(err.error))?;
        Ok(())
    }

    /// Write a JSON artifact atomically.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), value)?;
        tmp.as_file_mut().write_all(b"\n")?;
        tmp.as_file_mut().flush()?;
        tmp.persist(path).map_err(|err| Error::Io(err.error))?;
        Ok(())
    }

    /// Read a required per-window table.
    ///
    /// Absence is a `MissingArtifact` (window becomes Skipped upstream);
    /// a file that exists but does not parse is `MalformedArtifact`,
    /// recovered the same way but logged distinctly.
    pub fn read_table<R: TableRow>(&self, path: &Path, window: &Window) -> Result<Vec<R>> {
        self.read_table_keyed(path, &window.id())
    }

    /// Read a required run-wide table.
    pub fn read_global_table<R: TableRow>(&self, path: &Path) -> Result<Vec<R>> {
        self.read_table_keyed(path, GLOBAL_KEY)
    }

    fn read_table_keyed<R: TableRow>(&self, path: &Path, key: &str) -> Result<Vec<R>> {
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::MissingArtifact {
                    window: key.to_string(),
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        table::read_table(BufReader::new(file)).map_err(|err| {
            warn!(artifact = %path.display(), detail = %err, "malformed artifact");
            Error::MalformedArtifact {
                path: path.to_path_buf(),
                detail: err.to_string(),
            }
        })
    }

    /// Delete artifacts ahead of a forced rebuild; missing files are fine.
    pub fn delete(&self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sl_common::Assignment;

    fn window() -> Window {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Window::new(start, start + chrono::TimeDelta::days(1))
    }

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("results"));
        store.ensure_layout().unwrap();
        (dir, store)
    }

    #[test]
    fn test_paths_embed_window_id() {
        let (_dir, store) = store();
        let w = window();
        assert!(store
            .catalog(&w)
            .to_string_lossy()
            .ends_with("catalog_20240101_20240102.csv"));
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_dir, store) = store();
        let w = window();
        let rows = vec![Assignment {
            pick_index: 0,
            event_index: 1,
            score: 12.5,
        }];
        let path = store.assignments(&w);
        store.write_table(&path, &rows).unwrap();
        let back: Vec<Assignment> = store.read_table(&path, &w).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_missing_artifact_error() {
        let (_dir, store) = store();
        let w = window();
        let err = store
            .read_table::<Assignment>(&store.assignments(&w), &w)
            .unwrap_err();
        assert_eq!(err.code(), 20);
        assert!(err.skips_window());
    }

    #[test]
    fn test_corrupt_artifact_is_malformed_not_missing() {
        let (_dir, store) = store();
        let w = window();
        let path = store.assignments(&w);
        std::fs::write(&path, "pick_index\tevent_index\tscore\nnot-a-number\t1\t2.0\n").unwrap();
        let err = store.read_table::<Assignment>(&path, &w).unwrap_err();
        assert_eq!(err.code(), 21);
        assert!(err.skips_window());
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let (_dir, store) = store();
        let w = window();
        store
            .write_table::<Assignment>(&store.assignments(&w), &[])
            .unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(store.root())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.starts_with(".tmp") || name.ends_with(".tmp")
            })
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_delete_tolerates_missing() {
        let (_dir, store) = store();
        let w = window();
        store
            .delete(&[store.catalog(&w), store.picks(&w)])
            .unwrap();
    }
}
