//! On-disk staging area shared by all pipeline stages.
//!
//! Clearing stale transient artifacts is a precondition of every run, not
//! a best-effort cleanup: a leftover segment from a previous run would be
//! silently misattributed to the new one.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::PipelineError;

/// File extensions the workspace manages. Files outside this set are
/// never touched.
pub const TRANSIENT_EXTENSIONS: &[&str] = &["m4s", "mp4", "m3u8", "json", "blurl"];

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path for a run artifact inside the workspace.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Create the directory if needed and remove every stale transient
    /// artifact. Must complete before any fetch task starts.
    pub async fn prepare(&self) -> Result<(), PipelineError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let removed = self.clear_transient().await?;
        info!(dir = %self.dir.display(), removed, "Workspace prepared");
        Ok(())
    }

    /// Delete every file in the workspace whose extension is in the
    /// managed transient set. Idempotent: a second pass removes nothing
    /// and reports no error.
    pub async fn clear_transient(&self) -> Result<usize, PipelineError> {
        let mut removed = 0usize;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if !is_transient(&path) {
                continue;
            }
            tokio::fs::remove_file(&path).await?;
            debug!(path = %path.display(), "Removed stale artifact");
            removed += 1;
        }
        Ok(removed)
    }

    /// Remove a stale file so the next write starts fresh. Used before any
    /// stage rewrites a deterministic artifact name, so no stage ever
    /// appends to or corrupts a previous run's file.
    pub async fn overwrite_if_exists(&self, path: &Path) -> Result<(), PipelineError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Overwriting existing file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_transient(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TRANSIENT_EXTENSIONS
                .iter()
                .any(|t| ext.eq_ignore_ascii_case(t))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        tokio::fs::write(&path, b"x").await.unwrap();
        path
    }

    #[tokio::test]
    async fn clears_only_managed_extensions() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());

        let seg = touch(tmp.path(), "seg_0.m4s").await;
        let out = touch(tmp.path(), "output_0.mp4").await;
        let playlist = touch(tmp.path(), "variant_0.m3u8").await;
        let manifest = touch(tmp.path(), "master.json").await;
        let keep = touch(tmp.path(), "notes.txt").await;

        let removed = ws.clear_transient().await.unwrap();
        assert_eq!(removed, 4);
        assert!(!seg.exists());
        assert!(!out.exists());
        assert!(!playlist.exists());
        assert!(!manifest.exists());
        assert!(keep.exists());
    }

    #[tokio::test]
    async fn clearing_twice_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());
        touch(tmp.path(), "seg_0.m4s").await;

        assert_eq!(ws.clear_transient().await.unwrap(), 1);
        assert_eq!(ws.clear_transient().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn prepare_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path().join("nested").join("staging"));
        ws.prepare().await.unwrap();
        assert!(ws.dir().is_dir());
    }

    #[tokio::test]
    async fn subdirectories_are_left_alone() {
        let tmp = TempDir::new().unwrap();
        let sub = tmp.path().join("archive.mp4");
        tokio::fs::create_dir(&sub).await.unwrap();

        let ws = Workspace::new(tmp.path());
        assert_eq!(ws.clear_transient().await.unwrap(), 0);
        assert!(sub.is_dir());
    }

    #[tokio::test]
    async fn overwrite_if_exists_handles_both_cases() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(tmp.path());

        let path = touch(tmp.path(), "master.json").await;
        ws.overwrite_if_exists(&path).await.unwrap();
        assert!(!path.exists());

        // Absent file is not an error.
        ws.overwrite_if_exists(&path).await.unwrap();
    }
}
