//! # Working File
//!
//! A process-local temporary copy of one downloaded object. Each value owns a
//! freshly created scratch directory; the directory and everything in it are
//! removed when the value is dropped, on every exit path of the owning task.
//!
//! Creation and [`WorkingFile::close`] run their filesystem work off the async
//! runtime threads.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::error::TransferError;
use crate::constants::transfer::{FALLBACK_FILE_NAME, SCRATCH_DIR_PREFIX};

#[derive(Debug)]
pub struct WorkingFile {
    dir: TempDir,
    path: PathBuf,
}

impl WorkingFile {
    /// Create a scratch directory under `scratch_root` and reserve a file path in it
    ///
    /// The file itself is created by the transfer that fills it.
    pub async fn create(scratch_root: &Path, object_key: &str) -> Result<Self, TransferError> {
        let root_label = scratch_root.display().to_string();
        tokio::fs::create_dir_all(scratch_root)
            .await
            .map_err(|e| TransferError::scratch_space(root_label.clone(), e))?;

        let root = scratch_root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(SCRATCH_DIR_PREFIX)
                .tempdir_in(root)
        })
        .await
        .map_err(|e| TransferError::scratch_space(root_label.clone(), e))?
        .map_err(|e| TransferError::scratch_space(root_label, e))?;

        let path = dir.path().join(file_name_for_key(object_key));

        debug!(
            scratch_dir = %dir.path().display(),
            working_file = %path.display(),
            "📁 Working file reserved"
        );

        Ok(Self { dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scratch_dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the scratch directory now, reporting failures instead of ignoring them
    pub async fn close(self) {
        let scratch_dir = self.dir.path().to_path_buf();
        let dir = self.dir;
        let removed = tokio::task::spawn_blocking(move || dir.close()).await;
        match removed {
            Ok(Ok(())) => {
                debug!(scratch_dir = %scratch_dir.display(), "🧹 Scratch directory removed");
            }
            Ok(Err(e)) => warn!(
                scratch_dir = %scratch_dir.display(),
                error = %e,
                "⚠️ Failed to remove scratch directory"
            ),
            Err(e) => warn!(
                scratch_dir = %scratch_dir.display(),
                error = %e,
                "⚠️ Scratch directory removal task failed"
            ),
        }
    }
}

/// Derive a safe local file name from the last segment of an object key
///
/// The converter sees this name, so the extension is preserved.
pub fn file_name_for_key(object_key: &str) -> String {
    let last = object_key.rsplit('/').next().unwrap_or_default();
    let sanitized: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_string()
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_for_key() {
        assert_eq!(file_name_for_key("run1/events.root"), "events.root");
        assert_eq!(file_name_for_key("events.root"), "events.root");
        assert_eq!(file_name_for_key("a/b/my file (1).root"), "my_file__1_.root");
        assert_eq!(file_name_for_key("dir/"), FALLBACK_FILE_NAME);
        assert_eq!(file_name_for_key("dir/.."), FALLBACK_FILE_NAME);
        assert_eq!(file_name_for_key(""), FALLBACK_FILE_NAME);
    }

    #[tokio::test]
    async fn test_scratch_dir_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch_dir;
        {
            let working = WorkingFile::create(root.path(), "run1/events.root").await.unwrap();
            scratch_dir = working.scratch_dir().to_path_buf();
            std::fs::write(working.path(), b"payload").unwrap();
            assert!(scratch_dir.exists());
            assert!(working.path().starts_with(&scratch_dir));
        }
        assert!(!scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_close_removes_scratch_dir() {
        let root = tempfile::tempdir().unwrap();
        let working = WorkingFile::create(root.path(), "x.bin").await.unwrap();
        let scratch_dir = working.scratch_dir().to_path_buf();
        working.close().await;
        assert!(!scratch_dir.exists());
    }

    #[tokio::test]
    async fn test_each_working_file_gets_its_own_dir() {
        let root = tempfile::tempdir().unwrap();
        let a = WorkingFile::create(root.path(), "same.root").await.unwrap();
        let b = WorkingFile::create(root.path(), "same.root").await.unwrap();
        assert_ne!(a.scratch_dir(), b.scratch_dir());
    }

    #[tokio::test]
    async fn test_missing_scratch_root_is_created() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a").join("b");
        let working = WorkingFile::create(&nested, "x.bin").await.unwrap();
        assert!(working.scratch_dir().starts_with(&nested));
    }
}
