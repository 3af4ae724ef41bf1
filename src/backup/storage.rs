// Snapshot file access - local filesystem and the user's document picker

use super::types::BackupError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// MIME type offered to the document picker
pub const SNAPSHOT_MIME_TYPE: &str = "application/json";

/// Filesystem operations the coordinator needs
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create `dir` and any missing parents. Succeeds if it already exists.
    async fn ensure_dir(&self, dir: &Path) -> Result<(), BackupError>;

    async fn exists(&self, path: &Path) -> Result<bool, BackupError>;

    async fn read_to_string(&self, path: &Path) -> Result<String, BackupError>;

    /// Replace the file at `path` with `contents`.
    ///
    /// If this fails, whatever was at `path` before is still there and intact.
    async fn write_replace(&self, path: &Path, contents: &[u8]) -> Result<(), BackupError>;
}

/// Lets the user choose a snapshot file when no on-device snapshot exists
#[async_trait]
pub trait DocumentPicker: Send + Sync {
    /// `Ok(None)` when the user cancels
    async fn pick_document(&self, mime_type: &str) -> Result<Option<PathBuf>, BackupError>;
}

/// Picker for hosts without a file selection UI; always behaves as if canceled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocumentPicker;

#[async_trait]
impl DocumentPicker for NoDocumentPicker {
    async fn pick_document(&self, _mime_type: &str) -> Result<Option<PathBuf>, BackupError> {
        Ok(None)
    }
}

/// [`FileStore`] over the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }

    fn staging_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn ensure_dir(&self, dir: &Path) -> Result<(), BackupError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| BackupError::io(format!("Failed to create backup directory {}", dir.display()), e))
    }

    async fn exists(&self, path: &Path) -> Result<bool, BackupError> {
        fs::try_exists(path)
            .await
            .map_err(|e| BackupError::io(format!("Failed to check {}", path.display()), e))
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, BackupError> {
        fs::read_to_string(path)
            .await
            .map_err(|e| BackupError::io(format!("Failed to read backup file {}", path.display()), e))
    }

    async fn write_replace(&self, path: &Path, contents: &[u8]) -> Result<(), BackupError> {
        let staging = Self::staging_path(path);
        debug!(path = %path.display(), staging = %staging.display(), bytes = contents.len(), "Writing snapshot");

        let write = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            Ok::<_, std::io::Error>(())
        };
        if let Err(e) = write.await {
            let _ = fs::remove_file(&staging).await;
            return Err(BackupError::io(
                format!("Failed to write backup file {}", staging.display()),
                e,
            ));
        }

        if let Err(e) = fs::rename(&staging, path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(BackupError::io(
                format!("Failed to replace backup file {}", path.display()),
                e,
            ));
        }
        Ok(())
    }
}
