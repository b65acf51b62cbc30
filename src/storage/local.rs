use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::storage::{validate_key, AssetClient, ByteStream, FileInfo};

/// Local file system storage provider
pub struct LocalStorage {
    base_path: PathBuf,
    max_upload_size: u64,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>, max_upload_size: u64) -> Self {
        Self {
            base_path: base_path.into(),
            max_upload_size,
        }
    }

    fn get_full_path(&self, name: &str) -> Result<PathBuf> {
        validate_key(name)?;
        Ok(self.base_path.join(name))
    }

    /// Temp files live next to the target so the final rename never crosses
    /// a filesystem boundary.
    fn temp_path_for(full_path: &Path) -> PathBuf {
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        full_path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()))
    }

    async fn write_temp(&self, temp_path: &Path, mut data: ByteStream) -> Result<u64> {
        let mut file = fs::File::create(temp_path).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = data.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_upload_size {
                return Err(AppError::UploadTooLarge {
                    limit: self.max_upload_size,
                });
            }
            file.write_all(&chunk).await?;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(written)
    }
}

#[async_trait]
impl AssetClient for LocalStorage {
    async fn upload(&self, name: &str, content_type: &str, data: ByteStream) -> Result<FileInfo> {
        let full_path = self.get_full_path(name)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = Self::temp_path_for(&full_path);
        let size = match self.write_temp(&temp_path, data).await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, &full_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!("Saved file to {:?} ({} bytes)", full_path, size);
        Ok(FileInfo {
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let full_path = self.get_full_path(name)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => tracing::debug!("Deleted file {:?}", full_path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("File {:?} already absent", full_path);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        // Try to remove empty parent directories
        let mut current_dir = full_path.parent().map(|p| p.to_path_buf());
        while let Some(dir) = current_dir {
            if dir == self.base_path {
                break;
            }
            // Fails when the directory is not empty
            if fs::remove_dir(&dir).await.is_err() {
                break;
            }
            current_dir = dir.parent().map(|p| p.to_path_buf());
        }

        Ok(())
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::bytes_stream;
    use bytes::Bytes;
    use futures::stream;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn upload_writes_file_and_reports_info() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 1024);

        let info = storage
            .upload("abc", "image/png", bytes_stream(Bytes::from_static(b"png-bytes")))
            .await
            .unwrap();

        assert_eq!(info.size, 9);
        assert_eq!(info.content_type, "image/png");
        assert_eq!(std::fs::read(dir.path().join("abc")).unwrap(), b"png-bytes");
        assert_eq!(entries(dir.path()), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn oversized_stream_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 8);

        let chunks: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"12345")),
            Ok(Bytes::from_static(b"6789")),
        ];
        let err = storage
            .upload("big", "application/octet-stream", stream::iter(chunks).boxed())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UploadTooLarge { limit: 8 }));
        assert!(entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn rejects_traversal_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let storage = LocalStorage::new(&root, 1024);

        let err = storage
            .upload("../escape", "text/plain", bytes_stream(Bytes::from_static(b"x")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(!root.exists());
        assert!(!dir.path().join("escape").exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_prunes_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), 1024);

        storage
            .upload("nested/dir/file", "text/plain", bytes_stream(Bytes::from_static(b"x")))
            .await
            .unwrap();
        storage.delete("nested/dir/file").await.unwrap();
        storage.delete("nested/dir/file").await.unwrap();

        assert!(entries(dir.path()).is_empty());
    }
}
