use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Chunked upload body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Wrap an in-memory buffer as a single-chunk stream
pub fn bytes_stream(data: Bytes) -> ByteStream {
    stream::once(async move { Ok(data) }).boxed()
}

/// Metadata returned by a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub size: u64,
    pub content_type: String,
}

/// Physical storage for asset bytes
#[async_trait]
pub trait AssetClient: Send + Sync {
    /// Persist `data` under `name`. Fails with `UploadTooLarge` as soon as the
    /// stream passes the configured limit, leaving nothing behind.
    async fn upload(&self, name: &str, content_type: &str, data: ByteStream) -> Result<FileInfo>;

    /// Remove `name`. Missing objects count as deleted.
    async fn delete(&self, name: &str) -> Result<()>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}

/// Drain `data` into memory, failing once more than `limit` bytes arrive.
pub async fn read_limited(mut data: ByteStream, limit: u64) -> Result<Bytes> {
    let mut buf = Vec::new();
    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        if buf.len() as u64 + chunk.len() as u64 > limit {
            return Err(AppError::UploadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}
