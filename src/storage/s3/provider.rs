//! Object-storage implementation of `AssetClient`

use async_trait::async_trait;

use crate::config::S3Config;
use crate::error::Result;
use crate::storage::{read_limited, validate_key, AssetClient, ByteStream, FileInfo};

use super::client::Client;

/// S3-compatible storage provider
pub struct S3Storage {
    client: Client,
    max_upload_size: u64,
}

impl S3Storage {
    pub fn new(config: &S3Config, max_upload_size: u64) -> Result<Self> {
        Ok(Self {
            client: Client::new(config)?,
            max_upload_size,
        })
    }
}

#[async_trait]
impl AssetClient for S3Storage {
    async fn upload(&self, name: &str, content_type: &str, data: ByteStream) -> Result<FileInfo> {
        validate_key(name)?;

        // Buffered so an oversized body is rejected before any PUT is sent.
        let body = read_limited(data, self.max_upload_size).await?;
        let size = body.len() as u64;

        let res = self.client.put_object(name, content_type, body).await?;
        if !res.is_success() {
            tracing::error!("S3 upload of {} failed: {}", name, res);
            return Err(res.into_error());
        }

        tracing::info!("Successfully uploaded to S3: {} ({} bytes)", name, size);
        Ok(FileInfo {
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn delete(&self, name: &str) -> Result<()> {
        validate_key(name)?;

        let res = self.client.delete_object(name).await?;
        if res.is_success() {
            tracing::debug!("Deleted from S3: {}", name);
            return Ok(());
        }
        if res.is_not_found() {
            tracing::debug!("S3 object {} already absent", name);
            return Ok(());
        }

        Err(res.into_error())
    }

    fn storage_type(&self) -> &'static str {
        "s3"
    }
}
