use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::models::{AssetKind, FileState, StoredFile, UploadedAsset};
use crate::services::AssetRegistry;
use crate::storage::{bytes_stream, read_limited, sanitize_file_name, AssetClient, ByteStream};

const FONT_EXTENSIONS: [&str; 4] = ["woff", "woff2", "ttf", "otf"];

/// One file as submitted by a caller, before validation
pub struct UploadPayload {
    pub name: String,
    pub content_type: Option<String>,
    pub data: ByteStream,
}

impl UploadPayload {
    pub fn from_bytes(name: impl Into<String>, content_type: Option<&str>, data: Bytes) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.map(str::to_string),
            data: bytes_stream(data),
        }
    }
}

/// Upload limits taken from the storage configuration
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_upload_size: u64,
    pub reclaim_lease: Duration,
}

impl From<&StorageConfig> for UploadConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_upload_size: config.max_upload_size,
            reclaim_lease: Duration::from_secs(config.reclaim_lease_secs),
        }
    }
}

/// Derive the storage key for `data`: lowercase hex SHA-256.
pub fn content_key(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Check name and content type against the asset kind. Returns the sanitized
/// name and the effective content type.
pub fn validate_payload(kind: AssetKind, name: &str, content_type: Option<&str>) -> Result<(String, String)> {
    let name = sanitize_file_name(name);

    let declared = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .map(|ct| {
            ct.parse::<mime::Mime>()
                .map_err(|_| AppError::Validation(format!("Invalid content type: {:?}", ct)))
        })
        .transpose()?;
    let mime_type = declared.unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream());

    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let allowed = match kind {
        AssetKind::Image => mime_type.type_() == mime::IMAGE,
        AssetKind::Font => mime_type.type_().as_str() == "font" || FONT_EXTENSIONS.contains(&extension.as_str()),
        AssetKind::File => true,
    };
    if !allowed {
        return Err(AppError::Validation(format!(
            "Content type {} is not allowed for {} assets",
            mime_type,
            kind.as_str()
        )));
    }

    Ok((name, mime_type.essence_str().to_string()))
}

/// Content-addressed storage with dedup against registry metadata
pub struct ContentStore {
    registry: AssetRegistry,
    client: Arc<dyn AssetClient>,
    config: UploadConfig,
}

impl ContentStore {
    pub fn new(registry: AssetRegistry, client: Arc<dyn AssetClient>, config: UploadConfig) -> Self {
        Self {
            registry,
            client,
            config,
        }
    }

    /// A claim older than the lease is treated as abandoned.
    fn claim_expired(&self, file: &StoredFile) -> bool {
        let Some(started) = file
            .reclaim_started_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        else {
            return true;
        };
        let age = Utc::now().signed_duration_since(started.with_timezone(&Utc));
        age.to_std().map(|age| age >= self.config.reclaim_lease).unwrap_or(false)
    }

    /// Store one payload as a new asset of `project_id`. Bytes go to the
    /// backend only when no live file with the same content exists.
    pub async fn store(&self, project_id: &str, kind: AssetKind, payload: UploadPayload) -> Result<UploadedAsset> {
        let (name, content_type) = validate_payload(kind, &payload.name, payload.content_type.as_deref())?;

        let data = read_limited(payload.data, self.config.max_upload_size).await?;
        if data.is_empty() {
            return Err(AppError::Validation(format!("File {:?} is empty", name)));
        }

        let key = content_key(&data);
        let asset_id = Uuid::new_v4().to_string();

        if self.registry.attach_asset(&asset_id, project_id, &key, kind, &name).await? {
            tracing::info!("Deduplicated upload {} -> existing file {}", name, key);
            return Ok(UploadedAsset {
                name,
                asset_id,
                key,
                stored: false,
            });
        }

        // Reclaim generation this upload replaces. None when no row existed.
        let replaced = match self.registry.get_file(&key).await? {
            None => None,
            Some(file) => match file.state() {
                // Became live between the attach attempt and this read
                FileState::Referenced => {
                    return self.attach_or_conflict(asset_id, project_id, key, kind, name, false).await;
                }
                FileState::Reclaimed => file.reclaim_token,
                FileState::OrphanedPendingDelete => {
                    if !self.claim_expired(&file) {
                        return Err(AppError::Conflict(format!(
                            "Content {} is being reclaimed, retry shortly",
                            key
                        )));
                    }
                    tracing::warn!("Taking over expired reclaim claim on {}", key);
                    file.reclaim_token
                }
            },
        };

        // Bytes must be confirmed by the backend before any row points at them.
        let info = self.client.upload(&key, &content_type, bytes_stream(data)).await?;
        let size = info.size as i64;

        if !self.registry.insert_file(&key, size, &info.content_type).await? {
            // Someone else wrote the row meanwhile. Only the generation observed
            // above may be revived: a newer reclaim could have deleted our bytes.
            let revived = match replaced.as_deref() {
                Some(generation) => {
                    self.registry
                        .revive_file(&key, size, &info.content_type, generation)
                        .await?
                }
                None => false,
            };
            if !revived {
                tracing::debug!("File {} changed state during upload", key);
            }
        }

        self.attach_or_conflict(asset_id, project_id, key, kind, name, true).await
    }

    async fn attach_or_conflict(
        &self,
        asset_id: String,
        project_id: &str,
        key: String,
        kind: AssetKind,
        name: String,
        stored: bool,
    ) -> Result<UploadedAsset> {
        if !self.registry.attach_asset(&asset_id, project_id, &key, kind, &name).await? {
            return Err(AppError::Conflict(format!(
                "Content {} changed state during upload, retry",
                key
            )));
        }

        tracing::info!("Stored asset {} ({}) in project {}", asset_id, key, project_id);
        Ok(UploadedAsset {
            name,
            asset_id,
            key,
            stored,
        })
    }
}
