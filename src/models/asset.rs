use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

use crate::error::AppError;

/// What an upload is used for. Drives content-type gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Font,
    File,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Font => "font",
            AssetKind::File => "file",
        }
    }
}

impl FromStr for AssetKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(AssetKind::Image),
            "font" => Ok(AssetKind::Font),
            "file" => Ok(AssetKind::File),
            _ => Err(AppError::Validation(format!("Unknown asset kind: {:?}", s))),
        }
    }
}

/// Asset model - a project-scoped reference to stored content
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Asset {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub asset_type: String,
    pub name: String,
    pub created_at: String,
}

impl Asset {
    pub fn kind(&self) -> Option<AssetKind> {
        self.asset_type.parse().ok()
    }
}

/// Asset joined with its file metadata, as returned to clients
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AssetResponse {
    pub id: String,
    pub project_id: String,
    pub key: String,
    pub asset_type: String,
    pub name: String,
    pub size: i64,
    pub content_type: String,
    pub created_at: String,
}

/// Result of one uploaded file: the submitted name and the asset it became
#[derive(Debug, Clone, Serialize)]
pub struct UploadedAsset {
    pub name: String,
    pub asset_id: String,
    pub key: String,
    /// False when the content was already stored and only metadata was written.
    pub stored: bool,
}

/// Delete assets request
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAssetsRequest {
    pub ids: Vec<String>,
    #[serde(default)]
    pub project_id: String,
}

/// Upload query parameters
#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub kind: Option<String>,
}

/// Set preview image request
#[derive(Debug, Deserialize)]
pub struct PreviewImageRequest {
    pub asset_id: Option<String>,
}
