use serde::Serialize;
use sqlx::FromRow;

/// Project model (only the columns this service reads)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub preview_image_asset_id: Option<String>,
    pub created_at: String,
}
