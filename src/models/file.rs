use serde::Serialize;
use sqlx::FromRow;

/// Stored file model - metadata of one physical content blob
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredFile {
    pub key: String,
    pub size: i64,
    pub content_type: String,
    pub reclaimed: bool,
    pub reclaim_token: Option<String>,
    pub reclaim_started_at: Option<String>,
    pub created_at: String,
}

/// Reclamation state derived from the stored flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Referenced,
    OrphanedPendingDelete,
    Reclaimed,
}

impl StoredFile {
    pub fn state(&self) -> FileState {
        if self.reclaimed {
            FileState::Reclaimed
        } else if self.reclaim_token.is_some() {
            FileState::OrphanedPendingDelete
        } else {
            FileState::Referenced
        }
    }
}
