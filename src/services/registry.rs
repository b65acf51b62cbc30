use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashSet;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Asset, AssetKind, AssetResponse, Project, StoredFile};

/// Relational metadata for assets, files and their project linkage.
///
/// Asset lookups are always scoped by project. Reference checks used for
/// reclamation look across every project, since one file can back assets in
/// many projects.
#[derive(Clone)]
pub struct AssetRegistry {
    db: Database,
}

fn push_in_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, values: &'a [String]) {
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(value);
    }
    separated.push_unseparated(")");
}

impl AssetRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ==================== Projects ====================

    pub async fn create_project(&self, project_id: &str, user_id: &str, title: &str) -> Result<Project> {
        sqlx::query("INSERT INTO projects (id, user_id, title, created_at) VALUES (?, ?, ?, ?)")
            .bind(project_id)
            .bind(user_id)
            .bind(title)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.pool())
            .await?;

        self.get_project(project_id)
            .await?
            .ok_or_else(|| AppError::Internal("Project vanished after insert".to_string()))
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let project = sqlx::query_as("SELECT * FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(project)
    }

    /// Point the project preview at one of its own assets, or clear it
    pub async fn set_preview_image(&self, project_id: &str, asset_id: Option<&str>) -> Result<()> {
        if let Some(asset_id) = asset_id {
            if self.get_asset(project_id, asset_id).await?.is_none() {
                return Err(AppError::NotFound("Asset not found".to_string()));
            }
        }

        sqlx::query("UPDATE projects SET preview_image_asset_id = ? WHERE id = ?")
            .bind(asset_id)
            .bind(project_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    // ==================== Files ====================

    pub async fn get_file(&self, key: &str) -> Result<Option<StoredFile>> {
        let file = sqlx::query_as("SELECT * FROM files WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(file)
    }

    /// Insert a new file row. Returns false when the key already exists; the
    /// primary key is the only arbiter between concurrent first uploads.
    pub async fn insert_file(&self, key: &str, size: i64, content_type: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO files (key, size, content_type, reclaimed, created_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(size)
        .bind(content_type)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Bring a reclaimed file, or one held by an expired claim, back to life
    /// after its bytes were uploaded again. `generation` is the reclaim token
    /// observed before the upload; a newer reclaim of the key makes this a
    /// no-op, since that reclaim may have deleted the fresh bytes.
    pub async fn revive_file(&self, key: &str, size: i64, content_type: &str, generation: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET reclaimed = 0, reclaim_token = NULL, reclaim_started_at = NULL,
                size = ?, content_type = ?
            WHERE key = ? AND reclaim_token = ?
            "#,
        )
        .bind(size)
        .bind(content_type)
        .bind(key)
        .bind(generation)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 1 {
            tracing::info!("Revived reclaimed file {}", key);
        }
        Ok(result.rows_affected() == 1)
    }

    /// Take ownership of reclaiming `key`. Succeeds only while no asset in any
    /// project references it and nobody else holds a claim, checked in the
    /// same statement that records the claim.
    pub async fn claim_orphan(&self, key: &str, token: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET reclaim_token = ?, reclaim_started_at = ?
            WHERE key = ?
              AND reclaimed = 0
              AND reclaim_token IS NULL
              AND NOT EXISTS (SELECT 1 FROM assets WHERE assets.key = files.key)
            "#,
        )
        .bind(token)
        .bind(Utc::now().to_rfc3339())
        .bind(key)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record confirmed backend deletion for a claim we still hold. The token
    /// stays on the row and names this reclaim generation.
    pub async fn mark_reclaimed(&self, key: &str, token: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE files SET reclaimed = 1 WHERE key = ? AND reclaim_token = ?")
            .bind(key)
            .bind(token)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Keys among `keys` that some asset, in any project, still references
    pub async fn referenced_keys(&self, keys: &[String]) -> Result<HashSet<String>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT DISTINCT key FROM assets WHERE key");
        push_in_list(&mut qb, keys);

        let rows: Vec<(String,)> = qb.build_query_as().fetch_all(self.db.pool()).await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    // ==================== Assets ====================

    /// Create an asset pointing at `key`, but only while that file is live.
    /// Returns false when the file is missing, reclaimed or being reclaimed.
    pub async fn attach_asset(
        &self,
        asset_id: &str,
        project_id: &str,
        key: &str,
        kind: AssetKind,
        name: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO assets (id, project_id, key, asset_type, name, created_at)
            SELECT ?, ?, key, ?, ?, ?
            FROM files
            WHERE key = ? AND reclaimed = 0 AND reclaim_token IS NULL
            "#,
        )
        .bind(asset_id)
        .bind(project_id)
        .bind(kind.as_str())
        .bind(name)
        .bind(Utc::now().to_rfc3339())
        .bind(key)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_asset(&self, project_id: &str, asset_id: &str) -> Result<Option<Asset>> {
        let asset = sqlx::query_as("SELECT * FROM assets WHERE id = ? AND project_id = ?")
            .bind(asset_id)
            .bind(project_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(asset)
    }

    pub async fn list_assets(&self, project_id: &str) -> Result<Vec<AssetResponse>> {
        let assets = sqlx::query_as(
            r#"
            SELECT a.id, a.project_id, a.key, a.asset_type, a.name,
                   f.size, f.content_type, a.created_at
            FROM assets a
            JOIN files f ON f.key = a.key
            WHERE a.project_id = ?
            ORDER BY a.created_at DESC, a.id
            "#,
        )
        .bind(project_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(assets)
    }

    /// Assets of `project_id` among `ids`
    pub async fn find_assets(&self, project_id: &str, ids: &[String]) -> Result<Vec<Asset>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM assets WHERE project_id = ");
        qb.push_bind(project_id);
        qb.push(" AND id");
        push_in_list(&mut qb, ids);

        let assets = qb.build_query_as().fetch_all(self.db.pool()).await?;
        Ok(assets)
    }

    /// Delete the assets of `project_id` among `ids`, clearing a project
    /// preview that points at any of them first. Both happen in one
    /// transaction which is rolled back when nothing matched. Returns the
    /// deleted rows.
    pub async fn remove_assets(&self, project_id: &str, ids: &[String]) -> Result<Vec<Asset>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.db.pool().begin().await?;

        let mut clear = QueryBuilder::<Sqlite>::new(
            "UPDATE projects SET preview_image_asset_id = NULL WHERE id = ",
        );
        clear.push_bind(project_id);
        clear.push(" AND preview_image_asset_id");
        push_in_list(&mut clear, ids);
        clear.build().execute(&mut *tx).await?;

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM assets WHERE project_id = ");
        delete.push_bind(project_id);
        delete.push(" AND id");
        push_in_list(&mut delete, ids);
        delete.push(" RETURNING *");
        let deleted: Vec<Asset> = delete.build_query_as().fetch_all(&mut *tx).await?;

        if deleted.is_empty() {
            tx.rollback().await?;
            return Ok(deleted);
        }

        tx.commit().await?;
        tracing::info!("Deleted {} assets from project {}", deleted.len(), project_id);
        Ok(deleted)
    }
}
