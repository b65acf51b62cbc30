use std::sync::Arc;

use crate::config::StorageConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{AssetKind, AssetResponse, CurrentUser, DeleteAssetsRequest, UploadedAsset};
use crate::services::{
    validate_payload, AssetRegistry, ContentStore, DeleteReport, GarbageCollector, ProjectAuthorizer,
    UploadConfig, UploadPayload,
};
use crate::storage::AssetClient;

/// Who is calling and how their access is decided
#[derive(Clone)]
pub struct AssetContext {
    pub user: CurrentUser,
    pub authorizer: Arc<dyn ProjectAuthorizer>,
}

impl AssetContext {
    pub fn new(user: CurrentUser, authorizer: Arc<dyn ProjectAuthorizer>) -> Self {
        Self { user, authorizer }
    }

    /// Fails with `Forbidden` unless the caller may edit `project_id`
    pub async fn require_edit(&self, project_id: &str) -> Result<()> {
        if !self.authorizer.can_edit(project_id, &self.user).await? {
            tracing::warn!("User {} denied edit on project {}", self.user.id, project_id);
            return Err(AppError::Forbidden("No edit permission on this project".to_string()));
        }
        Ok(())
    }

    async fn require_view(&self, project_id: &str) -> Result<()> {
        if !self.authorizer.can_view(project_id, &self.user).await? {
            return Err(AppError::Forbidden("No access to this project".to_string()));
        }
        Ok(())
    }
}

/// Entry point for asset uploads, deletes and listings
pub struct AssetService {
    registry: AssetRegistry,
    store: ContentStore,
    gc: GarbageCollector,
}

impl AssetService {
    pub fn new(db: Database, client: Arc<dyn AssetClient>, config: &StorageConfig) -> Self {
        let registry = AssetRegistry::new(db);
        Self {
            store: ContentStore::new(registry.clone(), client.clone(), UploadConfig::from(config)),
            gc: GarbageCollector::new(registry.clone(), client),
            registry,
        }
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Upload files into a project. Results follow input order. The first
    /// failing file aborts the request; files before it stay stored.
    pub async fn upload_assets(
        &self,
        kind: AssetKind,
        project_id: &str,
        files: Vec<UploadPayload>,
        ctx: &AssetContext,
    ) -> Result<Vec<UploadedAsset>> {
        ctx.require_edit(project_id).await?;

        if files.is_empty() {
            return Err(AppError::Validation("No files in upload".to_string()));
        }
        for file in &files {
            validate_payload(kind, &file.name, file.content_type.as_deref())?;
        }

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            uploaded.push(self.store.store(project_id, kind, file).await?);
        }

        tracing::info!(
            "User {} uploaded {} {} assets to project {}",
            ctx.user.id,
            uploaded.len(),
            kind.as_str(),
            project_id
        );
        Ok(uploaded)
    }

    /// Delete assets of one project, then reclaim bytes nobody references.
    pub async fn delete_assets(&self, req: DeleteAssetsRequest, ctx: &AssetContext) -> Result<DeleteReport> {
        ctx.require_edit(&req.project_id).await?;

        let deleted = self.registry.remove_assets(&req.project_id, &req.ids).await?;
        if deleted.is_empty() {
            return Err(AppError::NotFound("Assets not found".to_string()));
        }

        let reclaims = self.gc.collect(&deleted).await;

        Ok(DeleteReport {
            deleted_asset_ids: deleted.into_iter().map(|a| a.id).collect(),
            reclaims,
        })
    }

    pub async fn list_assets(&self, project_id: &str, ctx: &AssetContext) -> Result<Vec<AssetResponse>> {
        ctx.require_view(project_id).await?;
        self.registry.list_assets(project_id).await
    }

    pub async fn set_preview_image(
        &self,
        project_id: &str,
        asset_id: Option<&str>,
        ctx: &AssetContext,
    ) -> Result<()> {
        ctx.require_edit(project_id).await?;
        self.registry.set_preview_image(project_id, asset_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileState;
    use crate::services::testing::RecordingClient;
    use crate::services::{content_key, GarbageCollector, OwnerAuthorizer, ReclaimOutcome};
    use bytes::Bytes;

    struct Fixture {
        service: AssetService,
        client: Arc<RecordingClient>,
        owner: AssetContext,
        other: AssetContext,
    }

    async fn setup() -> Fixture {
        let db = Database::in_memory().await.unwrap();
        let client = Arc::new(RecordingClient::new(64));
        let config = StorageConfig {
            max_upload_size: 64,
            ..Default::default()
        };
        let service = AssetService::new(db.clone(), client.clone(), &config);
        service.registry().create_project("p1", "u1", "One").await.unwrap();
        service.registry().create_project("p2", "u2", "Two").await.unwrap();

        let authorizer: Arc<dyn ProjectAuthorizer> = Arc::new(OwnerAuthorizer::new(db));
        let ctx = |id: &str| AssetContext::new(CurrentUser { id: id.to_string() }, authorizer.clone());
        Fixture {
            service,
            client,
            owner: ctx("u1"),
            other: ctx("u2"),
        }
    }

    fn png(name: &str, data: &'static [u8]) -> UploadPayload {
        UploadPayload::from_bytes(name, Some("image/png"), Bytes::from_static(data))
    }

    fn delete(project_id: &str, ids: &[&str]) -> DeleteAssetsRequest {
        DeleteAssetsRequest {
            ids: ids.iter().map(|s| s.to_string()).collect(),
            project_id: project_id.to_string(),
        }
    }

    #[tokio::test]
    async fn upload_maps_names_in_order() {
        let f = setup().await;

        let uploaded = f
            .service
            .upload_assets(
                AssetKind::Image,
                "p1",
                vec![png("one.png", b"1"), png("two.png", b"2")],
                &f.owner,
            )
            .await
            .unwrap();

        let names: Vec<_> = uploaded.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["one.png", "two.png"]);
        assert_eq!(f.service.list_assets("p1", &f.owner).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_file_rejects_whole_batch_before_io() {
        let f = setup().await;
        let text = UploadPayload::from_bytes("notes.txt", Some("text/plain"), Bytes::from_static(b"x"));

        let err = f
            .service
            .upload_assets(AssetKind::Image, "p1", vec![png("ok.png", b"1"), text], &f.owner)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(f.client.total_uploads(), 0);
    }

    #[tokio::test]
    async fn non_owner_is_forbidden() {
        let f = setup().await;

        let err = f
            .service
            .upload_assets(AssetKind::Image, "p1", vec![png("a.png", b"1")], &f.other)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(matches!(
            f.service.list_assets("p1", &f.other).await,
            Err(AppError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn deleting_another_projects_asset_is_not_found() {
        let f = setup().await;
        let theirs = f
            .service
            .upload_assets(AssetKind::Image, "p2", vec![png("b.png", b"theirs")], &f.other)
            .await
            .unwrap();
        f.service
            .set_preview_image("p2", Some(&theirs[0].asset_id), &f.other)
            .await
            .unwrap();

        let err = f
            .service
            .delete_assets(delete("p1", &[&theirs[0].asset_id]), &f.owner)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(f.service.list_assets("p2", &f.other).await.unwrap().len(), 1);
        let p2 = f.service.registry().get_project("p2").await.unwrap().unwrap();
        assert_eq!(p2.preview_image_asset_id.as_deref(), Some(theirs[0].asset_id.as_str()));
        assert_eq!(f.client.total_deletes(), 0);
    }

    #[tokio::test]
    async fn shared_content_lifecycle() {
        let f = setup().await;
        let h1 = content_key(b"h1");
        let h2 = content_key(b"h2");

        let p1 = f
            .service
            .upload_assets(
                AssetKind::Image,
                "p1",
                vec![png("a.png", b"h1"), png("b.png", b"h2")],
                &f.owner,
            )
            .await
            .unwrap();
        let p2 = f
            .service
            .upload_assets(AssetKind::Image, "p2", vec![png("c.png", b"h1")], &f.other)
            .await
            .unwrap();
        assert_eq!(f.client.upload_count(&h1), 1);
        assert_eq!(f.client.upload_count(&h2), 1);

        let report = f
            .service
            .delete_assets(delete("p1", &[&p1[0].asset_id, &p1[1].asset_id]), &f.owner)
            .await
            .unwrap();
        assert_eq!(report.deleted_asset_ids.len(), 2);

        let outcome = |key: &str| {
            report
                .reclaims
                .iter()
                .find(|r| r.key == key)
                .map(|r| r.outcome.clone())
        };
        assert_eq!(outcome(&h1), Some(ReclaimOutcome::StillReferenced));
        assert_eq!(outcome(&h2), Some(ReclaimOutcome::Reclaimed));
        assert!(f.client.contains(&h1));
        assert!(!f.client.contains(&h2));

        f.service
            .delete_assets(delete("p2", &[&p2[0].asset_id]), &f.other)
            .await
            .unwrap();
        assert_eq!(f.client.delete_count(&h1), 1);
        let file = f.service.registry().get_file(&h1).await.unwrap().unwrap();
        assert_eq!(file.state(), FileState::Reclaimed);
    }

    #[tokio::test]
    async fn preview_is_cleared_with_its_asset() {
        let f = setup().await;
        let uploaded = f
            .service
            .upload_assets(AssetKind::Image, "p1", vec![png("a.png", b"1")], &f.owner)
            .await
            .unwrap();
        let id = uploaded[0].asset_id.clone();

        f.service.set_preview_image("p1", Some(&id), &f.owner).await.unwrap();
        f.service.delete_assets(delete("p1", &[&id]), &f.owner).await.unwrap();

        let project = f.service.registry().get_project("p1").await.unwrap().unwrap();
        assert_eq!(project.preview_image_asset_id, None);
    }

    #[tokio::test]
    async fn concurrent_deletes_of_last_references_reclaim_once() {
        let mut f = setup().await;
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        f.service.gc = GarbageCollector::new(f.service.registry.clone(), f.client.clone()).with_rendezvous(barrier);

        let mine = f
            .service
            .upload_assets(AssetKind::Image, "p1", vec![png("a.png", b"shared")], &f.owner)
            .await
            .unwrap();
        let theirs = f
            .service
            .upload_assets(AssetKind::Image, "p2", vec![png("b.png", b"shared")], &f.other)
            .await
            .unwrap();

        let (ra, rb) = tokio::join!(
            f.service.delete_assets(delete("p1", &[&mine[0].asset_id]), &f.owner),
            f.service.delete_assets(delete("p2", &[&theirs[0].asset_id]), &f.other),
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        let key = content_key(b"shared");
        assert_eq!(f.client.delete_count(&key), 1);
        let mut outcomes: Vec<_> = ra
            .reclaims
            .iter()
            .chain(rb.reclaims.iter())
            .map(|r| r.outcome.clone())
            .collect();
        outcomes.sort_by_key(|o| matches!(o, ReclaimOutcome::ClaimedElsewhere));
        assert_eq!(outcomes, [ReclaimOutcome::Reclaimed, ReclaimOutcome::ClaimedElsewhere]);
        let file = f.service.registry().get_file(&key).await.unwrap().unwrap();
        assert_eq!(file.state(), FileState::Reclaimed);
    }
}
